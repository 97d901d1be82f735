//! Keybinding dispatcher.
//!
//! Translates crossterm key and mouse events into `AppState` mutations. Keys
//! that need the editing session (which lives in the event loop, not in
//! `AppState`) come back as a `KeyAction` for the loop to perform.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseButton, MouseEvent, MouseEventKind};
use komma_core::types::Tier;
use ratatui::layout::Position;

use crate::app::{AppState, Mode, PanelFocus};

/// What the event loop should do after a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Continue,
    Quit,
    /// Send pending comments at `state.tier`.
    Submit,
    Cancel,
    Approve,
    Reject,
}

/// Dispatches on the current mode first so each mode's keys stay isolated.
pub fn handle_key(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match state.mode {
        Mode::HelpOverlay => handle_help(key, state),
        Mode::ConfirmQuit => handle_confirm_quit(key, state),
        Mode::Normal => handle_normal(key, state),
    }
}

fn handle_normal(key: KeyEvent, state: &mut AppState) -> KeyAction {
    if let Some(action) = handle_scroll_key(key, state) {
        return action;
    }

    match key.code {
        KeyCode::Tab | KeyCode::BackTab => {
            state.focus = state.focus.next();
            KeyAction::Continue
        }

        KeyCode::Char('s') => KeyAction::Submit,
        KeyCode::Char('x') => KeyAction::Cancel,
        KeyCode::Char('a') => KeyAction::Approve,
        KeyCode::Char('r') => KeyAction::Reject,
        KeyCode::Char('t') => {
            state.tier = match state.tier {
                Tier::Fast => Tier::Default,
                Tier::Default => Tier::Max,
                Tier::Max => Tier::Fast,
            };
            KeyAction::Continue
        }

        KeyCode::Char('?') => {
            state.help_scroll = 0;
            state.mode = Mode::HelpOverlay;
            KeyAction::Continue
        }

        KeyCode::Char('q') | KeyCode::Esc => {
            if state.busy.is_some() {
                state.mode = Mode::ConfirmQuit;
                KeyAction::Continue
            } else {
                KeyAction::Quit
            }
        }

        _ => KeyAction::Continue,
    }
}

/// Returns `None` when the key is not a scroll key.
fn handle_scroll_key(key: KeyEvent, state: &mut AppState) -> Option<KeyAction> {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Char('j') | KeyCode::Down => state.scroll_down(1),
        KeyCode::Char('k') | KeyCode::Up => state.scroll_up(1),
        KeyCode::Char('g') => state.scroll_top(),
        KeyCode::Char('G') => state.scroll_bottom(),
        KeyCode::Char('d') if ctrl => state.half_page_down(),
        KeyCode::Char('u') if ctrl => state.half_page_up(),
        KeyCode::Char('f') if ctrl => state.full_page_down(),
        KeyCode::Char('b') if ctrl => state.full_page_up(),
        _ => return None,
    }
    Some(KeyAction::Continue)
}

fn handle_help(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char('j') => state.help_scroll = state.help_scroll.saturating_add(1),
        KeyCode::Char('k') => state.help_scroll = state.help_scroll.saturating_sub(1),
        KeyCode::Char('g') => state.help_scroll = 0,
        KeyCode::Char('?') | KeyCode::Esc | KeyCode::Char('q') => state.mode = Mode::Normal,
        _ => {}
    }
    KeyAction::Continue
}

/// `y` quits (the loop cancels the task on the way out); `n` or Esc returns.
fn handle_confirm_quit(key: KeyEvent, state: &mut AppState) -> KeyAction {
    match key.code {
        KeyCode::Char('y') | KeyCode::Char('Y') => KeyAction::Quit,
        KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
            state.mode = Mode::Normal;
            KeyAction::Continue
        }
        _ => KeyAction::Continue,
    }
}

/// Left click focuses a panel; the wheel scrolls by 3 lines.
pub fn handle_mouse(mouse: MouseEvent, state: &mut AppState) {
    match mouse.kind {
        MouseEventKind::Down(MouseButton::Left) => {
            let pos = Position { x: mouse.column, y: mouse.row };
            let [output, diff] = state.panel_rects;
            if output.contains(pos) {
                state.focus = PanelFocus::Output;
            } else if diff.contains(pos) {
                state.focus = PanelFocus::Diff;
            }
        }
        MouseEventKind::ScrollUp if state.mode == Mode::HelpOverlay => {
            state.help_scroll = state.help_scroll.saturating_sub(3);
        }
        MouseEventKind::ScrollDown if state.mode == Mode::HelpOverlay => {
            state.help_scroll = state.help_scroll.saturating_add(3);
        }
        MouseEventKind::ScrollUp => state.scroll_up(3),
        MouseEventKind::ScrollDown => state.scroll_down(3),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use komma_core::types::TaskKind;
    use std::path::PathBuf;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn state() -> AppState {
        AppState::new(PathBuf::from("/tmp/doc.md"), Tier::Default)
    }

    #[test]
    fn review_keys_map_to_actions() {
        let mut s = state();
        assert_eq!(handle_key(press(KeyCode::Char('s')), &mut s), KeyAction::Submit);
        assert_eq!(handle_key(press(KeyCode::Char('x')), &mut s), KeyAction::Cancel);
        assert_eq!(handle_key(press(KeyCode::Char('a')), &mut s), KeyAction::Approve);
        assert_eq!(handle_key(press(KeyCode::Char('r')), &mut s), KeyAction::Reject);
    }

    #[test]
    fn quit_confirms_only_while_busy() {
        let mut s = state();
        assert_eq!(handle_key(press(KeyCode::Char('q')), &mut s), KeyAction::Quit);

        s.busy = Some(TaskKind::Edit);
        assert_eq!(handle_key(press(KeyCode::Char('q')), &mut s), KeyAction::Continue);
        assert_eq!(s.mode, Mode::ConfirmQuit);
        assert_eq!(handle_key(press(KeyCode::Char('n')), &mut s), KeyAction::Continue);
        assert_eq!(s.mode, Mode::Normal);

        handle_key(press(KeyCode::Char('q')), &mut s);
        assert_eq!(handle_key(press(KeyCode::Char('y')), &mut s), KeyAction::Quit);
    }

    #[test]
    fn tier_cycles() {
        let mut s = state();
        for expected in [Tier::Max, Tier::Fast, Tier::Default] {
            handle_key(press(KeyCode::Char('t')), &mut s);
            assert_eq!(s.tier, expected);
        }
    }

    #[test]
    fn help_swallows_review_keys() {
        let mut s = state();
        handle_key(press(KeyCode::Char('?')), &mut s);
        assert_eq!(s.mode, Mode::HelpOverlay);
        assert_eq!(handle_key(press(KeyCode::Char('a')), &mut s), KeyAction::Continue);
        handle_key(press(KeyCode::Esc), &mut s);
        assert_eq!(s.mode, Mode::Normal);
    }

    #[test]
    fn tab_switches_focus() {
        let mut s = state();
        assert_eq!(s.focus, PanelFocus::Diff);
        handle_key(press(KeyCode::Tab), &mut s);
        assert_eq!(s.focus, PanelFocus::Output);
    }
}
