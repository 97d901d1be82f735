//! Review-screen rendering.
//!
//! `render()` is the single entry point, called from the event loop's
//! `terminal.draw()` closure and nowhere else.

mod layout;
pub mod diff_view;
pub mod help;
pub mod keybindings;
pub mod output_view;

use ratatui::Frame;

use crate::app::{AppState, Mode};
use crate::theme::Theme;
use layout::{compute_layout, inner_rect, render_status_bar};

/// Renders one frame.
///
/// Viewport heights and panel areas are written back into `state` before the
/// panels draw, so the next keypress can size page scrolls and route clicks.
/// The one-frame lag is not noticeable.
pub fn render(frame: &mut Frame, state: &mut AppState, theme: &Theme) {
    let [output, diff, status_bar] = compute_layout(frame);

    state.output_viewport_height = inner_rect(output).height;
    state.diff_viewport_height = inner_rect(diff).height;
    state.panel_rects = [output, diff];

    output_view::render_output(frame, output, state, theme);
    diff_view::render_diff(frame, diff, state, theme);
    render_status_bar(frame, status_bar, state, theme);

    match state.mode {
        Mode::HelpOverlay => help::render_help_overlay(frame, theme, state.help_scroll),
        Mode::ConfirmQuit => help::render_confirm_quit(frame, theme),
        Mode::Normal => {}
    }
}
