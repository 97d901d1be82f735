//! Review-screen state.
//!
//! Pure state: read by the render module, mutated by the keybinding
//! dispatcher and by session updates in `main.rs`. No rendering here.

use std::path::PathBuf;

use komma_core::diff::DiffStats;
use komma_core::types::{TaskKind, Tier};
use ratatui::layout::Rect;
use ratatui::text::Line;

/// Which keybinding set is active.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Normal,
    /// Help overlay drawn above both panels.
    HelpOverlay,
    /// Quit requested while a task is still running.
    ConfirmQuit,
}

/// Which panel receives scroll keys.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PanelFocus {
    /// Left panel: the assistant's streamed output.
    Output,
    /// Right panel: the held diff.
    #[default]
    Diff,
}

impl PanelFocus {
    /// Two panels, so next and previous are the same move.
    pub fn next(self) -> Self {
        match self {
            PanelFocus::Output => PanelFocus::Diff,
            PanelFocus::Diff => PanelFocus::Output,
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    #[default]
    Info,
    Success,
    Error,
}

/// The message shown in the status bar.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub kind: StatusKind,
    pub text: String,
}

pub struct AppState {
    pub mode: Mode,
    pub focus: PanelFocus,

    /// Absolute path of the document under review.
    pub document: PathBuf,
    pub tier: Tier,

    /// Whole output of the running (or last) task.
    pub output: String,
    pub output_scroll: u16,
    /// Keep the output panel pinned to its last line while text arrives.
    /// Cleared by any manual scroll up, restored by `G`.
    pub output_follow: bool,
    pub output_viewport_height: u16,

    /// Highlighted diff of the held edit; empty when nothing awaits review.
    pub diff_lines: Vec<Line<'static>>,
    pub diff_stats: Option<DiffStats>,
    /// usize supports diffs longer than 65535 lines; clamped by the renderer.
    pub diff_scroll: usize,
    pub diff_viewport_height: u16,

    pub help_scroll: u16,

    /// Kind of the task in flight, if any.
    pub busy: Option<TaskKind>,
    pub pending_comments: usize,
    pub status: StatusMessage,
    /// Advanced on every tick; drives the spinner.
    pub tick: usize,

    /// Output and diff panel areas from the last frame, for mouse focus.
    pub panel_rects: [Rect; 2],
}

impl AppState {
    pub fn new(document: PathBuf, tier: Tier) -> Self {
        Self {
            mode: Mode::default(),
            focus: PanelFocus::default(),
            document,
            tier,
            output: String::new(),
            output_scroll: 0,
            output_follow: true,
            output_viewport_height: 0,
            diff_lines: Vec::new(),
            diff_stats: None,
            diff_scroll: 0,
            diff_viewport_height: 0,
            help_scroll: 0,
            busy: None,
            pending_comments: 0,
            status: StatusMessage::default(),
            tick: 0,
            panel_rects: [Rect::default(); 2],
        }
    }

    pub fn set_status(&mut self, kind: StatusKind, text: impl Into<String>) {
        self.status = StatusMessage { kind, text: text.into() };
    }

    /// Replaces the output text. Text is cumulative, so a follow-mode panel
    /// simply re-pins to the bottom.
    pub fn set_output(&mut self, text: String) {
        self.output = text;
        if self.output_follow {
            self.output_scroll = self.output_bottom();
        }
    }

    /// Resets per-task state when a new task is dispatched.
    pub fn begin_task(&mut self, kind: TaskKind) {
        self.busy = Some(kind);
        self.output.clear();
        self.output_scroll = 0;
        self.output_follow = true;
    }

    pub fn set_review(&mut self, lines: Vec<Line<'static>>, stats: DiffStats) {
        self.diff_lines = lines;
        self.diff_stats = Some(stats);
        self.diff_scroll = 0;
        self.focus = PanelFocus::Diff;
    }

    pub fn clear_review(&mut self) {
        self.diff_lines.clear();
        self.diff_stats = None;
        self.diff_scroll = 0;
    }

    fn output_bottom(&self) -> u16 {
        let lines = u16::try_from(self.output.lines().count()).unwrap_or(u16::MAX);
        lines.saturating_sub(self.output_viewport_height)
    }

    /// Scrolls the focused panel down by `lines` rows.
    pub fn scroll_down(&mut self, lines: u16) {
        match self.focus {
            PanelFocus::Output => {
                self.output_scroll = self.output_scroll.saturating_add(lines).min(self.output_bottom());
            }
            PanelFocus::Diff => {
                self.diff_scroll = self.diff_scroll.saturating_add(lines as usize);
            }
        }
    }

    /// Scrolls the focused panel up by `lines` rows.
    pub fn scroll_up(&mut self, lines: u16) {
        match self.focus {
            PanelFocus::Output => {
                self.output_follow = false;
                self.output_scroll = self.output_scroll.saturating_sub(lines);
            }
            PanelFocus::Diff => {
                self.diff_scroll = self.diff_scroll.saturating_sub(lines as usize);
            }
        }
    }

    pub fn scroll_top(&mut self) {
        match self.focus {
            PanelFocus::Output => {
                self.output_follow = false;
                self.output_scroll = 0;
            }
            PanelFocus::Diff => self.diff_scroll = 0,
        }
    }

    pub fn scroll_bottom(&mut self) {
        match self.focus {
            PanelFocus::Output => {
                self.output_follow = true;
                self.output_scroll = self.output_bottom();
            }
            PanelFocus::Diff => self.diff_scroll = self.diff_lines.len().saturating_sub(1),
        }
    }

    fn viewport_height(&self) -> u16 {
        match self.focus {
            PanelFocus::Output => self.output_viewport_height,
            PanelFocus::Diff => self.diff_viewport_height,
        }
    }

    /// Uses the viewport height cached by the previous render; scrolls by 1
    /// on the first frame when that height is still zero.
    pub fn half_page_down(&mut self) {
        self.scroll_down((self.viewport_height() / 2).max(1));
    }

    pub fn half_page_up(&mut self) {
        self.scroll_up((self.viewport_height() / 2).max(1));
    }

    pub fn full_page_down(&mut self) {
        self.scroll_down(self.viewport_height().max(1));
    }

    pub fn full_page_up(&mut self) {
        self.scroll_up(self.viewport_height().max(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> AppState {
        AppState::new(PathBuf::from("/tmp/doc.md"), Tier::Default)
    }

    #[test]
    fn follow_mode_tracks_growing_output() {
        let mut s = state();
        s.output_viewport_height = 2;
        s.set_output("a\nb\nc\nd".to_owned());
        assert_eq!(s.output_scroll, 2);

        s.focus = PanelFocus::Output;
        s.scroll_up(1);
        assert!(!s.output_follow);
        s.set_output("a\nb\nc\nd\ne\nf".to_owned());
        assert_eq!(s.output_scroll, 1, "manual scroll position is kept");

        s.scroll_bottom();
        assert!(s.output_follow);
        assert_eq!(s.output_scroll, 4);
    }

    #[test]
    fn begin_task_resets_output() {
        let mut s = state();
        s.output_follow = false;
        s.set_output("old".to_owned());
        s.begin_task(TaskKind::Edit);
        assert_eq!(s.busy, Some(TaskKind::Edit));
        assert!(s.output.is_empty());
        assert!(s.output_follow);
    }

    #[test]
    fn diff_scroll_saturates() {
        let mut s = state();
        s.scroll_up(5);
        assert_eq!(s.diff_scroll, 0);
        s.diff_viewport_height = 10;
        s.half_page_down();
        assert_eq!(s.diff_scroll, 5);
    }
}
