//! Two-panel layout and status bar.
//!
//! At `>= 100` columns the output and diff panels sit side by side (35 / 65).
//! Narrower terminals stack them, with the diff taking the larger share.
//!
//! `Spacing::Overlap(1)` with `MergeStrategy::Fuzzy` lets adjacent borders
//! share one column and merge their junction characters.

use ratatui::{
    Frame,
    layout::{Constraint, Layout, Margin, Rect, Spacing},
    style::{Modifier, Style},
    symbols::merge::MergeStrategy,
    text::{Line, Span},
    widgets::{Block, BorderType, Paragraph},
};

use crate::app::{AppState, Mode, StatusKind};
use crate::theme::Theme;

const SPINNER: [&str; 4] = ["|", "/", "-", "\\"];

/// Returns `[output, diff, status_bar]` for the current frame.
pub fn compute_layout(frame: &Frame) -> [Rect; 3] {
    let [main_area, status_bar] =
        frame.area().layout(&Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]));

    let split = if frame.area().width >= 100 {
        Layout::horizontal([Constraint::Percentage(35), Constraint::Percentage(65)])
    } else {
        Layout::vertical([Constraint::Percentage(35), Constraint::Percentage(65)])
    };
    let [output, diff] = main_area.layout(&split.spacing(Spacing::Overlap(1)));

    [output, diff, status_bar]
}

/// The panel area without its border.
pub fn inner_rect(area: Rect) -> Rect {
    area.inner(Margin { vertical: 1, horizontal: 1 })
}

/// Bordered block for a panel: thick border when focused, plain otherwise.
///
/// `Fuzzy` merging is required because `Exact` draws wrong junctions when
/// thick and plain borders meet.
pub fn panel_block<'a>(title: impl Into<Line<'a>>, is_focused: bool, theme: &Theme) -> Block<'a> {
    let border_style = if is_focused {
        Style::default().fg(theme.border_active)
    } else {
        Style::default().fg(theme.border_inactive)
    };
    let border_type = if is_focused { BorderType::Thick } else { BorderType::Plain };

    Block::bordered()
        .title(title)
        .border_type(border_type)
        .border_style(border_style)
        .merge_borders(MergeStrategy::Fuzzy)
}

/// Renders the 1-row status bar: mode badge, document, tier, pending
/// comment count, and the latest status message (or a spinner while busy).
pub fn render_status_bar(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let mode_text = match state.mode {
        Mode::Normal => " NORMAL ",
        Mode::HelpOverlay => " HELP ",
        Mode::ConfirmQuit => " QUIT? ",
    };
    let name = state
        .document
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut spans = vec![
        Span::styled(mode_text, Style::default().fg(theme.status_mode).add_modifier(Modifier::BOLD)),
        Span::raw(format!(" {name} ")),
        Span::raw(format!("[{}] ", tier_label(state))),
        Span::raw(format!("{} pending ", state.pending_comments)),
    ];

    if let Some(kind) = state.busy {
        let frame_char = SPINNER[state.tick % SPINNER.len()];
        spans.push(Span::styled(
            format!("{frame_char} {} running ", kind.as_str()),
            Style::default().fg(theme.status_busy),
        ));
    }
    if !state.status.text.is_empty() {
        let color = match state.status.kind {
            StatusKind::Info => theme.status_bar_fg,
            StatusKind::Success => theme.status_success,
            StatusKind::Error => theme.status_error,
        };
        spans.push(Span::styled(format!(" {}", state.status.text), Style::default().fg(color)));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans))
            .style(Style::default().bg(theme.status_bar_bg).fg(theme.status_bar_fg)),
        area,
    );
}

fn tier_label(state: &AppState) -> &'static str {
    match state.tier {
        komma_core::types::Tier::Fast => "fast",
        komma_core::types::Tier::Default => "default",
        komma_core::types::Tier::Max => "max",
    }
}
