//! Modal overlays: the help screen and the quit confirmation.
//!
//! Both draw inside the same `terminal.draw()` closure as the panels; `Clear`
//! erases the area underneath first.

use ratatui::{
    Frame,
    layout::Constraint,
    style::Style,
    text::{Line, Text},
    widgets::{Block, Clear, Paragraph, Wrap},
};

use crate::theme::Theme;

/// Skipped below 60 columns, where the centred area would collapse to zero
/// height.
pub fn render_help_overlay(frame: &mut Frame, theme: &Theme, help_scroll: u16) {
    if frame.area().width < 60 {
        return;
    }

    let overlay_area = frame
        .area()
        .centered(Constraint::Percentage(80), Constraint::Percentage(80));

    frame.render_widget(Clear, overlay_area);

    let block = Block::bordered()
        .title(" Help  (j/k scroll, ? or Esc to dismiss) ")
        .border_style(Style::default().fg(theme.border_active));

    frame.render_widget(
        Paragraph::new(build_help_text())
            .block(block)
            .wrap(Wrap { trim: false })
            .scroll((help_scroll, 0)),
        overlay_area,
    );
}

/// Small centred dialog asking whether to kill the running task and quit.
pub fn render_confirm_quit(frame: &mut Frame, theme: &Theme) {
    let area = frame
        .area()
        .centered(Constraint::Length(44), Constraint::Length(5));
    frame.render_widget(Clear, area);

    let block = Block::bordered()
        .title(" Quit ")
        .border_style(Style::default().fg(theme.status_busy));
    let text = Text::from(vec![
        Line::from("A task is still running."),
        Line::from("Quit and cancel it?  y / n"),
    ]);
    frame.render_widget(Paragraph::new(text).block(block).centered(), area);
}

fn build_help_text() -> Text<'static> {
    Text::from(vec![
        Line::from("Review"),
        Line::from("  s             Send pending comments to the assistant"),
        Line::from("  t             Cycle tier: fast -> default -> max"),
        Line::from("  x             Cancel the running task"),
        Line::from("  a             Approve the edit (applied comments are removed)"),
        Line::from("  r             Reject the edit (document restored, comments pending)"),
        Line::from(""),
        Line::from("Navigation"),
        Line::from("  Tab           Switch between output and review panels"),
        Line::from("  j / k         Scroll down / up one line"),
        Line::from("  g / G         Jump to top / bottom (G follows output)"),
        Line::from("  Ctrl-d / u    Scroll half page down / up"),
        Line::from("  Ctrl-f / b    Scroll full page down / up"),
        Line::from(""),
        Line::from("General"),
        Line::from("  ?             Open / close this help overlay"),
        Line::from("  q / Esc       Quit (confirms while a task is running)"),
    ])
}
