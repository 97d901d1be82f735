//! Output panel: the running task's streamed text.

use ratatui::{
    Frame,
    layout::Rect,
    style::{Style, Stylize as _},
    text::Text,
    widgets::{Paragraph, Wrap},
};

use crate::app::{AppState, PanelFocus};
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

pub fn render_output(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let block = panel_block("Assistant", state.focus == PanelFocus::Output, theme);
    let inner = inner_rect(area);
    frame.render_widget(block, area);

    let body = if state.output.is_empty() {
        Text::from("No output yet.").fg(theme.border_inactive)
    } else {
        Text::from(state.output.as_str())
    };
    let paragraph = Paragraph::new(body)
        .style(Style::default().fg(theme.stream_text))
        .wrap(Wrap { trim: false })
        .scroll((state.output_scroll, 0));
    frame.render_widget(paragraph, inner);
}
