//! Diff panel.
//!
//! Virtual scrolling over a `List`: only `diff_lines[scroll..scroll+height]`
//! become `ListItem`s each frame, so long documents stay cheap to draw.

use ratatui::{
    Frame,
    layout::Rect,
    text::Line,
    widgets::{List, ListItem},
};

use crate::app::{AppState, PanelFocus};
use crate::theme::Theme;
use crate::ui::layout::{inner_rect, panel_block};

pub fn render_diff(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
    let title = match state.diff_stats {
        Some(s) => format!("Review  +{} -{}  (a approve, r reject)", s.added, s.removed),
        None => "Review".to_owned(),
    };
    let block = panel_block(title, state.focus == PanelFocus::Diff, theme);
    let inner = inner_rect(area);
    let viewport_height = inner.height as usize;

    frame.render_widget(block, area);

    if state.diff_lines.is_empty() {
        let msg = if state.busy.is_some() {
            "Waiting for the assistant..."
        } else {
            "Nothing to review. Press s to send pending comments."
        };
        frame.render_widget(List::new(vec![ListItem::new(Line::raw(msg))]), inner);
        return;
    }

    let total = state.diff_lines.len();
    let visible_start = state.diff_scroll.min(total.saturating_sub(1));
    let visible_end = (visible_start + viewport_height).min(total);

    let items: Vec<ListItem> = state.diff_lines[visible_start..visible_end]
        .iter()
        .map(|l| ListItem::new(l.clone()))
        .collect();

    frame.render_widget(List::new(items), inner);
}
