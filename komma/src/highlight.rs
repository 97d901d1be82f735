//! Turns a line diff into styled ratatui lines.
//!
//! Every line is syntax-highlighted with syntect using the document's
//! extension. A removed line immediately followed by an added line is treated
//! as a modification and rendered with word-level emphasis from `similar`.

use std::path::Path;
use std::sync::LazyLock;

use komma_core::diff::{DiffKind, DiffLine};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use similar::{ChangeTag, TextDiff};
use syntect::easy::HighlightLines;
use syntect::highlighting::ThemeSet;
use syntect::parsing::SyntaxSet;

use crate::theme::Theme;

static PS: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);
static TS: LazyLock<ThemeSet> = LazyLock::new(ThemeSet::load_defaults);

/// Loads the syntax and theme sets so the first review does not stall.
pub fn warm_up() {
    let _ = &*PS;
    let _ = &*TS;
}

fn syntect_to_span(style: syntect::highlighting::Style, content: &str) -> Span<'static> {
    use syntect::highlighting::Color as SC;
    let to_color = |c: SC| -> Option<Color> {
        if c.a > 0 { Some(Color::Rgb(c.r, c.g, c.b)) } else { None }
    };
    let mut ratatui_style = Style::default();
    if let Some(fg) = to_color(style.foreground) {
        ratatui_style = ratatui_style.fg(fg);
    }
    if style.font_style.contains(syntect::highlighting::FontStyle::BOLD) {
        ratatui_style = ratatui_style.add_modifier(Modifier::BOLD);
    }
    if style.font_style.contains(syntect::highlighting::FontStyle::ITALIC) {
        ratatui_style = ratatui_style.add_modifier(Modifier::ITALIC);
    }
    if style.font_style.contains(syntect::highlighting::FontStyle::UNDERLINE) {
        ratatui_style = ratatui_style.add_modifier(Modifier::UNDERLINED);
    }
    Span::styled(content.to_owned(), ratatui_style)
}

/// Falls back to a plain span when syntect yields nothing.
fn build_syntect_spans(code: &str, h: Option<&mut HighlightLines>) -> Vec<Span<'static>> {
    let spans: Vec<Span<'static>> = match h {
        Some(h) => h
            .highlight_line(code, &PS)
            .unwrap_or_default()
            .into_iter()
            .map(|(style, text)| syntect_to_span(style, text))
            .collect(),
        None => Vec::new(),
    };
    if spans.is_empty() {
        vec![Span::raw(code.to_owned())]
    } else {
        spans
    }
}

/// Word-level spans for a removed/added pair. Changed words are bold in the
/// side's colour; shared words are dimmed.
fn word_diff_spans(
    old_line: &str,
    new_line: &str,
    theme: &Theme,
) -> (Vec<Span<'static>>, Vec<Span<'static>>) {
    let diff = TextDiff::from_words(old_line, new_line);
    let mut old_spans: Vec<Span<'static>> = Vec::new();
    let mut new_spans: Vec<Span<'static>> = Vec::new();

    for op in diff.ops() {
        for change in diff.iter_inline_changes(op) {
            for (emphasized, value) in change.iter_strings_lossy() {
                let text = value.into_owned();
                match change.tag() {
                    ChangeTag::Delete => {
                        old_spans.push(Span::styled(text, side_style(theme.diff_removed, emphasized)));
                    }
                    ChangeTag::Insert => {
                        new_spans.push(Span::styled(text, side_style(theme.diff_added, emphasized)));
                    }
                    ChangeTag::Equal => {
                        let span = Span::styled(text, Style::default().fg(Color::DarkGray));
                        old_spans.push(span.clone());
                        new_spans.push(span);
                    }
                }
            }
        }
    }
    (old_spans, new_spans)
}

fn side_style(color: Color, emphasized: bool) -> Style {
    let style = Style::default().fg(color);
    if emphasized { style.add_modifier(Modifier::BOLD) } else { style }
}

fn prefixed(prefix: &'static str, color: Color, spans: Vec<Span<'static>>) -> Line<'static> {
    let mut s = Vec::with_capacity(spans.len() + 1);
    s.push(Span::styled(prefix, Style::default().fg(color)));
    s.extend(spans);
    Line::from(s)
}

/// Extension used to pick a syntax; documents without one are Markdown.
fn file_ext(path: &Path) -> &str {
    path.extension().and_then(|e| e.to_str()).unwrap_or("md")
}

/// Renders `lines` for the diff panel. Output has exactly one line per input
/// line.
pub fn highlight_diff(lines: &[DiffLine], document: &Path, theme: &Theme) -> Vec<Line<'static>> {
    let syntax = PS
        .find_syntax_by_extension(file_ext(document))
        .unwrap_or_else(|| PS.find_syntax_plain_text());
    let mut h = TS
        .themes
        .get("base16-ocean.dark")
        .or_else(|| TS.themes.values().next())
        .map(|t| HighlightLines::new(syntax, t));

    let mut out: Vec<Line<'static>> = Vec::with_capacity(lines.len());
    let mut pending_removed: Option<(&str, Vec<Span<'static>>)> = None;

    for dl in lines {
        let code = dl.content.as_str();
        let base_spans = build_syntect_spans(code, h.as_mut());

        match dl.kind {
            DiffKind::Removed => {
                if let Some((_, spans)) = pending_removed.take() {
                    out.push(prefixed("- ", theme.diff_removed, spans));
                }
                pending_removed = Some((code, base_spans));
            }
            DiffKind::Added => {
                if let Some((old_code, _)) = pending_removed.take() {
                    let (old_word, new_word) = word_diff_spans(old_code, code, theme);
                    out.push(prefixed("- ", theme.diff_removed, old_word));
                    out.push(prefixed("+ ", theme.diff_added, new_word));
                } else {
                    out.push(prefixed("+ ", theme.diff_added, base_spans));
                }
            }
            DiffKind::Unchanged => {
                if let Some((_, spans)) = pending_removed.take() {
                    out.push(prefixed("- ", theme.diff_removed, spans));
                }
                out.push(prefixed("  ", theme.diff_context, base_spans));
            }
        }
    }
    if let Some((_, spans)) = pending_removed.take() {
        out.push(prefixed("- ", theme.diff_removed, spans));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use komma_core::diff::compute_line_diff;

    fn text(line: &Line<'_>) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn one_rendered_line_per_diff_line() {
        let diff = compute_line_diff("# Title\nold words here\nkeep\ngone", "# Title\nnew words here\nkeep");
        let lines = highlight_diff(&diff, Path::new("/tmp/doc.md"), &Theme::dark());
        assert_eq!(lines.len(), diff.len());

        let rendered: Vec<String> = lines.iter().map(text).collect();
        assert_eq!(rendered[0], "  # Title");
        assert_eq!(rendered[1], "- old words here");
        assert_eq!(rendered[2], "+ new words here");
        assert_eq!(rendered[3], "  keep");
        assert_eq!(rendered[4], "- gone");
    }

    #[test]
    fn paired_lines_emphasize_changed_words() {
        let theme = Theme::dark();
        let (old, new) = word_diff_spans("the quick fox", "the slow fox", &theme);
        let bold = |spans: &[Span<'_>]| -> String {
            spans
                .iter()
                .filter(|s| s.style.add_modifier.contains(Modifier::BOLD))
                .map(|s| s.content.as_ref())
                .collect()
        };
        assert_eq!(bold(&old), "quick");
        assert_eq!(bold(&new), "slow");
    }

    #[test]
    fn unknown_extension_still_renders() {
        let diff = compute_line_diff("a", "b");
        let lines = highlight_diff(&diff, Path::new("/tmp/notes.zzz"), &Theme::dark());
        assert_eq!(lines.iter().map(text).collect::<Vec<_>>(), ["- a", "+ b"]);
    }
}
