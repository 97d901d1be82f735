//! Outbound prompt construction.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::debug;

use crate::types::{Comment, HistoryTurn, Tier};

const PRECISION: &str =
    "Make the changes directly to the file. Be precise and only change what's requested.";
const CHAT_SEPARATOR: &str = "\n\n---\n\n";

/// A sibling document pulled into an edit prompt via `@name.md`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub name: String,
    pub content: String,
}

/// Extracts `@name.md` references from `text`, in order of appearance.
///
/// A name is a run of ASCII letters, digits, `_`, `.` and `-` that ends in
/// `.md`; anything after the last `.md` of the run is ignored.
pub fn reference_names(text: &str) -> Vec<String> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(at) = rest.find('@') {
        rest = &rest[at + 1..];
        let run_len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')))
            .unwrap_or(rest.len());
        let run = &rest[..run_len];
        if let Some(end) = run.rfind(".md").filter(|&i| i > 0) {
            names.push(run[..end + 3].to_owned());
        }
        rest = &rest[run_len..];
    }
    names
}

/// Reads every distinct reference named in `comments` from `dir`.
///
/// Unreadable references are skipped.
pub async fn resolve_references(dir: &Path, comments: &[Comment]) -> Vec<Reference> {
    let names: BTreeSet<String> = comments
        .iter()
        .flat_map(|c| reference_names(&c.instruction))
        .collect();

    let mut refs = Vec::with_capacity(names.len());
    for name in names {
        match tokio::fs::read_to_string(dir.join(&name)).await {
            Ok(content) => refs.push(Reference { name, content }),
            Err(e) => debug!(reference = %name, error = %e, "skipping unreadable reference"),
        }
    }
    refs
}

/// Builds the edit prompt for `target`.
///
/// Layout: a tier-dependent header naming the file, the current content, the
/// numbered comments, the precision instruction, then any references.
pub fn build_edit_prompt(
    target: &Path,
    content: &str,
    comments: &[Comment],
    references: &[Reference],
    tier: Tier,
) -> String {
    let path = target.display();
    let mut out = match tier {
        Tier::Fast => format!(
            "Edit the file at {path}. Read it, apply the changes, and stop. Do not explain.\n\n"
        ),
        Tier::Default | Tier::Max => format!("Update the file {path} with these changes.\n\n"),
    };

    out.push_str("Current content:\n```\n");
    out.push_str(content);
    if !content.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("```\n\nChanges:\n");

    for (n, c) in comments.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. Selected text:\n\"\"\"\n{}\n\"\"\"\nInstruction: {}\n",
            n + 1,
            c.selected_text,
            c.instruction
        ));
        if let Some(hint) = &c.line_hint {
            out.push_str(&format!("Near line: {hint}\n"));
        }
    }

    out.push('\n');
    out.push_str(PRECISION);

    for r in references {
        out.push_str(&format!("\n\nReference document ({}):\n```\n{}\n```", r.name, r.content));
    }
    out
}

/// Builds the chat prompt. `content` is `None` when the document could not
/// be read.
pub fn build_chat_prompt(
    document_path: &Path,
    content: Option<&str>,
    selection: Option<&str>,
    history: &[HistoryTurn],
    message: &str,
) -> String {
    let mut parts = vec![format!(
        "The user is working on a document at {}. Here is its current content:\n\n{}",
        document_path.display(),
        content.unwrap_or("(could not read file)")
    )];

    if let Some(sel) = selection.filter(|s| !s.is_empty()) {
        parts.push(format!("The user has selected this text for context:\n\n{sel}"));
    }

    if !history.is_empty() {
        let turns: Vec<String> = history
            .iter()
            .map(|t| format!("{}: {}", t.role.as_str(), t.content))
            .collect();
        parts.push(format!("Previous conversation:\n\n{}", turns.join("\n\n")));
    }

    parts.push(format!("User message: {message}"));
    parts.join(CHAT_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatRole, CommentStatus};

    fn comment(selected: &str, instruction: &str, hint: Option<&str>) -> Comment {
        Comment {
            id: 1,
            document_id: 1,
            selected_text: selected.into(),
            instruction: instruction.into(),
            line_hint: hint.map(Into::into),
            status: CommentStatus::Pending,
            request_id: None,
            created_at: 0,
            resolved_at: None,
        }
    }

    #[test]
    fn finds_md_references() {
        assert_eq!(
            reference_names("see @style-guide.md and @notes.md, not @foo or @x.md.bak"),
            ["style-guide.md", "notes.md", "x.md"]
        );
        assert!(reference_names("mail me@home").is_empty());
        assert!(reference_names("@.md").is_empty());
    }

    #[test]
    fn edit_prompt_orders_sections() {
        let comments = [
            comment("Old", "make it new", Some("2")),
            comment("T", "shout", None),
        ];
        let refs = [Reference { name: "guide.md".into(), content: "be terse".into() }];
        let p = build_edit_prompt(Path::new("/d/a.md"), "# T\nOld", &comments, &refs, Tier::Default);

        let header = p.find("Update the file /d/a.md").unwrap();
        let content = p.find("# T\nOld").unwrap();
        let first = p.find("1. Selected text:\n\"\"\"\nOld\n\"\"\"\nInstruction: make it new").unwrap();
        let second = p.find("2. Selected text:").unwrap();
        let precision = p.find(PRECISION).unwrap();
        let reference = p.find("Reference document (guide.md):\n```\nbe terse\n```").unwrap();
        assert!(header < content && content < first && first < second);
        assert!(second < precision && precision < reference);
        assert!(p.contains("Near line: 2"));
    }

    #[test]
    fn fast_tier_asks_to_stop() {
        let p = build_edit_prompt(Path::new("a.md"), "x", &[comment("x", "y", None)], &[], Tier::Fast);
        assert!(p.starts_with("Edit the file at a.md. Read it, apply the changes, and stop."));
    }

    #[test]
    fn chat_prompt_sections() {
        let history = [
            HistoryTurn { role: ChatRole::User, content: "hi".into() },
            HistoryTurn { role: ChatRole::Assistant, content: "hello".into() },
        ];
        let p = build_chat_prompt(Path::new("a.md"), None, Some("sel"), &history, "why?");
        let parts: Vec<&str> = p.split(CHAT_SEPARATOR).collect();
        assert_eq!(parts.len(), 4);
        assert!(parts[0].ends_with("(could not read file)"));
        assert_eq!(parts[1], "The user has selected this text for context:\n\nsel");
        assert_eq!(parts[2], "Previous conversation:\n\nuser: hi\n\nassistant: hello");
        assert_eq!(parts[3], "User message: why?");
    }
}
