//! Line-level diff between two texts.
//!
//! Classic LCS dynamic program: an `(n+1) × (m+1)` table of common-subsequence
//! lengths, then a backtrack from `(n, m)` that is reversed into display order.
//! O(n·m) time and space, which is fine for ordinary documents.
//!
//! When both "added" and "removed" are valid moves during the backtrack the
//! "added" move wins. Because the sequence is built back to front, this puts
//! the removed line before the added line in each adjacent change pair. The
//! rule is cosmetic but must stay fixed so repeated runs produce identical
//! output.

/// Classification of a line in the edit script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    Added,
    Removed,
    Unchanged,
}

/// One line of the edit script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub kind: DiffKind,
    pub content: String,
}

/// Counts of changed lines, for status bars and changelog summaries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffStats {
    pub added: usize,
    pub removed: usize,
}

/// Computes the line edit script turning `before` into `after`.
///
/// Lines are split on `'\n'` exactly, so a trailing newline yields a final
/// empty line and the texts can be rebuilt byte-for-byte with
/// [`reconstruct_after`] / [`reconstruct_before`]. Every line of both inputs
/// appears exactly once in the result.
pub fn compute_line_diff(before: &str, after: &str) -> Vec<DiffLine> {
    let a: Vec<&str> = before.split('\n').collect();
    let b: Vec<&str> = after.split('\n').collect();
    let n = a.len();
    let m = b.len();

    // Row-major (n+1) x (m+1) LCS length table.
    let width = m + 1;
    let mut dp = vec![0u32; (n + 1) * width];
    for i in 1..=n {
        for j in 1..=m {
            dp[i * width + j] = if a[i - 1] == b[j - 1] {
                dp[(i - 1) * width + (j - 1)] + 1
            } else {
                dp[(i - 1) * width + j].max(dp[i * width + (j - 1)])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (n, m);
    while i > 0 || j > 0 {
        if i > 0 && j > 0 && a[i - 1] == b[j - 1] {
            out.push(DiffLine { kind: DiffKind::Unchanged, content: a[i - 1].to_owned() });
            i -= 1;
            j -= 1;
        } else if j > 0 && (i == 0 || dp[i * width + (j - 1)] >= dp[(i - 1) * width + j]) {
            out.push(DiffLine { kind: DiffKind::Added, content: b[j - 1].to_owned() });
            j -= 1;
        } else {
            out.push(DiffLine { kind: DiffKind::Removed, content: a[i - 1].to_owned() });
            i -= 1;
        }
    }

    out.reverse();
    out
}

/// Rebuilds the "after" text: added and unchanged lines, in order.
pub fn reconstruct_after(lines: &[DiffLine]) -> String {
    join_where(lines, |k| k != DiffKind::Removed)
}

/// Rebuilds the "before" text: removed and unchanged lines, in order.
pub fn reconstruct_before(lines: &[DiffLine]) -> String {
    join_where(lines, |k| k != DiffKind::Added)
}

fn join_where(lines: &[DiffLine], keep: impl Fn(DiffKind) -> bool) -> String {
    lines
        .iter()
        .filter(|l| keep(l.kind))
        .map(|l| l.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Counts added and removed lines.
pub fn stats(lines: &[DiffLine]) -> DiffStats {
    lines.iter().fold(DiffStats::default(), |mut s, l| {
        match l.kind {
            DiffKind::Added => s.added += 1,
            DiffKind::Removed => s.removed += 1,
            DiffKind::Unchanged => {}
        }
        s
    })
}
