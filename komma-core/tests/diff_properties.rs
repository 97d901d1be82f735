//! Properties of the line diff over arbitrary texts.

use komma_core::diff::{compute_line_diff, reconstruct_after, reconstruct_before, DiffKind};
use proptest::prelude::*;

// Small alphabet so generated texts share lines often.
fn text() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vec!["a", "b", "c", "", "# T"]), 0..12)
        .prop_map(|lines| lines.join("\n"))
}

proptest! {
    #[test]
    fn identical_texts_are_unchanged(a in text()) {
        let d = compute_line_diff(&a, &a);
        prop_assert!(d.iter().all(|l| l.kind == DiffKind::Unchanged));
    }

    #[test]
    fn diff_reconstructs_both_sides(a in text(), b in text()) {
        let d = compute_line_diff(&a, &b);
        prop_assert_eq!(reconstruct_after(&d), b.clone());
        prop_assert_eq!(reconstruct_before(&d), a.clone());
    }

    #[test]
    fn every_line_appears_once(a in text(), b in text()) {
        let d = compute_line_diff(&a, &b);
        let unchanged = d.iter().filter(|l| l.kind == DiffKind::Unchanged).count();
        let added = d.iter().filter(|l| l.kind == DiffKind::Added).count();
        let removed = d.iter().filter(|l| l.kind == DiffKind::Removed).count();
        prop_assert_eq!(unchanged + removed, a.split('\n').count());
        prop_assert_eq!(unchanged + added, b.split('\n').count());
    }

    #[test]
    fn repeated_runs_agree(a in text(), b in text()) {
        prop_assert_eq!(compute_line_diff(&a, &b), compute_line_diff(&a, &b));
    }
}
