//! Line diffs of pretty-printed values.

use std::fmt::{Debug, Write};

/// Diff the `{:#?}` renderings of `expected` and `actual`.
///
/// Lines only in `expected` start with `-`, lines only in `actual` with `+`.
pub fn debug_diff<T: Debug + ?Sized>(expected: &T, actual: &T) -> String {
    line_diff(&format!("{expected:#?}"), &format!("{actual:#?}"))
}

pub fn line_diff(expected: &str, actual: &str) -> String {
    let mut out = String::new();
    for line in diff::lines(expected, actual) {
        let _ = match line {
            diff::Result::Both(same, _) => writeln!(out, "  {same}"),
            diff::Result::Left(removed) => writeln!(out, "- {removed}"),
            diff::Result::Right(added) => writeln!(out, "+ {added}"),
        };
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Counter {
        count: i32,
        label: &'static str,
    }

    #[test]
    fn marks_changed_lines_only() {
        let diff = debug_diff(
            &Counter { count: 1, label: "a" },
            &Counter { count: 2, label: "a" },
        );

        assert_eq!(
            diff,
            "  Counter {\n-     count: 1,\n+     count: 2,\n      label: \"a\",\n  }"
        );
    }

    #[test]
    fn identical_values_have_no_markers() {
        let diff = line_diff("a\nb", "a\nb");
        assert_eq!(diff, "  a\n  b");
    }

    #[test]
    fn insertions_and_removals() {
        assert_eq!(line_diff("a\nb\nc", "a\nc\nd"), "  a\n- b\n  c\n+ d");
    }

    #[test]
    fn long_states_diff_only_the_changed_line() {
        let expected: Vec<u32> = (0..6000).collect();
        let mut actual = expected.clone();
        actual[3000] = 0;

        let diff = debug_diff(&expected, &actual);
        let changed: Vec<&str> = diff
            .lines()
            .filter(|line| line.starts_with("- ") || line.starts_with("+ "))
            .collect();

        assert_eq!(changed, vec!["-     3000,", "+     0,"]);
    }
}
