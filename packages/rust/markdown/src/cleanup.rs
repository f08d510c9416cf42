//! Post-render cleanup passes for page text.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;

/// Run the cleanup pipeline on freshly rendered page text.
pub(crate) fn run_pipeline(text: &str) -> String {
    let result = collapse_blank_lines(text);
    result.trim().to_string()
}

/// Collapse any run of three or more whitespace-padded newlines into one blank line.
fn collapse_blank_lines(text: &str) -> String {
    static BLANK_RUN_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(?:\n\s+){3,}").expect("valid regex"));

    BLANK_RUN_RE.replace_all(text, "\n\n").into_owned()
}
