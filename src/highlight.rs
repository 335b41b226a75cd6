//! Search-term highlighting for result snippets.
//!
//! The query is split on whitespace and every term is matched literally,
//! case-insensitively and as a substring. All terms go into one alternation,
//! so overlaps resolve leftmost-first: for terms `ab` and `b` in `"abb"`,
//! the result is `<mark>ab</mark><mark>b</mark>`.

use regex::{Captures, Regex, RegexBuilder};
use tracing::warn;

pub const DEFAULT_OPEN: &str = "<mark>";
pub const DEFAULT_CLOSE: &str = "</mark>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Highlighter {
    open: String,
    close: String,
}

impl Default for Highlighter {
    fn default() -> Self {
        Self::with_marker(DEFAULT_OPEN, DEFAULT_CLOSE)
    }
}

impl Highlighter {
    pub fn with_marker(open: impl Into<String>, close: impl Into<String>) -> Self {
        Self {
            open: open.into(),
            close: close.into(),
        }
    }

    /// Wrap every match of any query term in the marker.
    ///
    /// A blank query returns `text` untouched. Matched text keeps its
    /// original casing and unmatched text is copied verbatim.
    pub fn highlight(&self, text: &str, query: &str) -> String {
        let Some(pattern) = build_pattern(query) else {
            return text.to_string();
        };

        pattern
            .replace_all(text, |caps: &Captures| {
                format!("{}{}{}", self.open, &caps[0], self.close)
            })
            .into_owned()
    }

    /// Remove this highlighter's markers.
    pub fn strip_markers(&self, annotated: &str) -> String {
        annotated.replace(&self.open, "").replace(&self.close, "")
    }
}

/// Whitespace-separated, non-empty query terms.
pub fn query_terms(query: &str) -> Vec<&str> {
    query.split_whitespace().collect()
}

fn build_pattern(query: &str) -> Option<Regex> {
    let terms = query_terms(query);
    if terms.is_empty() {
        return None;
    }

    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");

    match RegexBuilder::new(&alternation).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            warn!(error = %e, "could not build highlight pattern");
            None
        }
    }
}

/// [`Highlighter::highlight`] with `<mark>` markers.
pub fn highlight(text: &str, query: &str) -> String {
    Highlighter::default().highlight(text, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_query_is_a_no_op() {
        let text = "  Discharge summary\tfor  ";
        assert_eq!(highlight(text, ""), text);
        assert_eq!(highlight(text, "   "), text);
        assert_eq!(highlight(text, "\n\t"), text);
    }

    #[test]
    fn matches_case_insensitively_and_keeps_casing() {
        assert_eq!(
            highlight("Chest Pain and chest tightness", "chest"),
            "<mark>Chest</mark> Pain and <mark>chest</mark> tightness"
        );
    }

    #[test]
    fn multiple_terms_are_all_marked() {
        assert_eq!(
            highlight("SOAP note for sepsis", "sepsis  soap"),
            "<mark>SOAP</mark> note for <mark>sepsis</mark>"
        );
    }

    #[test]
    fn substring_matches_inside_words() {
        assert_eq!(highlight("cardiology", "dio"), "car<mark>dio</mark>logy");
    }

    #[test]
    fn punctuation_is_matched_literally() {
        assert_eq!(highlight("dose (mg) vs mg", "(mg)"), "dose <mark>(mg)</mark> vs mg");
        assert_eq!(highlight("a.b axb", "a.b"), "<mark>a.b</mark> axb");
        assert_eq!(highlight("C++ and C", "c++"), "<mark>C++</mark> and C");
    }

    #[test]
    fn overlapping_terms_resolve_leftmost_first() {
        assert_eq!(highlight("abb", "ab b"), "<mark>ab</mark><mark>b</mark>");
        assert_eq!(highlight("ab", "a ab"), "<mark>a</mark>b");
    }

    #[test]
    fn stripping_markers_restores_text() {
        let h = Highlighter::default();
        let cases = [
            ("Informed consent (IC) form", "ic form"),
            ("日本語の医療プロンプト", "医療"),
            ("  leading and trailing  ", "and"),
            ("nothing matches here", "xyz"),
            ("Ünïcödé Case", "ünï case"),
        ];
        for (text, query) in cases {
            assert_eq!(h.strip_markers(&h.highlight(text, query)), text);
        }
    }

    #[test]
    fn custom_marker() {
        let h = Highlighter::with_marker("[", "]");
        assert_eq!(h.highlight("ICU handoff", "icu"), "[ICU] handoff");
    }
}
