//! Text normalization and tokenization
//!
//! This is the frozen contract shared by every caller that touches tag text:
//! the search query path, the worker's tag-name validation, and seed scripts.
//! Indexing and querying must normalize identically or recall silently breaks,
//! so all transformations live here and nowhere else.
//!
//! All functions are pure and never error. Invalid input degrades to an empty
//! string, an empty list, or `None`; validation decisions belong to callers.

use std::collections::HashSet;

/// Default stopword set. Extendable per `Normalizer` instance; matching is
/// exact whole-token only.
pub const DEFAULT_STOPWORDS: &[&str] = &["a", "an", "the"];

/// Collapse ASCII whitespace runs (space/tab/newline) to single spaces and
/// trim both ends. Non-ASCII whitespace is deliberately left alone here; it
/// is removed outright by the non-ASCII filter in [`normalize_query_string`].
fn collapse_whitespace(s: &str) -> String {
    s.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalize raw query text into the canonical searchable form.
///
/// Pipeline:
/// 1. Collapse whitespace runs to single spaces, trim ends.
/// 2. Lowercase ASCII letters only (no Unicode-aware casing).
/// 3. Drop every non-ASCII codepoint outright (no substitution) — emoji-only
///    input becomes the empty string.
/// 4. Replace anything outside `[a-z0-9 -]` with a space, then turn hyphens
///    that are not strictly between two alphanumerics into spaces
///    (`"-sad-"` becomes `" sad "`, `"film-noir"` survives).
/// 5. Collapse whitespace again, since step 4 introduces new runs.
///
/// Idempotent: applying it twice yields the same output as applying it once.
pub fn normalize_query_string(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);

    let ascii_lower: String = collapsed
        .chars()
        .filter(|c| c.is_ascii())
        .map(|c| c.to_ascii_lowercase())
        .collect();

    // Punctuation to spaces, keeping hyphens for the positional check below.
    let chars: Vec<char> = ascii_lower
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == ' ' || c == '-' {
                c
            } else {
                ' '
            }
        })
        .collect();

    // A hyphen survives only when strictly between two alphanumerics; the
    // check runs against the pre-edit positions so "--x--" loses all four.
    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == '-' {
            let prev_ok = i > 0 && chars[i - 1].is_ascii_alphanumeric();
            let next_ok = chars
                .get(i + 1)
                .is_some_and(|n| n.is_ascii_alphanumeric());
            out.push(if prev_ok && next_ok { '-' } else { ' ' });
        } else {
            out.push(c);
        }
    }

    collapse_whitespace(&out)
}

/// Tokenizer and tag validator carrying the configured stopword set.
#[derive(Debug, Clone)]
pub struct Normalizer {
    stopwords: HashSet<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_stopwords(DEFAULT_STOPWORDS.iter().map(|s| s.to_string()))
    }
}

impl Normalizer {
    /// Build a normalizer with an explicit stopword set. Stopwords are
    /// normalized on the way in so the set matches post-pipeline tokens.
    pub fn with_stopwords<I>(stopwords: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let stopwords = stopwords
            .into_iter()
            .map(|s| normalize_query_string(&s))
            .filter(|s| !s.is_empty())
            .collect();
        Self { stopwords }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Split a raw query into distinct search tokens.
    ///
    /// Normalizes, splits on single spaces, removes stopwords (exact
    /// whole-token match), then deduplicates preserving first-seen order.
    /// Empty or whitespace-only input yields an empty list.
    pub fn tokenize_query(&self, raw: &str) -> Vec<String> {
        let normalized = normalize_query_string(raw);
        if normalized.is_empty() {
            return Vec::new();
        }

        let mut seen = HashSet::new();
        normalized
            .split(' ')
            .filter(|t| !self.stopwords.contains(*t))
            .filter(|t| seen.insert(t.to_string()))
            .map(|t| t.to_string())
            .collect()
    }

    /// Validate a raw string as a single-token tag name.
    ///
    /// Returns `None` (never panics or errors) when the normalized result is
    /// empty, is itself a stopword, or still contains a space — multi-word
    /// phrases are invalid tags and are rejected, not silently joined.
    pub fn normalize_tag_name(&self, raw: &str) -> Option<String> {
        let normalized = normalize_query_string(raw);
        if normalized.is_empty()
            || normalized.contains(' ')
            || self.stopwords.contains(&normalized)
        {
            return None;
        }
        Some(normalized)
    }

    /// Expand a normalized single-token tag into itself plus its hyphen parts.
    ///
    /// `"film-noir"` yields `["film-noir", "film", "noir"]`, letting a query
    /// for the two separate words match an image tagged with the compound.
    /// Each part is independently re-validated through [`normalize_tag_name`]
    /// and duplicates are dropped; a non-hyphenated token yields just itself.
    pub fn expand_hyphenated_token(&self, tag_name: &str) -> Vec<String> {
        if !tag_name.contains('-') {
            return vec![tag_name.to_string()];
        }

        let mut out = vec![tag_name.to_string()];
        for part in tag_name.split('-') {
            if let Some(valid) = self.normalize_tag_name(part) {
                if !out.contains(&valid) {
                    out.push(valid);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "  Sad   Pepe\t\n",
            "it, was! a (film-noir)",
            "--sad--",
            "café ☕ emoji",
            "",
            "already normal",
        ];
        for s in samples {
            let once = normalize_query_string(s);
            assert_eq!(normalize_query_string(&once), once, "input: {s:?}");
        }
    }

    #[test]
    fn normalize_collapses_whitespace_and_lowercases() {
        assert_eq!(normalize_query_string("  Sad \t PEPE \n"), "sad pepe");
    }

    #[test]
    fn normalize_drops_non_ascii_outright() {
        // No substitution: emoji-only input becomes the empty string.
        assert_eq!(normalize_query_string("☕🎬"), "");
        // Removal joins neighbors rather than inserting a space.
        assert_eq!(normalize_query_string("caf\u{e9}s"), "cafs");
    }

    #[test]
    fn hyphens_survive_only_between_alphanumerics() {
        assert_eq!(normalize_query_string("film-noir"), "film-noir");
        assert_eq!(normalize_query_string("-sad-"), "sad");
        assert_eq!(normalize_query_string("--x--"), "x");
        assert_eq!(normalize_query_string("a - b"), "a b");
    }

    #[test]
    fn tokenize_dedupes_preserving_order() {
        let n = Normalizer::default();
        assert_eq!(n.tokenize_query("sad sad pepe sad"), vec!["sad", "pepe"]);
    }

    #[test]
    fn tokenize_empty_input_is_empty() {
        let n = Normalizer::default();
        assert_eq!(n.tokenize_query(""), Vec::<String>::new());
        assert_eq!(n.tokenize_query("   \t\n"), Vec::<String>::new());
    }

    #[test]
    fn tokenize_removes_stopwords() {
        let n = Normalizer::default();
        assert_eq!(n.tokenize_query("a the pepe"), vec!["pepe"]);
    }

    #[test]
    fn tokenize_punctuation_and_hyphen_rules() {
        let n = Normalizer::default();
        assert_eq!(
            n.tokenize_query("it, was! a (film-noir)"),
            vec!["it", "was", "film-noir"]
        );
        assert_eq!(n.tokenize_query("--sad--"), vec!["sad"]);
    }

    #[test]
    fn extended_stopword_set() {
        let n = Normalizer::with_stopwords(
            ["a", "an", "the", "s", "re"].iter().map(|s| s.to_string()),
        );
        assert_eq!(n.tokenize_query("the s re pepe"), vec!["pepe"]);
    }

    #[test]
    fn tag_name_rejects_multi_token() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_tag_name("sad, angry"), None);
    }

    #[test]
    fn tag_name_normalizes_valid_input() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_tag_name("  Pepe "), Some("pepe".to_string()));
    }

    #[test]
    fn tag_name_rejects_empty_and_stopwords() {
        let n = Normalizer::default();
        assert_eq!(n.normalize_tag_name(""), None);
        assert_eq!(n.normalize_tag_name("☕"), None);
        assert_eq!(n.normalize_tag_name("the"), None);
    }

    #[test]
    fn hyphen_expansion_order_and_membership() {
        let n = Normalizer::default();
        assert_eq!(
            n.expand_hyphenated_token("film-noir"),
            vec!["film-noir", "film", "noir"]
        );
        assert_eq!(n.expand_hyphenated_token("noir"), vec!["noir"]);
    }

    #[test]
    fn hyphen_expansion_drops_stopword_and_duplicate_parts() {
        let n = Normalizer::default();
        // "the" part is a stopword, duplicate "x" collapses.
        assert_eq!(
            n.expand_hyphenated_token("x-the-x"),
            vec!["x-the-x", "x"]
        );
    }
}
