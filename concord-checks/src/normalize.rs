//! Canonical text form shared by both extraction channels.
//!
//! Rendered text and API payloads differ in markup, spacing, case and
//! punctuation; [`normalize`] removes those differences so that the two can
//! be compared token by token.
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static MARKUP_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[^>]+>").expect("static markup pattern"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static whitespace pattern"));
static NON_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s]").expect("static punctuation pattern"));

/// Normalize raw text from either source.
///
/// Steps run in this order: strip `<...>` tags, collapse whitespace, lowercase
/// (Unicode default casing, no locale), trim, drop everything that is neither
/// a word character nor whitespace. Dropping punctuation can leave doubled or
/// edge spaces (`"a - b"`), so spacing is collapsed once more at the end;
/// this keeps the result stable under re-normalization.
///
/// ```
/// use concord_checks::normalize::normalize;
///
/// assert_eq!(normalize("<b>Hi</b>  there!"), "hi there");
/// assert_eq!(normalize(" \n\t "), "");
/// ```
pub fn normalize(raw: &str) -> String {
    let text = MARKUP_TAG.replace_all(raw, "");
    let text = WHITESPACE_RUN.replace_all(&text, " ");
    let text = text.to_lowercase();
    let text = text.trim();
    let text = NON_WORD.replace_all(text, "");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Distinct tokens of already-normalized text.
pub fn unique_words(normalized: &str) -> BTreeSet<&str> {
    normalized.split(' ').filter(|w| !w.is_empty()).collect()
}

/// Number of distinct tokens; an empty string has none.
///
/// ```
/// use concord_checks::normalize::count_unique_words;
///
/// assert_eq!(count_unique_words("a b a c b"), 3);
/// assert_eq!(count_unique_words(""), 0);
/// ```
pub fn count_unique_words(normalized: &str) -> usize {
    unique_words(normalized).len()
}
