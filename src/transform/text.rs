//! Text cleanup applied to detail-page content before it is stored.

use std::sync::LazyLock;

use regex::Regex;

static INTRO_LABEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(Introduction|Apply)").unwrap());
static DESCRIPTION_LABEL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(Job offer)").unwrap());
// The character after the punctuation must not be whitespace or a digit.
static GLUED_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([.,;:?!()])([^\s\d])").unwrap());

/// Drop a leading "Introduction" or "Apply" label, then trim.
pub fn strip_intro_label(text: &str) -> String {
    INTRO_LABEL_RE.replace(text, "").trim().to_string()
}

/// Drop a leading "Job offer" label, then trim.
pub fn strip_description_label(text: &str) -> String {
    DESCRIPTION_LABEL_RE.replace(text, "").trim().to_string()
}

/// Insert a space after punctuation glued to the next word.
///
/// Digits right after the punctuation are left alone so decimals survive,
/// which also means `"word.5"` stays unspaced.
pub fn fix_spacing(text: &str) -> String {
    GLUED_PUNCT_RE.replace_all(text, "$1 $2").into_owned()
}
