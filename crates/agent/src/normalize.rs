use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Canonical matching form of free text: lower-cased, accents stripped, punctuation replaced by
/// spaces and whitespace collapsed. Total; empty input gives empty output.
pub fn normalize_text(text: &str) -> String {
    let stripped = text
        .to_lowercase()
        .nfd()
        .filter(|character| !is_combining_mark(*character))
        .map(|character| {
            if character.is_alphanumeric() || character == '_' || character.is_whitespace() {
                character
            } else {
                ' '
            }
        })
        .collect::<String>();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whitespace tokens of an already normalized string.
pub fn tokens(normalized: &str) -> impl Iterator<Item = &str> {
    normalized.split(' ').filter(|token| !token.is_empty())
}

/// True when `needle` occurs in `haystack` bounded by spaces or the string edges.
/// Both sides are expected to be normalized.
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    phrase_position(haystack, needle).is_some()
}

/// Byte offset of the first whole-word occurrence of `needle` in `haystack`.
pub fn phrase_position(haystack: &str, needle: &str) -> Option<usize> {
    if needle.is_empty() {
        return None;
    }
    haystack.match_indices(needle).map(|(start, _)| start).find(|start| {
        let end = start + needle.len();
        let left_ok = *start == 0 || haystack.as_bytes()[start - 1] == b' ';
        let right_ok = end == haystack.len() || haystack.as_bytes()[end] == b' ';
        left_ok && right_ok
    })
}
