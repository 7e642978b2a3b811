//! Text normalization shared by the crystallizer, memories and mention matching

/// Trim, lowercase and collapse internal whitespace
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Lowercase word tokens with surrounding punctuation stripped
///
/// `@` is kept so that `@luna` stays distinguishable from `luna`.
pub fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '@' && c != '-' && c != '_')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
}

pub fn word_count(normalized: &str) -> usize {
    normalized.split_whitespace().count()
}
