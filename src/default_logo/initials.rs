use unicode_segmentation::UnicodeSegmentation;

/// Longest initials string drawn on a default logo
pub const MAX_INITIALS: usize = 4;

/// Drawn when a name yields nothing usable
pub const PLACEHOLDER: &str = "?";

/// Derive the text drawn on a default logo.
///
/// Multi-word names give one upper-cased initial per word (words starting with
/// punctuation such as `&` are skipped). A single word gives its first four
/// graphemes as written, so accented letters and Hangul syllables stay whole.
pub fn extract_initials(name: &str) -> String {
    let tokens: Vec<&str> = name.split_whitespace().collect();

    let initials = match tokens.as_slice() {
        [] => String::new(),
        [single] => single
            .graphemes(true)
            .filter(|g| !g.chars().all(char::is_control))
            .take(MAX_INITIALS)
            .collect(),
        many => many
            .iter()
            .filter_map(|token| token.graphemes(true).next())
            .filter(|g| g.chars().next().is_some_and(char::is_alphanumeric))
            .take(MAX_INITIALS)
            .map(|g| g.to_uppercase())
            .collect(),
    };

    if initials.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        initials
    }
}
