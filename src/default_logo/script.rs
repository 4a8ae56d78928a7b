use serde::Serialize;
use std::fmt;
use unicode_script::{Script, UnicodeScript};

/// Writing-system category used to pick fonts.
///
/// Korean is separate from the Han family: fonts tuned for Chinese or Japanese
/// render Hangul noticeably worse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptCategory {
    Latin,
    Cjk,
    Korean,
    Cyrillic,
    Arabic,
    Other,
}

impl ScriptCategory {
    /// Tie-break order for [`detect_script`]
    pub const ALL: [ScriptCategory; 6] = [
        ScriptCategory::Latin,
        ScriptCategory::Cjk,
        ScriptCategory::Korean,
        ScriptCategory::Cyrillic,
        ScriptCategory::Arabic,
        ScriptCategory::Other,
    ];

    fn index(self) -> usize {
        match self {
            ScriptCategory::Latin => 0,
            ScriptCategory::Cjk => 1,
            ScriptCategory::Korean => 2,
            ScriptCategory::Cyrillic => 3,
            ScriptCategory::Arabic => 4,
            ScriptCategory::Other => 5,
        }
    }

    pub fn is_right_to_left(self) -> bool {
        self == ScriptCategory::Arabic
    }
}

impl fmt::Display for ScriptCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScriptCategory::Latin => "latin",
            ScriptCategory::Cjk => "cjk",
            ScriptCategory::Korean => "korean",
            ScriptCategory::Cyrillic => "cyrillic",
            ScriptCategory::Arabic => "arabic",
            ScriptCategory::Other => "other",
        };
        f.write_str(name)
    }
}

/// Category of a single character; `None` for script-neutral characters
pub fn categorize_char(c: char) -> Option<ScriptCategory> {
    match c.script() {
        Script::Latin => Some(ScriptCategory::Latin),
        Script::Han | Script::Hiragana | Script::Katakana | Script::Bopomofo => {
            Some(ScriptCategory::Cjk)
        }
        Script::Hangul => Some(ScriptCategory::Korean),
        Script::Cyrillic => Some(ScriptCategory::Cyrillic),
        Script::Arabic => Some(ScriptCategory::Arabic),
        Script::Common | Script::Inherited | Script::Unknown => {
            if c.is_ascii_digit() {
                Some(ScriptCategory::Latin)
            } else {
                None
            }
        }
        _ => Some(ScriptCategory::Other),
    }
}

/// Dominant category of `text` by character count.
///
/// Ties go to the category listed first in [`ScriptCategory::ALL`]; text with
/// no classifiable characters is treated as Latin.
pub fn detect_script(text: &str) -> ScriptCategory {
    let mut counts = [0usize; 6];
    for category in text.chars().filter_map(categorize_char) {
        counts[category.index()] += 1;
    }

    let mut best = ScriptCategory::Latin;
    let mut best_count = 0;
    for category in ScriptCategory::ALL {
        if counts[category.index()] > best_count {
            best = category;
            best_count = counts[category.index()];
        }
    }
    best
}
