//! Font resolution for default logos
//!
//! Each writing system has an ordered list of candidate font files: configured
//! overrides first, then well-known platform locations (Linux, macOS, Windows),
//! then the same file names inside the user font directory. The first candidate
//! that loads and covers every initial wins. When none does, rendering drops
//! to the built-in bitmap font.

use ab_glyph::{Font, FontVec};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::script::ScriptCategory;
use crate::config::DefaultLogoConfig;

const LATIN_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/google-noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "/Library/Fonts/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
    "C:\\Windows\\Fonts\\segoeuib.ttf",
];

const CJK_FONTS: &[&str] = &[
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/noto-cjk/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/google-noto-cjk/NotoSansCJK-Bold.ttc",
    "/usr/share/fonts/truetype/wqy/wqy-zenhei.ttc",
    "/usr/share/fonts/wenquanyi/wqy-zenhei/wqy-zenhei.ttc",
    "/System/Library/Fonts/PingFang.ttc",
    "/System/Library/Fonts/Hiragino Sans GB.ttc",
    "C:\\Windows\\Fonts\\msyhbd.ttc",
    "C:\\Windows\\Fonts\\YuGothB.ttc",
    "C:\\Windows\\Fonts\\msgothic.ttc",
];

const KOREAN_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/nanum/NanumGothicBold.ttf",
    "/usr/share/fonts/nanum/NanumGothicBold.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJKkr-Bold.otf",
    "/usr/share/fonts/noto-cjk/NotoSansCJKkr-Bold.otf",
    "/System/Library/Fonts/AppleSDGothicNeo.ttc",
    "C:\\Windows\\Fonts\\malgunbd.ttf",
    "C:\\Windows\\Fonts\\malgun.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Bold.ttc",
];

const CYRILLIC_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/TTF/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/Arial Bold.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const ARABIC_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSansArabic-Bold.ttf",
    "/usr/share/fonts/noto/NotoSansArabic-Bold.ttf",
    "/usr/share/fonts/truetype/noto/NotoNaskhArabic-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/System/Library/Fonts/Supplemental/GeezaPro.ttc",
    "C:\\Windows\\Fonts\\tahomabd.ttf",
    "C:\\Windows\\Fonts\\arialbd.ttf",
];

const OTHER_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/noto/NotoSans-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSans-Bold.ttf",
    "/usr/share/fonts/truetype/unifont/unifont.ttf",
    "/Library/Fonts/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
    "C:\\Windows\\Fonts\\seguisym.ttf",
    "C:\\Windows\\Fonts\\arialuni.ttf",
];

fn platform_candidates(category: ScriptCategory) -> &'static [&'static str] {
    match category {
        ScriptCategory::Latin => LATIN_FONTS,
        ScriptCategory::Cjk => CJK_FONTS,
        ScriptCategory::Korean => KOREAN_FONTS,
        ScriptCategory::Cyrillic => CYRILLIC_FONTS,
        ScriptCategory::Arabic => ARABIC_FONTS,
        ScriptCategory::Other => OTHER_FONTS,
    }
}

/// Font chosen for one logo
#[derive(Clone)]
pub enum ResolvedFont {
    Outline { path: PathBuf, font: Arc<FontVec> },
    Builtin,
}

impl ResolvedFont {
    pub fn label(&self) -> String {
        match self {
            ResolvedFont::Outline { path, .. } => path.display().to_string(),
            ResolvedFont::Builtin => "builtin".to_string(),
        }
    }
}

/// Loads fonts lazily and remembers them (and failed paths) for the run
pub struct FontResolver {
    overrides: DefaultLogoConfig,
    use_platform_fonts: bool,
    loaded: Mutex<HashMap<PathBuf, Option<Arc<FontVec>>>>,
    warned: Mutex<HashSet<ScriptCategory>>,
}

impl FontResolver {
    pub fn new(overrides: &DefaultLogoConfig) -> Self {
        Self {
            overrides: overrides.clone(),
            use_platform_fonts: true,
            loaded: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Resolver that only ever yields the built-in font
    pub fn builtin_only() -> Self {
        Self {
            overrides: DefaultLogoConfig::default(),
            use_platform_fonts: false,
            loaded: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
        }
    }

    /// Ordered candidate paths for a category
    pub fn candidates(&self, category: ScriptCategory) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.overrides.font_paths(category).to_vec();
        if !self.use_platform_fonts {
            return paths;
        }

        let platform = platform_candidates(category);
        paths.extend(platform.iter().map(PathBuf::from));

        if let Some(user_dir) = dirs::font_dir() {
            paths.extend(
                platform
                    .iter()
                    .filter_map(|p| file_name_of(p))
                    .map(|name| user_dir.join(name)),
            );
        }

        let mut seen = HashSet::new();
        paths.retain(|p| seen.insert(p.clone()));
        paths
    }

    /// First candidate font covering every character of `text`
    pub fn resolve(&self, category: ScriptCategory, text: &str) -> ResolvedFont {
        for path in self.candidates(category) {
            let Some(font) = self.load(&path) else {
                continue;
            };
            if covers(font.as_ref(), text) {
                debug!("Using font {} for {} text '{}'", path.display(), category, text);
                return ResolvedFont::Outline { path, font };
            }
        }

        let first_warning = self
            .warned
            .lock()
            .map(|mut warned| warned.insert(category))
            .unwrap_or(true);
        if first_warning && self.use_platform_fonts {
            warn!(
                "No font file covers {} text (e.g. '{}'); using the built-in font",
                category, text
            );
        }
        ResolvedFont::Builtin
    }

    fn load(&self, path: &Path) -> Option<Arc<FontVec>> {
        if let Ok(cache) = self.loaded.lock() {
            if let Some(entry) = cache.get(path) {
                return entry.clone();
            }
        }

        let font = load_font_file(path);
        if let Ok(mut cache) = self.loaded.lock() {
            cache.insert(path.to_path_buf(), font.clone());
        }
        font
    }
}

fn file_name_of(path: &str) -> Option<&str> {
    path.rsplit(['/', '\\']).next().filter(|name| !name.is_empty())
}

fn load_font_file(path: &Path) -> Option<Arc<FontVec>> {
    let data = std::fs::read(path).ok()?;
    // Collections (.ttc) are read from their first face
    match FontVec::try_from_vec_and_index(data, 0) {
        Ok(font) => Some(Arc::new(font)),
        Err(e) => {
            debug!("Skipping unreadable font {}: {}", path.display(), e);
            None
        }
    }
}

/// Whether `font` has a glyph for every visible character of `text`
pub fn covers<F: Font>(font: &F, text: &str) -> bool {
    text.chars()
        .filter(|c| !c.is_whitespace() && !is_combining_mark(*c))
        .all(|c| font.glyph_id(c).0 != 0)
}

/// Combining marks are often composed into a precomposed glyph elsewhere, so
/// they are not required for coverage.
fn is_combining_mark(c: char) -> bool {
    matches!(c as u32, 0x0300..=0x036F | 0x1AB0..=0x1AFF | 0x20D0..=0x20FF | 0xFE20..=0xFE2F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_only_resolver() {
        let resolver = FontResolver::builtin_only();
        assert!(resolver.candidates(ScriptCategory::Latin).is_empty());
        assert!(matches!(resolver.resolve(ScriptCategory::Cjk, "トヨタ"), ResolvedFont::Builtin));
    }

    #[test]
    fn test_overrides_come_first() {
        let overrides = DefaultLogoConfig {
            korean: vec![PathBuf::from("/opt/fonts/Custom-Korean.ttf")],
            ..Default::default()
        };
        let resolver = FontResolver::new(&overrides);
        let candidates = resolver.candidates(ScriptCategory::Korean);
        assert_eq!(candidates[0], PathBuf::from("/opt/fonts/Custom-Korean.ttf"));
        assert!(candidates.len() > 1);
    }

    #[test]
    fn test_candidates_are_unique() {
        let resolver = FontResolver::new(&DefaultLogoConfig::default());
        let candidates = resolver.candidates(ScriptCategory::Latin);
        let unique: HashSet<_> = candidates.iter().collect();
        assert_eq!(unique.len(), candidates.len());
    }

    #[test]
    fn test_unreadable_font_falls_back() {
        let dir = tempfile::TempDir::new().unwrap();
        let bogus = dir.path().join("Bogus.ttf");
        std::fs::write(&bogus, b"not a font").unwrap();

        let resolver = FontResolver {
            overrides: DefaultLogoConfig {
                latin: vec![bogus.clone()],
                ..Default::default()
            },
            use_platform_fonts: false,
            loaded: Mutex::new(HashMap::new()),
            warned: Mutex::new(HashSet::new()),
        };

        assert!(matches!(resolver.resolve(ScriptCategory::Latin, "AB"), ResolvedFont::Builtin));
        // The failed load is remembered
        assert!(resolver.loaded.lock().unwrap().get(&bogus).unwrap().is_none());
    }

    #[test]
    fn test_file_name_of() {
        assert_eq!(file_name_of("/usr/share/fonts/a/Font.ttf"), Some("Font.ttf"));
        assert_eq!(file_name_of("C:\\Windows\\Fonts\\arialbd.ttf"), Some("arialbd.ttf"));
    }
}
