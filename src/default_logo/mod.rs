//! Synthesized text logos, the last step of the fallback chain.
//!
//! A default logo is the company's initials drawn in white on a square of one
//! of ten palette colours. The script of the company name picks which fonts
//! are tried; if none is usable the built-in bitmap font is drawn instead, so
//! generation cannot fail.

pub mod builtin_font;
pub mod fonts;
pub mod initials;
pub mod render;
pub mod script;

pub use fonts::{FontResolver, ResolvedFont};
pub use initials::extract_initials;
pub use script::{detect_script, ScriptCategory};

use image::RgbaImage;
use std::sync::Arc;
use tracing::debug;

/// A rendered default logo and how it was made
#[derive(Debug, Clone)]
pub struct GeneratedLogo {
    pub image: RgbaImage,
    pub initials: String,
    pub category: ScriptCategory,
    /// Font file path, or `builtin`
    pub font: String,
}

#[derive(Clone)]
pub struct DefaultLogoGenerator {
    size: u32,
    fonts: Arc<FontResolver>,
}

impl DefaultLogoGenerator {
    pub fn new(size: u32, fonts: Arc<FontResolver>) -> Self {
        Self {
            size: size.max(1),
            fonts,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn generate(&self, company_id: &str, name: &str) -> GeneratedLogo {
        let initials = extract_initials(name);
        let category = detect_script(name);

        // No shaping is applied; reversing keeps right-to-left initials in reading order
        let display: String = if category.is_right_to_left() {
            initials.chars().rev().collect()
        } else {
            initials.clone()
        };

        let mut canvas = RgbaImage::from_pixel(self.size, self.size, render::background_color(company_id));

        let mut resolved = self.fonts.resolve(category, &display);
        if matches!(resolved, ResolvedFont::Builtin) {
            // Initials can come from a minority script in mixed names
            let initials_category = detect_script(&display);
            if initials_category != category {
                resolved = self.fonts.resolve(initials_category, &display);
            }
        }

        let font = match &resolved {
            ResolvedFont::Outline { font, .. } if render::render_outline(&mut canvas, font, &display) => {
                resolved.label()
            }
            _ => {
                if !display.chars().all(builtin_font::has_glyph) {
                    let text = &display;
                    debug!("Built-in font lacks glyphs for '{}', drawing placeholders", text);
                }
                render::render_builtin(&mut canvas, &display);
                ResolvedFont::Builtin.label()
            }
        };

        debug!(
            "Generated default logo for {} ('{}', {} script, font {})",
            company_id, initials, category, font
        );

        GeneratedLogo {
            image: canvas,
            initials,
            category,
            font,
        }
    }
}
