use ab_glyph::{point, Font, FontVec, Glyph, GlyphId, PxScale, Rect, ScaleFont};
use image::{Rgba, RgbaImage};
use sha2::{Digest, Sha256};

use super::builtin_font::{self, GLYPH_HEIGHT, GLYPH_SPACING, GLYPH_WIDTH};

/// Background colours; the company identifier picks one deterministically
pub const PALETTE: [[u8; 3]; 10] = [
    [52, 152, 219],
    [46, 204, 113],
    [155, 89, 182],
    [52, 73, 94],
    [41, 128, 185],
    [39, 174, 96],
    [142, 68, 173],
    [41, 58, 74],
    [44, 62, 80],
    [19, 106, 138],
];

pub const TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

/// Share of the canvas the initials may occupy
const MAX_TEXT_WIDTH: f32 = 0.8;
const MAX_TEXT_HEIGHT: f32 = 0.6;

pub fn background_color(company_id: &str) -> Rgba<u8> {
    let digest = Sha256::digest(company_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    let index = (u64::from_be_bytes(prefix) % PALETTE.len() as u64) as usize;
    let [r, g, b] = PALETTE[index];
    Rgba([r, g, b, 255])
}

fn layout_line(font: &FontVec, text: &str, scale: PxScale) -> Vec<Glyph> {
    let scaled = font.as_scaled(scale);
    let mut caret = 0.0f32;
    let mut previous: Option<GlyphId> = None;
    let mut glyphs = Vec::new();

    for c in text.chars().filter(|c| !c.is_control()) {
        let id = scaled.glyph_id(c);
        if let Some(prev) = previous {
            caret += scaled.kern(prev, id);
        }
        glyphs.push(id.with_scale_and_position(scale, point(caret, 0.0)));
        caret += scaled.h_advance(id);
        previous = Some(id);
    }
    glyphs
}

/// Union of the pixel bounds of every outlined glyph
fn ink_bounds(font: &FontVec, glyphs: &[Glyph]) -> Option<Rect> {
    glyphs
        .iter()
        .filter_map(|g| font.outline_glyph(g.clone()))
        .map(|outlined| outlined.px_bounds())
        .reduce(|a, b| Rect {
            min: point(a.min.x.min(b.min.x), a.min.y.min(b.min.y)),
            max: point(a.max.x.max(b.max.x), a.max.y.max(b.max.y)),
        })
}

/// Draw `text` with an outline font, sized to fit and centred on its ink.
///
/// Centring uses the measured glyph bounds rather than ascent/descent metrics,
/// which differ widely between Latin, CJK, and Arabic fonts. Returns false if
/// the text produced no ink, leaving the canvas untouched.
pub fn render_outline(canvas: &mut RgbaImage, font: &FontVec, text: &str) -> bool {
    let size = canvas.width() as f32;

    let reference = PxScale::from(size);
    let Some(measured) = ink_bounds(font, &layout_line(font, text, reference)) else {
        return false;
    };
    if measured.width() <= 0.0 || measured.height() <= 0.0 {
        return false;
    }

    let factor = (size * MAX_TEXT_WIDTH / measured.width()).min(size * MAX_TEXT_HEIGHT / measured.height());
    let scale = PxScale::from(size * factor);
    let glyphs = layout_line(font, text, scale);
    let Some(bounds) = ink_bounds(font, &glyphs) else {
        return false;
    };

    let dx = (size - bounds.width()) / 2.0 - bounds.min.x;
    let dy = (size - bounds.height()) / 2.0 - bounds.min.y;

    for glyph in glyphs {
        let Some(outlined) = font.outline_glyph(glyph) else {
            continue;
        };
        let glyph_bounds = outlined.px_bounds();
        let left = (glyph_bounds.min.x + dx).round() as i64;
        let top = (glyph_bounds.min.y + dy).round() as i64;
        outlined.draw(|x, y, coverage| {
            blend(canvas, left + i64::from(x), top + i64::from(y), coverage);
        });
    }
    true
}

/// Draw `text` with the built-in bitmap font at the largest whole-pixel scale that fits
pub fn render_builtin(canvas: &mut RgbaImage, text: &str) {
    let size = canvas.width();
    let text_width = builtin_font::text_width(text);
    if text_width == 0 {
        return;
    }
    let (top_row, bottom_row) = builtin_font::ink_rows(text).unwrap_or((0, GLYPH_HEIGHT - 1));
    let ink_height = bottom_row - top_row + 1;

    let max_w = size as f32 * MAX_TEXT_WIDTH;
    let max_h = size as f32 * MAX_TEXT_HEIGHT;
    let cell = (max_w / text_width as f32)
        .min(max_h / ink_height as f32)
        .floor()
        .max(1.0) as i64;

    let origin_x = (i64::from(size) - i64::from(text_width) * cell) / 2;
    let origin_y = (i64::from(size) - i64::from(ink_height) * cell) / 2 - i64::from(top_row) * cell;

    for (i, c) in text.chars().enumerate() {
        let glyph_x = origin_x + i as i64 * i64::from(GLYPH_WIDTH + GLYPH_SPACING) * cell;
        for row in 0..GLYPH_HEIGHT {
            for col in 0..GLYPH_WIDTH {
                if !builtin_font::is_set(c, col, row) {
                    continue;
                }
                let x0 = glyph_x + i64::from(col) * cell;
                let y0 = origin_y + i64::from(row) * cell;
                for y in y0..y0 + cell {
                    for x in x0..x0 + cell {
                        blend(canvas, x, y, 1.0);
                    }
                }
            }
        }
    }
}

fn blend(canvas: &mut RgbaImage, x: i64, y: i64, coverage: f32) {
    if x < 0 || y < 0 || x >= i64::from(canvas.width()) || y >= i64::from(canvas.height()) {
        return;
    }
    let coverage = coverage.clamp(0.0, 1.0);
    let pixel = canvas.get_pixel_mut(x as u32, y as u32);
    for channel in 0..3 {
        let bg = f32::from(pixel[channel]);
        let fg = f32::from(TEXT_COLOR[channel]);
        pixel[channel] = (bg + (fg - bg) * coverage).round() as u8;
    }
    pixel[3] = 255;
}
