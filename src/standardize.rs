//! Image standardization
//!
//! Every logo leaves the pipeline as a square PNG of the configured size. Source
//! images are scaled uniformly to fit (up or down, Lanczos3) and centered;
//! the padding is transparent for images with alpha and white otherwise.

use image::{imageops, imageops::FilterType, DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use thiserror::Error;

/// Background used when the source has no alpha channel
const OPAQUE_BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);
const TRANSPARENT_BACKGROUND: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// How the minimum source size is applied to width and height
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MinSizePolicy {
    /// At least one dimension reaches the threshold
    #[default]
    Any,
    /// Both dimensions reach the threshold
    Both,
}

impl MinSizePolicy {
    pub fn accepts(self, width: u32, height: u32, min: u32) -> bool {
        match self {
            MinSizePolicy::Any => width >= min || height >= min,
            MinSizePolicy::Both => width >= min && height >= min,
        }
    }
}

impl FromStr for MinSizePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "any" => Ok(MinSizePolicy::Any),
            "both" => Ok(MinSizePolicy::Both),
            other => Err(format!("unknown min size policy '{}' (expected 'any' or 'both')", other)),
        }
    }
}

impl fmt::Display for MinSizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MinSizePolicy::Any => write!(f, "any"),
            MinSizePolicy::Both => write!(f, "both"),
        }
    }
}

#[derive(Debug, Error)]
pub enum StandardizeError {
    #[error("image could not be decoded: {0}")]
    Decode(String),

    #[error("image is {width}x{height}, below the minimum of {min}px ({policy} policy)")]
    TooSmall {
        width: u32,
        height: u32,
        min: u32,
        policy: MinSizePolicy,
    },

    #[error("PNG encoding failed: {0}")]
    Encode(String),
}

/// Where the scaled source sits on the square canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone)]
pub struct StandardizedImage {
    pub png: Vec<u8>,
    pub size: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub content: ContentRect,
}

#[derive(Debug, Clone, Copy)]
pub struct ImageStandardizer {
    target_size: u32,
    min_source_size: u32,
    policy: MinSizePolicy,
}

impl ImageStandardizer {
    pub fn new(target_size: u32, min_source_size: u32, policy: MinSizePolicy) -> Self {
        Self {
            target_size: target_size.max(1),
            min_source_size,
            policy,
        }
    }

    /// Decode, validate, fit, center, and re-encode `bytes`
    pub fn standardize(&self, bytes: &[u8]) -> Result<StandardizedImage, StandardizeError> {
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| StandardizeError::Decode(e.to_string()))?;

        let (width, height) = (decoded.width(), decoded.height());
        if width == 0 || height == 0 || !self.policy.accepts(width, height, self.min_source_size) {
            return Err(StandardizeError::TooSmall {
                width,
                height,
                min: self.min_source_size,
                policy: self.policy,
            });
        }

        let (canvas, content) = self.place_on_canvas(&decoded);
        let png = encode_png(canvas)?;

        Ok(StandardizedImage {
            png,
            size: self.target_size,
            source_width: width,
            source_height: height,
            content,
        })
    }

    fn place_on_canvas(&self, decoded: &DynamicImage) -> (RgbaImage, ContentRect) {
        let size = self.target_size;
        let (scaled_w, scaled_h) = fit_within(decoded.width(), decoded.height(), size);
        let scaled = imageops::resize(&decoded.to_rgba8(), scaled_w, scaled_h, FilterType::Lanczos3);

        let background = if decoded.color().has_alpha() {
            TRANSPARENT_BACKGROUND
        } else {
            OPAQUE_BACKGROUND
        };
        let mut canvas = RgbaImage::from_pixel(size, size, background);

        let x = (size - scaled_w) / 2;
        let y = (size - scaled_h) / 2;
        imageops::replace(&mut canvas, &scaled, i64::from(x), i64::from(y));

        (
            canvas,
            ContentRect {
                x,
                y,
                width: scaled_w,
                height: scaled_h,
            },
        )
    }
}

/// Scale `width`x`height` uniformly so the longer edge equals `target`
pub fn fit_within(width: u32, height: u32, target: u32) -> (u32, u32) {
    let target = target.max(1);
    if width == 0 || height == 0 {
        return (target, target);
    }
    if width >= height {
        let scaled =
            (u64::from(height) * u64::from(target) + u64::from(width) / 2) / u64::from(width);
        (target, (scaled as u32).clamp(1, target))
    } else {
        let scaled =
            (u64::from(width) * u64::from(target) + u64::from(height) / 2) / u64::from(height);
        ((scaled as u32).clamp(1, target), target)
    }
}

/// Encode an RGBA buffer as PNG bytes
pub fn encode_png(canvas: RgbaImage) -> Result<Vec<u8>, StandardizeError> {
    let mut png = Vec::new();
    DynamicImage::ImageRgba8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| StandardizeError::Encode(e.to_string()))?;
    Ok(png)
}
