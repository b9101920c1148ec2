//! Bounding-box geometry: normalized page fractions → rendered pixels.
//!
//! The parser reports every chunk location as fractions (0–1) of the page
//! width and height, independent of any resolution. To crop or annotate a
//! rendered page we go normalized → PDF points (× page size) → pixels
//! (× image/page scale), pad, and clamp to the image.
//!
//! A box that cannot be trusted (wrong arity, NaN, outside the unit square)
//! never produces an error here; it maps to [`CropRegion::FullPage`] and the
//! caller stores the whole page instead.

use image::Rgb;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Slack allowed on [0, 1] before a component counts as out of range.
/// Parser output occasionally carries values like `1.0000001`.
const RANGE_TOLERANCE: f64 = 1e-6;

/// A chunk location as fractions of the page.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

/// Why a raw component list was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedBox {
    #[error("expected 4 box components, got {0}")]
    WrongArity(usize),
    #[error("box component is not a finite number")]
    NonFinite,
    #[error("box component {0} is outside [0, 1]")]
    OutOfRange(f64),
}

impl NormalizedBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Validate `[left, top, right, bottom]`.
    ///
    /// Values within [`RANGE_TOLERANCE`] of the unit interval are clamped in.
    pub fn from_components(components: &[f64]) -> Result<Self, MalformedBox> {
        let [left, top, right, bottom] = components else {
            return Err(MalformedBox::WrongArity(components.len()));
        };
        let mut out = [0.0; 4];
        for (slot, &v) in out.iter_mut().zip([*left, *top, *right, *bottom].iter()) {
            if !v.is_finite() {
                return Err(MalformedBox::NonFinite);
            }
            if !(-RANGE_TOLERANCE..=1.0 + RANGE_TOLERANCE).contains(&v) {
                return Err(MalformedBox::OutOfRange(v));
            }
            *slot = v.clamp(0.0, 1.0);
        }
        Ok(Self::new(out[0], out[1], out[2], out[3]))
    }

    /// Build a box, forcing every side into [0, 1]. NaN becomes 0.
    pub fn clamped(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        let c = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) };
        Self::new(c(left), c(top), c(right), c(bottom))
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.left, self.top, self.right, self.bottom]
    }

    /// Map onto a rendered page.
    ///
    /// Returns `None` when the page or image dimensions are not positive.
    /// Sides given in the wrong order are swapped, so the result always
    /// satisfies `x0 <= x1` and `y0 <= y1`.
    pub fn to_pixels(&self, page: &PageDimensions, padding: u32) -> Option<PixelBox> {
        if !page.is_valid() {
            return None;
        }
        let scale_x = page.image_width as f64 / page.width_points;
        let scale_y = page.image_height as f64 / page.height_points;
        let to_px = |norm: f64, page_size: f64, scale: f64| (norm * page_size * scale) as i64;

        let (lo_x, hi_x) = ordered(self.left, self.right);
        let (lo_y, hi_y) = ordered(self.top, self.bottom);
        let pad = padding as i64;
        let w = page.image_width as i64;
        let h = page.image_height as i64;

        Some(PixelBox {
            x0: (to_px(lo_x, page.width_points, scale_x) - pad).clamp(0, w) as u32,
            y0: (to_px(lo_y, page.height_points, scale_y) - pad).clamp(0, h) as u32,
            x1: (to_px(hi_x, page.width_points, scale_x) + pad).clamp(0, w) as u32,
            y1: (to_px(hi_y, page.height_points, scale_y) + pad).clamp(0, h) as u32,
        })
    }
}

fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Physical page size and the pixel size it was rendered at.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageDimensions {
    pub width_points: f64,
    pub height_points: f64,
    pub image_width: u32,
    pub image_height: u32,
}

impl PageDimensions {
    fn is_valid(&self) -> bool {
        self.width_points.is_finite()
            && self.height_points.is_finite()
            && self.width_points > 0.0
            && self.height_points > 0.0
            && self.image_width > 0
            && self.image_height > 0
    }
}

/// Integer pixel rectangle, `x0..x1` × `y0..y1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBox {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl PixelBox {
    pub fn width(&self) -> u32 {
        self.x1.saturating_sub(self.x0)
    }

    pub fn height(&self) -> u32 {
        self.y1.saturating_sub(self.y0)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Express this box in the coordinate space of `origin`'s top-left corner.
    pub fn relative_to(&self, origin: &PixelBox) -> PixelBox {
        PixelBox {
            x0: self.x0.saturating_sub(origin.x0),
            y0: self.y0.saturating_sub(origin.y0),
            x1: self.x1.saturating_sub(origin.x0),
            y1: self.y1.saturating_sub(origin.y0),
        }
    }
}

/// What part of a rendered page to keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropRegion {
    /// No usable box: keep the entire page.
    FullPage,
    Region(PixelBox),
}

/// Map raw box components onto a rendered page, with padding.
///
/// `None`, a malformed box, or unusable dimensions all yield
/// [`CropRegion::FullPage`].
pub fn map_box_to_pixels(
    components: Option<&[f64]>,
    page: &PageDimensions,
    padding: u32,
) -> CropRegion {
    let Some(components) = components else {
        return CropRegion::FullPage;
    };
    match NormalizedBox::from_components(components) {
        Ok(bbox) => bbox
            .to_pixels(page, padding)
            .map(CropRegion::Region)
            .unwrap_or(CropRegion::FullPage),
        Err(_) => CropRegion::FullPage,
    }
}

/// Colour used to outline a chunk of the given type.
pub fn chunk_type_color(chunk_type: &str) -> Rgb<u8> {
    let rgb = match chunk_type.to_ascii_lowercase().as_str() {
        "text" => [40, 167, 69],
        "table" => [0, 123, 255],
        "marginalia" => [111, 66, 193],
        "figure" => [255, 0, 255],
        "logo" => [144, 238, 144],
        "card" => [255, 165, 0],
        "attestation" => [0, 255, 255],
        "scancode" => [255, 193, 7],
        "form" => [220, 20, 60],
        "tablecell" => [173, 216, 230],
        _ => [128, 128, 128],
    };
    Rgb(rgb)
}
