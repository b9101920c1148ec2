//! Drawing and encoding primitives for chunk images.
//!
//! PNG is used for every stored image: crops carry text, and JPEG artefacts
//! around glyph edges hurt anything that later reads them back.

use crate::error::IngestError;
use crate::geometry::PixelBox;
use image::{DynamicImage, Rgb, Rgba, RgbaImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use std::io::Cursor;
use tracing::debug;

/// Encode an image as PNG bytes.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, IngestError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Draw a `thickness`-pixel outline just inside `area`.
///
/// Areas partly outside the image are clipped; empty areas draw nothing.
pub fn draw_outline(img: &mut RgbaImage, area: PixelBox, color: Rgb<u8>, thickness: u32) {
    let area = clip(area, img.width(), img.height());
    let pixel = Rgba([color[0], color[1], color[2], 255]);

    for inset in 0..thickness {
        let w = area.width().saturating_sub(2 * inset);
        let h = area.height().saturating_sub(2 * inset);
        if w == 0 || h == 0 {
            break;
        }
        let (x, y) = ((area.x0 + inset) as i32, (area.y0 + inset) as i32);
        let rect = Rect::at(x, y).of_size(w, h);
        draw_hollow_rect_mut(img, rect, pixel);
    }
}

/// Blend `color` over `area` with the given opacity (0 = invisible,
/// 255 = solid).
pub fn fill_overlay(img: &mut RgbaImage, area: PixelBox, color: Rgb<u8>, alpha: u8) {
    let area = clip(area, img.width(), img.height());
    let a = alpha as u32;
    for y in area.y0..area.y1 {
        for x in area.x0..area.x1 {
            let px = img.get_pixel_mut(x, y);
            for c in 0..3 {
                let blended = (color[c] as u32 * a + px[c] as u32 * (255 - a)) / 255;
                px[c] = blended as u8;
            }
        }
    }
}

fn clip(area: PixelBox, width: u32, height: u32) -> PixelBox {
    PixelBox {
        x0: area.x0.min(width),
        y0: area.y0.min(height),
        x1: area.x1.min(width),
        y1: area.y1.min(height),
    }
}
