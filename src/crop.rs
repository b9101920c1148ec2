//! Chunk images: cropped regions and full-page annotations.
//!
//! Both operations follow the same shape:
//!
//! ```text
//! exists(output)? ──yes──▶ Existing
//!      │ no
//! renderer bound? ──no───▶ Unsupported
//!      │ yes
//! get(source) ─▶ render page ─▶ map box ─▶ draw ─▶ put(PNG) ─▶ Written
//! ```
//!
//! A missing renderer is a capability gap, not a failure: documents still
//! get their markdown and grounding, just no pictures.

use crate::error::IngestError;
use crate::geometry::{chunk_type_color, map_box_to_pixels, CropRegion, NormalizedBox};
use crate::pipeline::canvas::{draw_outline, encode_png, fill_overlay};
use crate::pipeline::render::{PageRenderer, RenderedPage};
use crate::store::{content_type, ObjectStore};
use image::{DynamicImage, Rgb};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

const HIGHLIGHT_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Rendering and drawing knobs.
#[derive(Debug, Clone, PartialEq)]
pub struct CropOptions {
    /// Render resolution. Default: 150.
    pub dpi: u32,
    /// Pixels added around each crop. Default: 10.
    pub padding: u32,
    /// Outline the chunk inside its crop. Default: true.
    pub highlight: bool,
    /// Outline thickness in pixels. Default: 3.
    pub outline_width: u32,
    /// Opacity of the annotation fill, 0–255. Default: 30.
    pub overlay_alpha: u8,
}

impl Default for CropOptions {
    fn default() -> Self {
        Self {
            dpi: 150,
            padding: 10,
            highlight: true,
            outline_width: 3,
            overlay_alpha: 30,
        }
    }
}

/// Crop one chunk out of its page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkImageRequest {
    pub source_key: String,
    pub output_key: String,
    /// 0-based page index.
    pub page: u32,
    /// `[left, top, right, bottom]`, normalized. `None` stores the full page.
    pub bbox: Option<Vec<f64>>,
    /// Re-render even when `output_key` exists.
    pub force: bool,
}

/// Draw one chunk onto its full page.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationRequest {
    pub source_key: String,
    pub output_key: String,
    /// 0-based page index.
    pub page: u32,
    pub bbox: NormalizedBox,
    pub chunk_type: String,
    pub force: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CropOutcome {
    /// A new image was stored at `key`.
    Written { key: String },
    /// `key` was already present; nothing rendered.
    Existing { key: String },
    /// No page renderer is available.
    Unsupported,
}

impl CropOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            CropOutcome::Written { key } | CropOutcome::Existing { key } => Some(key),
            CropOutcome::Unsupported => None,
        }
    }
}

pub struct ImageCropper {
    store: Arc<dyn ObjectStore>,
    renderer: Option<Arc<dyn PageRenderer>>,
    options: CropOptions,
}

impl ImageCropper {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        renderer: Option<Arc<dyn PageRenderer>>,
        options: CropOptions,
    ) -> Self {
        Self {
            store,
            renderer,
            options,
        }
    }

    pub fn has_renderer(&self) -> bool {
        self.renderer.is_some()
    }

    pub fn options(&self) -> &CropOptions {
        &self.options
    }

    /// Fetch the source document and store a crop of one chunk.
    pub async fn extract_chunk_image(
        &self,
        req: &ChunkImageRequest,
    ) -> Result<CropOutcome, IngestError> {
        if let Some(existing) = self.existing(&req.output_key, req.force).await? {
            return Ok(existing);
        }
        let Some(renderer) = &self.renderer else {
            return Ok(CropOutcome::Unsupported);
        };
        let bytes = self.store.get(&req.source_key).await?;
        let page = renderer.render(&bytes, req.page, self.options.dpi).await?;
        self.write_crop(&page, req).await
    }

    /// Like [`Self::extract_chunk_image`] for callers that already hold the
    /// document bytes. Each page is rendered at most once per call.
    pub async fn crop_from_bytes(
        &self,
        bytes: &[u8],
        requests: &[ChunkImageRequest],
    ) -> Vec<Result<CropOutcome, IngestError>> {
        let mut pages: HashMap<u32, RenderedPage> = HashMap::new();
        let mut results = Vec::with_capacity(requests.len());

        for req in requests {
            results.push(self.crop_cached(bytes, req, &mut pages).await);
        }
        results
    }

    async fn crop_cached(
        &self,
        bytes: &[u8],
        req: &ChunkImageRequest,
        pages: &mut HashMap<u32, RenderedPage>,
    ) -> Result<CropOutcome, IngestError> {
        if let Some(existing) = self.existing(&req.output_key, req.force).await? {
            return Ok(existing);
        }
        let Some(renderer) = &self.renderer else {
            return Ok(CropOutcome::Unsupported);
        };
        if !pages.contains_key(&req.page) {
            let rendered = renderer.render(bytes, req.page, self.options.dpi).await?;
            pages.insert(req.page, rendered);
        }
        match pages.get(&req.page) {
            Some(page) => self.write_crop(page, req).await,
            None => Err(IngestError::Internal("page missing from cache".into())),
        }
    }

    /// Render the chunk's page with its box outlined and tinted.
    pub async fn annotate_chunk(
        &self,
        req: &AnnotationRequest,
    ) -> Result<CropOutcome, IngestError> {
        if let Some(existing) = self.existing(&req.output_key, req.force).await? {
            return Ok(existing);
        }
        let Some(renderer) = &self.renderer else {
            return Ok(CropOutcome::Unsupported);
        };
        let bytes = self.store.get(&req.source_key).await?;
        let page = renderer.render(&bytes, req.page, self.options.dpi).await?;

        let bbox = NormalizedBox::clamped(
            req.bbox.left,
            req.bbox.top,
            req.bbox.right,
            req.bbox.bottom,
        );
        let mut canvas = page.image.to_rgba8();
        if let Some(area) = bbox.to_pixels(&page.dimensions(), 0) {
            let color = chunk_type_color(&req.chunk_type);
            draw_outline(&mut canvas, area, color, self.options.outline_width);
            fill_overlay(&mut canvas, area, color, self.options.overlay_alpha);
        }

        let png = encode_png(&DynamicImage::ImageRgba8(canvas))?;
        self.store
            .put(&req.output_key, png, content_type::PNG)
            .await?;
        info!("Annotated page {} → {}", req.page, req.output_key);
        Ok(CropOutcome::Written {
            key: req.output_key.clone(),
        })
    }

    async fn existing(&self, key: &str, force: bool) -> Result<Option<CropOutcome>, IngestError> {
        if !force && self.store.exists(key).await? {
            debug!("Image already present: {}", key);
            return Ok(Some(CropOutcome::Existing {
                key: key.to_string(),
            }));
        }
        Ok(None)
    }

    async fn write_crop(
        &self,
        page: &RenderedPage,
        req: &ChunkImageRequest,
    ) -> Result<CropOutcome, IngestError> {
        let image = crop_page(page, req.bbox.as_deref(), &self.options);
        let png = encode_png(&image)?;
        self.store
            .put(&req.output_key, png, content_type::PNG)
            .await?;
        debug!("Stored chunk image {}", req.output_key);
        Ok(CropOutcome::Written {
            key: req.output_key.clone(),
        })
    }
}

/// Cut the chunk out of a rendered page.
///
/// Falls back to the whole page when the box is unusable or maps to an
/// empty region.
pub fn crop_page(page: &RenderedPage, bbox: Option<&[f64]>, options: &CropOptions) -> DynamicImage {
    let dims = page.dimensions();
    let region = match map_box_to_pixels(bbox, &dims, options.padding) {
        CropRegion::Region(r) if !r.is_empty() => r,
        _ => return page.image.clone(),
    };

    let cropped = page
        .image
        .crop_imm(region.x0, region.y0, region.width(), region.height());
    if !options.highlight {
        return cropped;
    }

    let mut canvas = cropped.to_rgba8();
    if let CropRegion::Region(inner) = map_box_to_pixels(bbox, &dims, 0) {
        draw_outline(
            &mut canvas,
            inner.relative_to(&region),
            HIGHLIGHT_COLOR,
            options.outline_width,
        );
    }
    DynamicImage::ImageRgba8(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn page() -> RenderedPage {
        // 100x200 points rendered at 2 px/pt.
        RenderedPage {
            image: DynamicImage::ImageRgba8(RgbaImage::from_pixel(
                200,
                400,
                Rgba([255, 255, 255, 255]),
            )),
            width_points: 100.0,
            height_points: 200.0,
        }
    }

    #[test]
    fn crop_includes_padding() {
        let opts = CropOptions {
            highlight: false,
            ..CropOptions::default()
        };
        let img = crop_page(&page(), Some(&[0.25, 0.25, 0.75, 0.5]), &opts);
        // x: 50..150 ± 10, y: 100..200 ± 10
        assert_eq!((img.width(), img.height()), (120, 120));
    }

    #[test]
    fn highlight_outlines_unpadded_box() {
        let opts = CropOptions::default();
        let img = crop_page(&page(), Some(&[0.25, 0.25, 0.75, 0.5]), &opts);
        let img = img.to_rgba8();
        // Padding area stays white, the box edge starts at (10, 10).
        assert_eq!(img.get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
        assert_eq!(img.get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(img.get_pixel(60, 60), &Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn malformed_box_returns_full_page() {
        let opts = CropOptions::default();
        let short: &[f64] = &[0.1, 0.2];
        let out_of_range: &[f64] = &[0.1, 0.2, 2.0, 0.5];
        for bbox in [None, Some(short), Some(out_of_range)] {
            let img = crop_page(&page(), bbox, &opts);
            assert_eq!((img.width(), img.height()), (200, 400));
        }
    }

    #[test]
    fn degenerate_box_returns_full_page() {
        let opts = CropOptions {
            padding: 0,
            ..CropOptions::default()
        };
        let img = crop_page(&page(), Some(&[0.5, 0.5, 0.5, 0.5]), &opts);
        assert_eq!((img.width(), img.height()), (200, 400));
    }

    #[test]
    fn outcome_key() {
        assert_eq!(CropOutcome::Written { key: "k".into() }.key(), Some("k"));
        assert_eq!(CropOutcome::Unsupported.key(), None);
    }
}
