//! Page rasterisation for crops and annotations.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and is not safe to call
//! from async contexts. Every render runs on the blocking pool so Tokio
//! worker threads never stall on CPU-heavy rasterisation.
//!
//! ## Why is the renderer optional?
//!
//! pdfium ships as a shared library that may simply not be installed where
//! the pipeline runs. [`PdfiumRenderer::bind`] probes for it once and returns
//! `None` when it cannot be loaded; the cropper then reports
//! `Unsupported` instead of failing documents whose markdown already landed.

use crate::error::IngestError;
use crate::geometry::PageDimensions;
use async_trait::async_trait;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Points per inch in PDF user space.
const POINTS_PER_INCH: f32 = 72.0;

/// One rendered page plus the physical size it was rendered from.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub image: DynamicImage,
    pub width_points: f64,
    pub height_points: f64,
}

impl RenderedPage {
    pub fn dimensions(&self) -> PageDimensions {
        PageDimensions {
            width_points: self.width_points,
            height_points: self.height_points,
            image_width: self.image.width(),
            image_height: self.image.height(),
        }
    }
}

/// Rasterises one page of a document.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Render 0-based `page_index` of `bytes` at `dpi`.
    async fn render(
        &self,
        bytes: &[u8],
        page_index: u32,
        dpi: u32,
    ) -> Result<RenderedPage, IngestError>;
}

/// pdfium-backed renderer.
#[derive(Debug, Clone)]
pub struct PdfiumRenderer {
    library: Option<PathBuf>,
}

impl PdfiumRenderer {
    /// Probe for pdfium: at `lib_path` (the library file or the directory
    /// holding it) when given, otherwise the system library search path.
    ///
    /// Returns `None` when the library cannot be loaded.
    pub fn bind(lib_path: Option<&Path>) -> Option<Self> {
        let renderer = Self {
            library: lib_path.map(library_file),
        };
        match renderer.pdfium() {
            Ok(_) => {
                info!(
                    "pdfium bound ({})",
                    renderer
                        .library
                        .as_ref()
                        .map(|p| p.display().to_string())
                        .unwrap_or_else(|| "system library".into())
                );
                Some(renderer)
            }
            Err(e) => {
                warn!("pdfium unavailable, page images disabled: {}", e);
                None
            }
        }
    }

    fn pdfium(&self) -> Result<Pdfium, PdfiumError> {
        let bindings = match &self.library {
            Some(path) => Pdfium::bind_to_library(path)?,
            None => Pdfium::bind_to_system_library()?,
        };
        Ok(Pdfium::new(bindings))
    }
}

fn library_file(path: &Path) -> PathBuf {
    if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    }
}

#[async_trait]
impl PageRenderer for PdfiumRenderer {
    async fn render(
        &self,
        bytes: &[u8],
        page_index: u32,
        dpi: u32,
    ) -> Result<RenderedPage, IngestError> {
        let renderer = self.clone();
        let bytes = bytes.to_vec();

        tokio::task::spawn_blocking(move || renderer.render_blocking(&bytes, page_index, dpi))
            .await
            .map_err(|e| IngestError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRenderer {
    fn render_blocking(
        &self,
        bytes: &[u8],
        page_index: u32,
        dpi: u32,
    ) -> Result<RenderedPage, IngestError> {
        let render_err = |detail: String| IngestError::Render {
            page: page_index as usize,
            detail,
        };

        let pdfium = self.pdfium().map_err(|e| render_err(format!("{:?}", e)))?;
        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let pages = document.pages();
        let total_pages = pages.len() as u32;
        if page_index >= total_pages {
            return Err(render_err(format!(
                "page index out of range (document has {} pages)",
                total_pages
            )));
        }

        let page = pages
            .get(page_index as u16)
            .map_err(|e| render_err(format!("{:?}", e)))?;
        let width_points = page.width().value as f64;
        let height_points = page.height().value as f64;

        let scale = dpi as f32 / POINTS_PER_INCH;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(scale);
        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| render_err(format!("{:?}", e)))?;

        let image = bitmap.as_image();
        debug!(
            "Rendered page {} at {} DPI → {}x{} px",
            page_index,
            dpi,
            image.width(),
            image.height()
        );

        Ok(RenderedPage {
            image,
            width_points,
            height_points,
        })
    }
}
