//! Page rasterisation: decode a PDF and render page 1 to an `RgbaImage`.
//!
//! The renderer only depends on the [`PageRasterizer`] trait; the pdfium
//! implementation lives here. pdfium calls are blocking and CPU-bound, so
//! the renderer always invokes a rasterizer from
//! `tokio::task::spawn_blocking`, never from an async worker thread.

use crate::error::PreviewError;
use image::imageops::FilterType;
use image::RgbaImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Turns the first page of an in-memory PDF into a bitmap.
pub trait PageRasterizer: Send + Sync {
    /// Render page 1 of `pdf` at `scale` times its native size in points.
    ///
    /// Implementations return an image of exactly
    /// [`viewport_size`]`(width_pts, height_pts, scale)` pixels.
    fn rasterize_first_page(&self, pdf: &[u8], scale: f32) -> Result<RgbaImage, PreviewError>;
}

/// Pixel size of a page of `width_pts` x `height_pts` points at `scale`.
///
/// Each edge is rounded to the nearest pixel and is at least 1.
pub fn viewport_size(width_pts: f32, height_pts: f32, scale: f32) -> (u32, u32) {
    let edge = |pts: f32| (pts * scale).round().max(1.0) as u32;
    (edge(width_pts), edge(height_pts))
}

/// [`PageRasterizer`] backed by the pdfium shared library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumRasterizer {
    library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    /// `library_path` is the pdfium library file, or a directory holding
    /// it. With `None`, the working directory and then the system library
    /// search path are tried.
    pub fn new(library_path: Option<PathBuf>) -> Self {
        Self { library_path }
    }
}

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize_first_page(&self, pdf: &[u8], scale: f32) -> Result<RgbaImage, PreviewError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;

        let document = pdfium
            .load_pdf_from_byte_slice(pdf, None)
            .map_err(|e| PreviewError::Decode(format!("{:?}", e)))?;

        let pages = document.pages();
        if pages.len() == 0 {
            return Err(PreviewError::NoPages);
        }
        let page = pages
            .get(0)
            .map_err(|e| PreviewError::Rasterise(format!("{:?}", e)))?;

        let (width, height) = viewport_size(page.width().value, page.height().value, scale);
        let render_config = PdfRenderConfig::new().set_target_size(width as i32, height as i32);

        let bitmap = page
            .render_with_config(&render_config)
            .map_err(|e| PreviewError::Rasterise(format!("{:?}", e)))?;

        let mut image = bitmap.as_image().into_rgba8();
        if image.dimensions() != (width, height) {
            debug!(
                "pdfium rendered {}x{} px, resizing to {}x{}",
                image.width(),
                image.height(),
                width,
                height
            );
            image = image::imageops::resize(&image, width, height, FilterType::Triangle);
        }
        debug!("Rendered page 1 → {}x{} px", width, height);
        Ok(image)
    }
}

/// Bind the pdfium library from an explicit path, or from the working
/// directory and then the system search path.
pub fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, PreviewError> {
    let bindings = match library_path {
        Some(path) if path.is_dir() => {
            Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(path))
        }
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    };
    bindings
        .map(Pdfium::new)
        .map_err(|e| PreviewError::LibraryUnavailable(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_scales_letter_page() {
        // US letter: 612 x 792 pt
        assert_eq!(viewport_size(612.0, 792.0, 1.5), (918, 1188));
    }

    #[test]
    fn viewport_rounds_to_nearest_pixel() {
        assert_eq!(viewport_size(595.0, 842.0, 1.5), (893, 1263));
        assert_eq!(viewport_size(100.2, 100.4, 1.0), (100, 100));
    }

    #[test]
    fn viewport_never_collapses_to_zero() {
        assert_eq!(viewport_size(0.1, 0.0, 1.5), (1, 1));
    }

    #[test]
    fn missing_library_is_reported_as_unavailable() {
        let bound = bind_pdfium(Some(Path::new("/definitely/not/libpdfium.so")));
        assert!(matches!(bound, Err(PreviewError::LibraryUnavailable(_))));
    }
}
