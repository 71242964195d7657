//! The stored preview: an unfiltered page-1 raster plus the filter shown
//! over it.

use super::filter::ThemeFilter;
use crate::config::Theme;
use crate::error::DarkPdfError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, RgbaImage};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// A rendered preview of page 1.
///
/// `raster` is never modified after rendering; changing the theme swaps
/// only `filter`, and [`PreviewState::composite`] produces the filtered
/// view on demand.
#[derive(Debug, Clone)]
pub struct PreviewState {
    /// Selection generation this preview was rendered from.
    pub generation: u64,
    pub raster: Arc<RgbaImage>,
    pub theme: Option<Theme>,
    pub filter: ThemeFilter,
}

impl PreviewState {
    pub fn new(generation: u64, raster: RgbaImage, theme: Option<Theme>) -> Self {
        Self {
            generation,
            raster: Arc::new(raster),
            theme,
            filter: ThemeFilter::for_theme(theme),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.raster.dimensions()
    }

    /// Swap the overlay filter. The raster is shared, not re-rendered.
    pub fn set_theme(&mut self, theme: Option<Theme>) {
        self.theme = theme;
        self.filter = ThemeFilter::for_theme(theme);
    }

    /// The raster with the current filter applied.
    pub fn composite(&self) -> RgbaImage {
        self.filter.apply(&self.raster)
    }

    /// Encode the composite as PNG.
    pub fn to_png(&self) -> Result<Vec<u8>, image::ImageError> {
        let img = DynamicImage::ImageRgba8(self.composite());
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
        debug!("Encoded preview → {} bytes PNG", buf.len());
        Ok(buf)
    }

    /// The composite as a `data:image/png;base64,…` URI.
    pub fn to_data_uri(&self) -> Result<String, image::ImageError> {
        Ok(format!("data:image/png;base64,{}", STANDARD.encode(self.to_png()?)))
    }

    /// Write the composite to `path` as a PNG file.
    pub fn save_png(&self, path: &Path) -> Result<(), DarkPdfError> {
        let png = self
            .to_png()
            .map_err(|e| DarkPdfError::Internal(format!("PNG encoding failed: {e}")))?;
        std::fs::write(path, png).map_err(|e| DarkPdfError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn white(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]))
    }

    #[test]
    fn set_theme_keeps_the_same_raster() {
        let mut state = PreviewState::new(1, white(8, 8), Some(Theme::PureBlack));
        let raster = Arc::clone(&state.raster);
        state.set_theme(Some(Theme::Sepia));
        assert!(Arc::ptr_eq(&raster, &state.raster));
        assert_eq!(state.filter, ThemeFilter::for_theme(Some(Theme::Sepia)));
        assert_eq!(*state.raster.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn composite_applies_filter() {
        let state = PreviewState::new(1, white(2, 2), Some(Theme::PureBlack));
        assert_eq!(*state.composite().get_pixel(1, 1), Rgba([0, 0, 0, 255]));

        let plain = PreviewState::new(1, white(2, 2), None);
        assert_eq!(plain.composite(), *plain.raster);
    }

    #[test]
    fn png_round_trips_dimensions() {
        let state = PreviewState::new(3, white(5, 7), Some(Theme::DarkGray));
        let png = state.to_png().unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 7));
    }

    #[test]
    fn data_uri_has_png_prefix() {
        let state = PreviewState::new(1, white(1, 1), None);
        let uri = state.to_data_uri().unwrap();
        let b64 = uri.strip_prefix("data:image/png;base64,").unwrap();
        assert!(!STANDARD.decode(b64).unwrap().is_empty());
    }

    #[test]
    fn save_png_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.png");
        PreviewState::new(1, white(3, 3), Some(Theme::Sepia))
            .save_png(&path)
            .unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
