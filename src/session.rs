//! The application record tying the four components together.
//!
//! A [`Session`] owns one [`FileSelector`], [`PreviewRenderer`],
//! [`ConversionController`] and [`ResultLifecycle`], and applies the
//! transitive effects between them: a new selection starts a preview pass,
//! a successful conversion publishes a download handle, and clearing or
//! resetting tears all of it down in one step.
//!
//! ```rust,no_run
//! use darkpdf::{ClientConfig, Session, Theme};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::new(ClientConfig::from_env(), None)?;
//!     session.select_path("doc.pdf").await?;
//!     session.set_theme(Theme::PureBlack);
//!
//!     let download = session.convert().await?;
//!     println!("{} -> {}", download.filename, download.url);
//!     session.save(std::path::Path::new(".")).await?;
//!     Ok(())
//! }
//! ```

use crate::config::{ClientConfig, ConversionOptions, Theme};
use crate::controller::{ConversionController, ConversionState};
use crate::download::{DownloadInfo, ResultLifecycle};
use crate::error::{DarkPdfError, PreviewError, SubmitError};
use crate::events::{self, Observer};
use crate::preview::{PageRasterizer, PdfiumRasterizer, PreviewRenderer, PreviewState};
use crate::selector::{FileDisplay, FileSelector, SelectedFile};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// One user's workspace: at most one file, one request, one download.
pub struct Session {
    config: ClientConfig,
    selector: FileSelector,
    preview: PreviewRenderer,
    controller: ConversionController,
    results: tokio::sync::Mutex<ResultLifecycle>,
    options: Mutex<ConversionOptions>,
    observer: Observer,
}

impl Session {
    /// A session rendering previews with pdfium.
    pub fn new(config: ClientConfig, observer: Option<Observer>) -> Result<Self, DarkPdfError> {
        let rasterizer = Arc::new(PdfiumRasterizer::new(config.pdfium_lib_path.clone()));
        Self::with_rasterizer(config, rasterizer, observer)
    }

    /// A session rendering previews with `rasterizer`.
    pub fn with_rasterizer(
        config: ClientConfig,
        rasterizer: Arc<dyn PageRasterizer>,
        observer: Option<Observer>,
    ) -> Result<Self, DarkPdfError> {
        let observer = observer.unwrap_or_else(events::noop);
        let controller = ConversionController::new(&config, Arc::clone(&observer))?;
        let preview = PreviewRenderer::new(rasterizer, config.preview_scale, Arc::clone(&observer));
        let results = ResultLifecycle::new(config.download_prefix.clone(), Arc::clone(&observer));
        debug!("Session ready for {}", controller.url());

        Ok(Self {
            config,
            selector: FileSelector::new(),
            preview,
            controller,
            results: tokio::sync::Mutex::new(results),
            options: Mutex::new(ConversionOptions::default()),
            observer,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn selector(&self) -> &FileSelector {
        &self.selector
    }

    pub fn preview_renderer(&self) -> &PreviewRenderer {
        &self.preview
    }

    pub fn controller(&self) -> &ConversionController {
        &self.controller
    }

    // ── Selection ────────────────────────────────────────────────────────

    /// Select `file` and start its preview pass. Returns the selection
    /// generation.
    ///
    /// A rejected file leaves the session exactly as it was. Must be called
    /// from within a Tokio runtime.
    pub fn select(&self, file: SelectedFile) -> Result<u64, DarkPdfError> {
        let name = file.name().to_string();
        let generation = self.selector.select(file)?;
        self.observer.on_selection_changed(generation, Some(&name));
        self.preview.begin(self.selector.snapshot());
        Ok(generation)
    }

    /// Read `path` and select it.
    pub async fn select_path(&self, path: impl AsRef<Path>) -> Result<u64, DarkPdfError> {
        let file = SelectedFile::from_path(path).await?;
        self.select(file)
    }

    pub fn file(&self) -> Option<FileDisplay> {
        self.selector.display()
    }

    /// Drop the selection together with its preview, any in-flight request
    /// and the download handle.
    pub async fn clear(&self) {
        let generation = self.selector.clear();
        self.observer.on_selection_changed(generation, None);
        self.preview.begin(self.selector.snapshot());
        self.controller.abandon();
        self.results.lock().await.release();
    }

    /// Return every component to its initial state, options included.
    pub async fn reset(&self) {
        self.clear().await;
        let options = ConversionOptions::default();
        self.preview.set_theme(Some(options.theme));
        *self.lock_options() = options;
        info!("Session reset");
    }

    // ── Options ──────────────────────────────────────────────────────────

    pub fn options(&self) -> ConversionOptions {
        self.lock_options().clone()
    }

    /// Set the theme for the next request and the preview overlay. The
    /// preview is not re-rendered.
    pub fn set_theme(&self, theme: Theme) {
        self.lock_options().theme = theme;
        self.preview.set_theme(Some(theme));
    }

    pub fn set_eye_care(&self, on: bool) {
        self.lock_options().eye_care = on;
    }

    fn lock_options(&self) -> MutexGuard<'_, ConversionOptions> {
        self.options.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ── Conversion ───────────────────────────────────────────────────────

    /// Convert the selected file with the current options and publish the
    /// result as the live download.
    pub async fn convert(&self) -> Result<DownloadInfo, DarkPdfError> {
        let file = self.selector.current().ok_or(SubmitError::NoFile)?;
        let converted = self
            .controller
            .submit(Arc::clone(&file), self.options())
            .await?;

        let mut results = self.results.lock().await;
        // A clear, reset or newer request may have run between settling
        // and this point.
        if !self.controller.state().is_success_of(converted.request_id) {
            debug!("Request {} dismissed before publishing", converted.request_id);
            return Err(SubmitError::Superseded.into());
        }
        results.publish(&converted.payload, file.name())
    }

    pub fn state(&self) -> ConversionState {
        self.controller.state()
    }

    /// Return the controller to `Idle` after a settled request, releasing
    /// the download handle. The selection and preview are kept.
    pub async fn dismiss(&self) -> Result<(), DarkPdfError> {
        self.controller.reset()?;
        self.results.lock().await.release();
        Ok(())
    }

    // ── Download ─────────────────────────────────────────────────────────

    pub async fn download(&self) -> Option<DownloadInfo> {
        self.results.lock().await.info()
    }

    /// Copy the converted document to `dest` (a file, or a directory for
    /// the suggested filename). Returns the written path.
    pub async fn save(&self, dest: &Path) -> Result<PathBuf, DarkPdfError> {
        self.results.lock().await.save_to(dest).await
    }

    pub async fn live_handles(&self) -> usize {
        self.results.lock().await.live_handles()
    }

    // ── Preview ──────────────────────────────────────────────────────────

    pub fn preview(&self) -> Option<PreviewState> {
        self.preview.current()
    }

    pub fn preview_error(&self) -> Option<PreviewError> {
        self.preview.last_error()
    }

    /// Wait for the pending preview pass, if any.
    pub async fn preview_settled(&self) {
        self.preview.wait().await
    }

    /// A serialisable view of the whole session.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let results = self.results.lock().await;
        SessionSnapshot {
            selection_generation: self.selector.generation(),
            file: self.selector.display(),
            options: self.options(),
            conversion: self.controller.state(),
            preview: self.preview.current().map(|p| PreviewSummary {
                generation: p.generation,
                width: p.raster.width(),
                height: p.raster.height(),
                filter: p.filter.to_string(),
            }),
            preview_error: self.preview.last_error(),
            download: results.info(),
            live_handles: results.live_handles(),
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("file", &self.selector.display())
            .field("state", &self.controller.state())
            .field("options", &self.options())
            .finish()
    }
}

/// Preview dimensions and the overlay filter in CSS syntax.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewSummary {
    pub generation: u64,
    pub width: u32,
    pub height: u32,
    pub filter: String,
}

/// Serialisable view of a [`Session`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub selection_generation: u64,
    pub file: Option<FileDisplay>,
    pub options: ConversionOptions,
    pub conversion: ConversionState,
    pub preview: Option<PreviewSummary>,
    pub preview_error: Option<PreviewError>,
    pub download: Option<DownloadInfo>,
    pub live_handles: usize,
}

impl SessionSnapshot {
    /// No file, no preview, idle controller, no download, default options.
    pub fn is_initial(&self) -> bool {
        self.file.is_none()
            && self.preview.is_none()
            && self.conversion.is_idle()
            && self.download.is_none()
            && self.live_handles == 0
            && self.options == ConversionOptions::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    struct Blank;

    impl PageRasterizer for Blank {
        fn rasterize_first_page(&self, _pdf: &[u8], scale: f32) -> Result<RgbaImage, PreviewError> {
            let (w, h) = crate::preview::viewport_size(612.0, 792.0, scale);
            Ok(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
        }
    }

    fn session() -> Session {
        Session::with_rasterizer(ClientConfig::default(), Arc::new(Blank), None).unwrap()
    }

    fn pdf(name: &str) -> SelectedFile {
        SelectedFile::new(name, b"%PDF-1.7\n".to_vec(), "application/pdf")
    }

    #[tokio::test]
    async fn fresh_session_is_initial() {
        assert!(session().snapshot().await.is_initial());
    }

    #[tokio::test]
    async fn select_renders_preview_at_one_and_a_half() {
        let s = session();
        s.select(pdf("doc.pdf")).unwrap();
        s.preview_settled().await;
        let preview = s.preview().unwrap();
        assert_eq!(preview.dimensions(), (918, 1188));
        assert_eq!(s.file().unwrap().name, "doc.pdf");
    }

    #[tokio::test]
    async fn rejected_file_leaves_session_unchanged() {
        let s = session();
        s.select(pdf("keep.pdf")).unwrap();
        let err = s
            .select(SelectedFile::new("a.txt", "text", "text/plain"))
            .unwrap_err();
        assert!(matches!(err, DarkPdfError::Selection(_)));
        assert_eq!(s.file().unwrap().name, "keep.pdf");
    }

    #[tokio::test]
    async fn convert_without_file_is_refused() {
        let s = session();
        let err = s.convert().await.unwrap_err();
        assert!(matches!(err, DarkPdfError::Submit(SubmitError::NoFile)));
        assert!(s.state().is_idle());
    }

    #[tokio::test]
    async fn set_theme_updates_options_and_overlay() {
        let s = session();
        s.select(pdf("doc.pdf")).unwrap();
        s.preview_settled().await;
        s.set_theme(Theme::Sepia);
        assert_eq!(s.options().theme, Theme::Sepia);
        let snap = s.snapshot().await;
        assert_eq!(
            snap.preview.unwrap().filter,
            "invert(0.9) sepia(0.6) hue-rotate(10deg) brightness(0.8)"
        );
        assert_eq!(s.preview_renderer().passes(), 1);
    }

    #[tokio::test]
    async fn reset_restores_initial_state() {
        let s = session();
        s.select(pdf("doc.pdf")).unwrap();
        s.set_theme(Theme::DarkGray);
        s.set_eye_care(true);
        s.preview_settled().await;

        s.reset().await;
        let snap = s.snapshot().await;
        assert!(snap.is_initial(), "{snap:?}");
        assert_eq!(snap.selection_generation, 2);
    }

    #[tokio::test]
    async fn dismissed_request_never_publishes_after_a_newer_success() {
        let server = httpmock::MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/convert");
            then.status(200).body("%PDF-1.7\n%%EOF\n");
        });
        let config = ClientConfig::builder()
            .api_base(server.base_url())
            .build()
            .unwrap();
        let s = Session::with_rasterizer(config, Arc::new(Blank), None).unwrap();
        s.select(pdf("a.pdf")).unwrap();

        // Hold the handle owner so request A settles but cannot publish yet.
        let guard = s.results.lock().await;
        let (a, b) = tokio::join!(s.convert(), async {
            wait_for(|| s.state().is_success_of(1)).await;
            s.controller().reset().unwrap();
            s.select(pdf("b.pdf")).unwrap();
            let (b, _) = tokio::join!(s.convert(), async {
                wait_for(|| s.state().is_success_of(2)).await;
                drop(guard);
            });
            b
        });

        assert!(matches!(a, Err(DarkPdfError::Submit(SubmitError::Superseded))));
        assert_eq!(b.unwrap().filename, "dark_mode_b.pdf");
        assert_eq!(s.download().await.unwrap().filename, "dark_mode_b.pdf");
        assert_eq!(s.live_handles().await, 1);
    }

    async fn wait_for(mut ready: impl FnMut() -> bool) {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while !ready() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("condition reached in time");
    }
}
