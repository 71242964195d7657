//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use darkpdf::preview::viewport_size;
use darkpdf::{
    ClientConfig, ConversionFailure, DownloadInfo, PageRasterizer, PreviewError, SelectedFile,
    Session, SessionObserver,
};
use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

pub const PDF_BODY: &[u8] = b"%PDF-1.7\n% converted\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

/// A selectable PDF whose payload is `len` bytes long (at least the header).
pub fn pdf_file(name: &str, len: usize) -> SelectedFile {
    let mut bytes = b"%PDF-1.7\n".to_vec();
    bytes.resize(len.max(bytes.len()), b'\n');
    SelectedFile::new(name, bytes, "application/pdf")
}

/// Rasterizer that paints a white US-letter page. The width equals the
/// payload length when `size_by_payload` is set, which lets tests tell
/// which file a preview came from.
#[derive(Default)]
pub struct FakeRasterizer {
    pub calls: AtomicUsize,
    pub delay: Option<Duration>,
    pub size_by_payload: bool,
}

impl FakeRasterizer {
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn sized_by_payload() -> Self {
        Self {
            size_by_payload: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PageRasterizer for FakeRasterizer {
    fn rasterize_first_page(&self, pdf: &[u8], scale: f32) -> Result<RgbaImage, PreviewError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        let (w, h) = if self.size_by_payload {
            (pdf.len() as u32, 10)
        } else {
            viewport_size(612.0, 792.0, scale)
        };
        Ok(RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255])))
    }
}

/// Rasterizer that always fails to decode.
pub struct BrokenRasterizer;

impl PageRasterizer for BrokenRasterizer {
    fn rasterize_first_page(&self, _pdf: &[u8], _scale: f32) -> Result<RgbaImage, PreviewError> {
        Err(PreviewError::Decode("not a PDF document".into()))
    }
}

/// Observer that records every event it receives.
#[derive(Default)]
pub struct RecordingObserver {
    pub previews_ready: Mutex<Vec<u64>>,
    pub previews_failed: Mutex<Vec<u64>>,
    pub started: AtomicUsize,
    pub failures: Mutex<Vec<ConversionFailure>>,
    pub successes: AtomicUsize,
    pub published: AtomicUsize,
    pub released: AtomicUsize,
}

impl SessionObserver for RecordingObserver {
    fn on_preview_ready(&self, generation: u64, _width: u32, _height: u32) {
        self.previews_ready.lock().unwrap().push(generation);
    }

    fn on_preview_failed(&self, generation: u64, _error: &PreviewError) {
        self.previews_failed.lock().unwrap().push(generation);
    }

    fn on_conversion_started(&self, _request_id: u64, _file_name: &str) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_conversion_settled(&self, _request_id: u64, outcome: Result<usize, &ConversionFailure>) {
        match outcome {
            Ok(_) => {
                self.successes.fetch_add(1, Ordering::SeqCst);
            }
            Err(f) => self.failures.lock().unwrap().push(f.clone()),
        }
    }

    fn on_handle_published(&self, _info: &DownloadInfo) {
        self.published.fetch_add(1, Ordering::SeqCst);
    }

    fn on_handle_released(&self, _handle_id: u64) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Route library logs to the test harness; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(base_url: &str, timeout_ms: u64) -> ClientConfig {
    ClientConfig::builder()
        .api_base(base_url)
        .request_timeout_ms(timeout_ms)
        .build()
        .expect("valid test config")
}

pub fn session_with(
    config: ClientConfig,
    rasterizer: Arc<dyn PageRasterizer>,
    observer: Arc<RecordingObserver>,
) -> Session {
    init_tracing();
    Session::with_rasterizer(config, rasterizer, Some(observer as Arc<dyn SessionObserver>))
        .expect("session")
}
