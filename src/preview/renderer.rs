//! Preview pass scheduling and supersession.

use super::render::PageRasterizer;
use super::state::PreviewState;
use crate::config::Theme;
use crate::error::PreviewError;
use crate::events::Observer;
use crate::selector::{SelectedFile, Selection};
use image::RgbaImage;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

/// Renders page 1 of the selected PDF, one pass per selection.
///
/// Each pass is tagged with the generation of the selection it started
/// from. A pass that completes after a newer selection has begun is
/// dropped, and beginning a pass aborts the previous one. The theme is an
/// overlay on the stored raster: [`PreviewRenderer::set_theme`] never
/// starts a pass.
///
/// Cloning yields another handle to the same renderer.
#[derive(Clone)]
pub struct PreviewRenderer {
    inner: Arc<Inner>,
}

struct Inner {
    rasterizer: Arc<dyn PageRasterizer>,
    scale: f32,
    observer: Observer,
    passes: AtomicU64,
    slot: Mutex<Slot>,
}

#[derive(Default)]
struct Slot {
    latest: u64,
    theme: Option<Theme>,
    state: Option<PreviewState>,
    last_error: Option<PreviewError>,
    task: Option<JoinHandle<()>>,
    abort: Option<AbortHandle>,
}

impl PreviewRenderer {
    pub fn new(rasterizer: Arc<dyn PageRasterizer>, scale: f32, observer: Observer) -> Self {
        Self {
            inner: Arc::new(Inner {
                rasterizer,
                scale,
                observer,
                passes: AtomicU64::new(0),
                slot: Mutex::new(Slot {
                    theme: Some(Theme::default()),
                    ..Slot::default()
                }),
            }),
        }
    }

    /// Start the pass for `selection`, superseding any pass in progress.
    ///
    /// Selections older than the latest one seen are ignored, as is a
    /// repeat of the latest. An empty selection clears the preview without
    /// starting a pass. Returns whether a pass was started.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn begin(&self, selection: Selection) -> bool {
        let generation = selection.generation;
        let mut slot = self.inner.lock();
        if generation < slot.latest || (generation == slot.latest && generation > 0) {
            debug!(
                "Ignoring selection {} (latest is {})",
                generation, slot.latest
            );
            return false;
        }

        slot.latest = generation;
        if let Some(abort) = slot.abort.take() {
            abort.abort();
        }
        slot.task = None;
        slot.state = None;
        slot.last_error = None;

        let Some(file) = selection.file else {
            debug!("Preview cleared at selection {}", generation);
            return false;
        };

        self.inner.passes.fetch_add(1, Ordering::SeqCst);
        debug!("Preview pass for '{}' at selection {}", file.name(), generation);

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            let outcome = run_pass(Arc::clone(&inner.rasterizer), file, inner.scale).await;
            inner.complete(generation, outcome);
        });
        slot.abort = Some(task.abort_handle());
        slot.task = Some(task);
        true
    }

    /// Change the overlay filter. The stored raster is kept as is.
    pub fn set_theme(&self, theme: Option<Theme>) {
        let mut slot = self.inner.lock();
        slot.theme = theme;
        if let Some(state) = slot.state.as_mut() {
            state.set_theme(theme);
        }
    }

    pub fn theme(&self) -> Option<Theme> {
        self.inner.lock().theme
    }

    /// The current preview, if the latest pass produced one.
    pub fn current(&self) -> Option<PreviewState> {
        self.inner.lock().state.clone()
    }

    /// The error of the latest pass, if it failed.
    pub fn last_error(&self) -> Option<PreviewError> {
        self.inner.lock().last_error.clone()
    }

    /// Generation of the latest selection seen.
    pub fn latest_generation(&self) -> u64 {
        self.inner.lock().latest
    }

    /// Number of passes started so far.
    pub fn passes(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    /// Wait until no pass is in progress.
    pub async fn wait(&self) {
        loop {
            let task = self.inner.lock().task.take();
            match task {
                // Aborted passes resolve with a cancellation error; a newer
                // pass, if any, is picked up by the next iteration.
                Some(task) => {
                    let _ = task.await;
                }
                None => return,
            }
        }
    }

    /// Begin one pass for every selection observed on `rx`, starting with
    /// the current one. The task ends when the sender is dropped.
    pub fn follow(&self, rx: watch::Receiver<Selection>) -> JoinHandle<()> {
        let renderer = self.clone();
        tokio::spawn(async move {
            let mut selections = WatchStream::new(rx);
            while let Some(selection) = selections.next().await {
                renderer.begin(selection);
            }
            debug!("Selection channel closed; preview follower stopped");
        })
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store the outcome of the pass for `generation` unless it has been
    /// superseded. Returns whether it was stored.
    fn complete(&self, generation: u64, outcome: Result<RgbaImage, PreviewError>) -> bool {
        let mut slot = self.lock();
        if generation != slot.latest {
            debug!(
                "Dropping stale preview for selection {} (latest is {})",
                generation, slot.latest
            );
            return false;
        }
        slot.abort = None;

        match outcome {
            Ok(raster) => {
                let state = PreviewState::new(generation, raster, slot.theme);
                let (width, height) = state.dimensions();
                slot.state = Some(state);
                drop(slot);
                info!("Preview ready: {}x{} px", width, height);
                self.observer.on_preview_ready(generation, width, height);
            }
            Err(e) => {
                slot.last_error = Some(e.clone());
                drop(slot);
                warn!("Preview failed: {}", e);
                self.observer.on_preview_failed(generation, &e);
            }
        }
        true
    }
}

async fn run_pass(
    rasterizer: Arc<dyn PageRasterizer>,
    file: Arc<SelectedFile>,
    scale: f32,
) -> Result<RgbaImage, PreviewError> {
    tokio::task::spawn_blocking(move || rasterizer.rasterize_first_page(file.bytes(), scale))
        .await
        .map_err(|e| PreviewError::Task(e.to_string()))?
}
