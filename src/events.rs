//! Observer trait for session lifecycle events.
//!
//! Inject an [`Arc<dyn SessionObserver>`] into
//! [`crate::session::Session`] to receive events as the selection changes,
//! the preview renders and the conversion request settles. This is also the
//! diagnostic channel for preview failures, which are never returned as
//! errors.
//!
//! The trait is `Send + Sync`: preview completions arrive from a Tokio task
//! while the conversion settles on the caller's task, so both may fire
//! concurrently.
//!
//! # Example
//!
//! ```rust
//! use darkpdf::{PreviewError, SessionObserver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct CountFailures {
//!     failures: AtomicUsize,
//! }
//!
//! impl SessionObserver for CountFailures {
//!     fn on_preview_failed(&self, generation: u64, error: &PreviewError) {
//!         self.failures.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("preview for selection {generation} failed: {error}");
//!     }
//! }
//! ```

use crate::download::DownloadInfo;
use crate::error::{ConversionFailure, PreviewError};
use std::sync::Arc;

/// Receives session lifecycle events.
///
/// All methods have default no-op implementations so implementors only
/// override what they care about.
pub trait SessionObserver: Send + Sync {
    /// The selection changed; `name` is `None` after a clear.
    fn on_selection_changed(&self, generation: u64, name: Option<&str>) {
        let _ = (generation, name);
    }

    /// A preview for selection `generation` is ready.
    fn on_preview_ready(&self, generation: u64, width: u32, height: u32) {
        let _ = (generation, width, height);
    }

    /// The preview for selection `generation` could not be produced.
    fn on_preview_failed(&self, generation: u64, error: &PreviewError) {
        let _ = (generation, error);
    }

    /// A conversion request was issued.
    fn on_conversion_started(&self, request_id: u64, file_name: &str) {
        let _ = (request_id, file_name);
    }

    /// A conversion request settled. `Ok` carries the payload length.
    fn on_conversion_settled(&self, request_id: u64, outcome: Result<usize, &ConversionFailure>) {
        let _ = (request_id, outcome);
    }

    /// A new download handle became live.
    fn on_handle_published(&self, info: &DownloadInfo) {
        let _ = info;
    }

    /// The download handle `handle_id` was released.
    fn on_handle_released(&self, handle_id: u64) {
        let _ = handle_id;
    }
}

/// A no-op observer. This is the default when none is configured.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Shared observer handle as stored by the session components.
pub type Observer = Arc<dyn SessionObserver>;

/// The default observer.
pub fn noop() -> Observer {
    Arc::new(NoopObserver)
}
