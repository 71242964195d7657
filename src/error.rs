//! Error types for the darkpdf library.
//!
//! Failures fall into tiers that the caller treats differently:
//!
//! * [`DarkPdfError`]: **Fatal** for the operation that returned it (file
//!   unreadable, invalid configuration, the download handle could not be
//!   written). Returned as `Err` from [`crate::session::Session`] methods.
//!
//! * [`SelectionError`]: the candidate file was rejected at selection
//!   time. The previous selection is left untouched.
//!
//! * [`SubmitError`] / [`ConversionFailure`]: the conversion request was
//!   refused by the state machine, or it settled with a classified failure.
//!   Every [`FailureKind`] maps to the same user-facing message; the kind is
//!   kept for logs and for tests.
//!
//! * [`PreviewError`]: **Non-fatal**. The local preview could not be
//!   produced. Reported to the observer and logged, never propagated into
//!   the selection or conversion flow.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The one message shown to users for any conversion failure.
pub const GENERIC_FAILURE_MESSAGE: &str = "Failed to convert the PDF. Please try again.";

/// Fatal errors returned by the darkpdf library.
#[derive(Debug, Error)]
pub enum DarkPdfError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Any other I/O failure while reading the input.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The candidate file was refused by the selector.
    #[error(transparent)]
    Selection(#[from] SelectionError),

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The conversion request was refused or failed.
    #[error(transparent)]
    Submit(#[from] SubmitError),

    // ── Download handle errors ────────────────────────────────────────────
    /// Could not create or fill the temporary file backing a download handle.
    #[error("Failed to create download handle: {source}")]
    HandleIo {
        #[source]
        source: std::io::Error,
    },

    /// `save` was called while no converted document is held.
    #[error("No converted document is available; run a conversion first")]
    NoLiveHandle,

    /// Could not write the downloaded document to its destination.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reasons a candidate file is refused by [`crate::selector::FileSelector`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    /// The declared MIME type is not `application/pdf`.
    #[error("'{name}' is not a PDF (declared type: {mime}); choose a PDF file")]
    ValidationRejected { name: String, mime: String },
}

/// Classification of a settled, unsuccessful conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No response arrived before the deadline.
    Timeout,
    /// Transport-level failure: no HTTP response at all.
    Network,
    /// A response arrived, but with a non-success status or a body that is
    /// not a PDF.
    ServerRejected,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureKind::Timeout => "timeout",
            FailureKind::Network => "network failure",
            FailureKind::ServerRejected => "rejected by server",
        };
        f.write_str(s)
    }
}

/// A classified conversion failure with a diagnostic detail string.
///
/// `Display` is meant for logs. Show [`ConversionFailure::user_message`] to
/// users instead: all kinds collapse into one message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("conversion {kind}: {detail}")]
pub struct ConversionFailure {
    pub kind: FailureKind,
    pub detail: String,
}

impl ConversionFailure {
    pub fn new(kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, detail)
    }

    pub fn network(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Network, detail)
    }

    pub fn server_rejected(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::ServerRejected, detail)
    }

    /// The message to show users, identical for every kind.
    pub fn user_message(&self) -> &'static str {
        GENERIC_FAILURE_MESSAGE
    }
}

/// Why [`crate::controller::ConversionController::submit`] did not yield a
/// payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    /// No file is selected.
    #[error("No PDF selected")]
    NoFile,

    /// A request is already in flight; concurrent submits are refused, not
    /// queued.
    #[error("A conversion is already in progress")]
    Busy,

    /// The controller holds a settled result; reset before submitting again.
    #[error("Cannot submit from state '{state}'; reset first")]
    NotIdle { state: &'static str },

    /// The request was abandoned (reset or clear) before it settled; its
    /// result was discarded.
    #[error("The conversion was abandoned before it completed")]
    Superseded,

    /// The request settled with a classified failure.
    #[error(transparent)]
    Failed(#[from] ConversionFailure),
}

/// A non-fatal failure of the local preview pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PreviewError {
    /// The pdfium shared library could not be bound.
    #[error("PDFium library unavailable: {0}")]
    LibraryUnavailable(String),

    /// The payload could not be opened as a PDF document.
    #[error("Could not decode PDF: {0}")]
    Decode(String),

    /// The document has no pages to preview.
    #[error("PDF has no pages")]
    NoPages,

    /// pdfium failed to rasterise page 1.
    #[error("Rasterisation of page 1 failed: {0}")]
    Rasterise(String),

    /// The blocking render task panicked or was cancelled.
    #[error("Preview task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_failure_kind_shares_one_user_message() {
        let kinds = [
            FailureKind::Timeout,
            FailureKind::Network,
            FailureKind::ServerRejected,
        ];
        for kind in kinds {
            let f = ConversionFailure::new(kind, "detail");
            assert_eq!(f.user_message(), GENERIC_FAILURE_MESSAGE);
        }
    }

    #[test]
    fn failure_display_keeps_kind_and_detail() {
        let f = ConversionFailure::timeout("no response within 60000ms");
        let msg = f.to_string();
        assert!(msg.contains("timeout"), "got: {msg}");
        assert!(msg.contains("60000ms"), "got: {msg}");
    }

    #[test]
    fn validation_rejected_display_names_the_file() {
        let e = SelectionError::ValidationRejected {
            name: "notes.txt".into(),
            mime: "text/plain".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("notes.txt"));
        assert!(msg.contains("text/plain"));
    }

    #[test]
    fn submit_error_wraps_failure_transparently() {
        let e: SubmitError = ConversionFailure::server_rejected("HTTP 500").into();
        assert_eq!(e.to_string(), "conversion rejected by server: HTTP 500");
    }

    #[test]
    fn failure_kind_serialises_snake_case() {
        let json = serde_json::to_string(&FailureKind::ServerRejected).unwrap();
        assert_eq!(json, "\"server_rejected\"");
    }
}
