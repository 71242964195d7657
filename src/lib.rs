//! # darkpdf
//!
//! Request dark-mode renderings of PDF documents from a conversion service,
//! with a local themed preview of page 1.
//!
//! ## Overview
//!
//! ```text
//! select ──► FileSelector ──(Selection, generation)──► PreviewRenderer
//!                 │                                        │ page 1 @ 1.5x
//!                 │                                        ▼ + ThemeFilter overlay
//!   convert ──────┴──► ConversionController ──POST /convert──► service
//!                           │ Idle → Converting → Success | Error
//!                           ▼
//!                     ResultLifecycle ──► DownloadHandle (temp file, at most one)
//! ```
//!
//! * The controller allows one request in flight, bounds it with a 60 s
//!   deadline and classifies failures as timeout, network or rejection.
//!   All three show users the same message.
//! * The preview is cosmetic: a filter laid over an unmodified raster.
//!   Preview failures never affect selection or conversion.
//! * A reset returns everything to the initial state, and a late response
//!   to an abandoned request is discarded.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use darkpdf::{ClientConfig, Session, Theme};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Endpoint from DARKPDF_API_URL, default http://127.0.0.1:8000
//!     let session = Session::new(ClientConfig::from_env(), None)?;
//!     session.select_path("paper.pdf").await?;
//!     session.set_theme(Theme::Sepia);
//!
//!     let download = session.convert().await?;
//!     let saved = session.save(std::path::Path::new(".")).await?;
//!     eprintln!("{} → {}", download.filename, saved.display());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `darkpdf` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! darkpdf = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod download;
pub mod error;
pub mod events;
pub mod preview;
pub mod selector;
pub mod session;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    ClientConfig, ClientConfigBuilder, ConversionOptions, Theme, API_URL_ENV, DEFAULT_API_BASE,
};
pub use controller::{ConversionController, ConversionState, Converted};
pub use download::{download_filename, DownloadHandle, DownloadInfo, ResultLifecycle};
pub use error::{
    ConversionFailure, DarkPdfError, FailureKind, PreviewError, SelectionError, SubmitError,
    GENERIC_FAILURE_MESSAGE,
};
pub use events::{NoopObserver, Observer, SessionObserver};
pub use preview::{
    FilterOp, PageRasterizer, PdfiumRasterizer, PreviewRenderer, PreviewState, ThemeFilter,
};
pub use selector::{FileDisplay, FileSelector, SelectedFile, Selection, PDF_MIME};
pub use session::{PreviewSummary, Session, SessionSnapshot};
