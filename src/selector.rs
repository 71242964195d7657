//! File selection: validate and hold the single chosen PDF.
//!
//! The selector owns the current [`SelectedFile`] and publishes every change
//! on a [`tokio::sync::watch`] channel as a generation-stamped
//! [`Selection`]. Consumers such as the preview renderer subscribe to the
//! channel instead of sharing a mutable flag, so each pipeline reacts to a
//! file change on its own schedule and can tell a newer selection from a
//! stale one by its generation.

use crate::error::{DarkPdfError, SelectionError};
use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// The only MIME type the selector accepts.
pub const PDF_MIME: &str = "application/pdf";

const OCTET_STREAM: &str = "application/octet-stream";

/// A user-chosen file: payload plus its declared name and MIME type.
#[derive(Clone)]
pub struct SelectedFile {
    name: String,
    bytes: Bytes,
    mime: String,
}

impl SelectedFile {
    /// Wrap an in-memory payload with its declared name and MIME type.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>, mime: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            mime: mime.into(),
        }
    }

    /// Read a local file and declare its MIME type.
    ///
    /// The declared type comes from the extension, corrected by the payload:
    /// anything starting with the `%PDF` magic bytes is `application/pdf`,
    /// while a `.pdf` file without them is declared as an opaque byte stream
    /// so that selection rejects it.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, DarkPdfError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| read_error(path, e))?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        let mime = declared_mime(path, &bytes);
        debug!("Read {} ({} bytes, {})", path.display(), bytes.len(), mime);

        Ok(Self::new(name, bytes, mime))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Whether the declared MIME type is `application/pdf` (parameters and
    /// case ignored).
    pub fn is_pdf(&self) -> bool {
        self.mime
            .split(';')
            .next()
            .map(|essence| essence.trim().eq_ignore_ascii_case(PDF_MIME))
            .unwrap_or(false)
    }

    /// Display metadata: name and size in MB with two decimals.
    pub fn display(&self) -> FileDisplay {
        FileDisplay {
            name: self.name.clone(),
            size_bytes: self.size(),
            size_mb: format!("{:.2}", self.size() as f64 / 1024.0 / 1024.0),
        }
    }
}

impl fmt::Debug for SelectedFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SelectedFile")
            .field("name", &self.name)
            .field("size", &self.bytes.len())
            .field("mime", &self.mime)
            .finish()
    }
}

fn read_error(path: &Path, e: std::io::Error) -> DarkPdfError {
    let path: PathBuf = path.to_path_buf();
    match e.kind() {
        std::io::ErrorKind::NotFound => DarkPdfError::FileNotFound { path },
        std::io::ErrorKind::PermissionDenied => DarkPdfError::PermissionDenied { path },
        _ => DarkPdfError::ReadFailed { path, source: e },
    }
}

fn declared_mime(path: &Path, bytes: &[u8]) -> String {
    if bytes.starts_with(b"%PDF") {
        return PDF_MIME.to_string();
    }
    match mime_guess::from_path(path).first_raw() {
        Some(PDF_MIME) | None => OCTET_STREAM.to_string(),
        Some(guessed) => guessed.to_string(),
    }
}

/// Name and human-readable size of the selected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDisplay {
    pub name: String,
    pub size_bytes: u64,
    /// Size in MiB, two decimals, e.g. `"2.00"`.
    pub size_mb: String,
}

/// One published state of the selector.
///
/// `generation` increases on every change (select or clear) and never
/// repeats, so it doubles as a supersession token for work started from
/// this selection.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub generation: u64,
    pub file: Option<Arc<SelectedFile>>,
}

/// Holds zero or one validated PDF and broadcasts changes.
#[derive(Debug)]
pub struct FileSelector {
    tx: watch::Sender<Selection>,
}

impl Default for FileSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSelector {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(Selection::default());
        Self { tx }
    }

    /// Replace the selection with `candidate` if it is a PDF.
    ///
    /// Returns the new selection generation. A non-PDF candidate leaves the
    /// current selection untouched and yields
    /// [`SelectionError::ValidationRejected`].
    pub fn select(&self, candidate: SelectedFile) -> Result<u64, SelectionError> {
        if !candidate.is_pdf() {
            warn!(
                "Rejected '{}': declared type {} is not {}",
                candidate.name, candidate.mime, PDF_MIME
            );
            return Err(SelectionError::ValidationRejected {
                name: candidate.name,
                mime: candidate.mime,
            });
        }

        let name = candidate.name.clone();
        let size = candidate.size();
        let mut generation = 0;
        self.tx.send_modify(|selection| {
            selection.generation += 1;
            selection.file = Some(Arc::new(candidate));
            generation = selection.generation;
        });
        info!("Selected '{}' ({} bytes), generation {}", name, size, generation);
        Ok(generation)
    }

    /// Drop the selection. Returns the new generation.
    pub fn clear(&self) -> u64 {
        let mut generation = 0;
        self.tx.send_modify(|selection| {
            selection.generation += 1;
            selection.file = None;
            generation = selection.generation;
        });
        debug!("Selection cleared, generation {}", generation);
        generation
    }

    pub fn current(&self) -> Option<Arc<SelectedFile>> {
        self.tx.borrow().file.clone()
    }

    pub fn snapshot(&self) -> Selection {
        self.tx.borrow().clone()
    }

    pub fn generation(&self) -> u64 {
        self.tx.borrow().generation
    }

    pub fn display(&self) -> Option<FileDisplay> {
        self.tx.borrow().file.as_ref().map(|f| f.display())
    }

    /// Subscribe to selection changes. The receiver starts at the current
    /// selection.
    pub fn subscribe(&self) -> watch::Receiver<Selection> {
        self.tx.subscribe()
    }
}
