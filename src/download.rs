//! The converted document as a downloadable resource.
//!
//! A successful conversion is written to a temp file wrapped in a
//! [`DownloadHandle`]. [`ResultLifecycle`] keeps at most one handle live:
//! publishing a new result releases the previous handle first, and a
//! released handle deletes its file. Every handle shares a live counter so
//! leaks show up as a count above one.

use crate::error::DarkPdfError;
use crate::events::Observer;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Characters that are unsafe in a suggested filename on common platforms.
static UNSAFE_FILENAME_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[\x00-\x1f<>:"|?*]"#).expect("valid regex"));

/// Suggested filename for the converted document: `prefix` plus the
/// sanitised base name of the source, with `.pdf` appended only when
/// missing. An empty name becomes `document.pdf`.
///
/// ```rust
/// use darkpdf::download_filename;
///
/// assert_eq!(download_filename("dark_mode_", "doc.pdf"), "dark_mode_doc.pdf");
/// assert_eq!(download_filename("dark_mode_", "report"), "dark_mode_report.pdf");
/// assert_eq!(download_filename("dark_mode_", ""), "dark_mode_document.pdf");
/// ```
pub fn download_filename(prefix: &str, source_name: &str) -> String {
    let base = source_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(source_name);
    let base = UNSAFE_FILENAME_CHARS.replace_all(base, "_");
    let base = base.trim();

    let mut name = if base.is_empty() || base == "." || base == ".." {
        "document.pdf".to_string()
    } else {
        base.to_string()
    };
    if !name.to_ascii_lowercase().ends_with(".pdf") {
        name.push_str(".pdf");
    }
    format!("{prefix}{name}")
}

/// A live reference to a converted document held in a temp file.
///
/// Dropping the handle deletes the file.
pub struct DownloadHandle {
    id: u64,
    file: NamedTempFile,
    filename: String,
    len: u64,
    created: Instant,
    live: Arc<AtomicUsize>,
}

impl DownloadHandle {
    fn create(
        id: u64,
        payload: &[u8],
        filename: String,
        live: Arc<AtomicUsize>,
    ) -> Result<Self, DarkPdfError> {
        let mut file = tempfile::Builder::new()
            .prefix("darkpdf-")
            .suffix(".pdf")
            .tempfile()
            .map_err(|e| DarkPdfError::HandleIo { source: e })?;
        file.write_all(payload)
            .and_then(|_| file.flush())
            .map_err(|e| DarkPdfError::HandleIo { source: e })?;

        live.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            id,
            file,
            filename,
            len: payload.len() as u64,
            created: Instant::now(),
            live,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// `file://` URL of the backing file.
    pub fn url(&self) -> String {
        reqwest::Url::from_file_path(self.file.path())
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("file://{}", self.file.path().display()))
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn info(&self) -> DownloadInfo {
        DownloadInfo {
            handle_id: self.id,
            url: self.url(),
            filename: self.filename.clone(),
            size_bytes: self.len,
        }
    }
}

impl Drop for DownloadHandle {
    fn drop(&mut self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
        debug!("Released download handle {} ({})", self.id, self.filename);
    }
}

impl std::fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("id", &self.id)
            .field("path", &self.file.path())
            .field("filename", &self.filename)
            .field("len", &self.len)
            .finish()
    }
}

/// What the download surface shows for the live handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadInfo {
    pub handle_id: u64,
    pub url: String,
    pub filename: String,
    pub size_bytes: u64,
}

/// Owner of the single live [`DownloadHandle`].
pub struct ResultLifecycle {
    prefix: String,
    current: Option<DownloadHandle>,
    next_id: u64,
    live: Arc<AtomicUsize>,
    observer: Observer,
}

impl ResultLifecycle {
    pub fn new(prefix: impl Into<String>, observer: Observer) -> Self {
        Self {
            prefix: prefix.into(),
            current: None,
            next_id: 0,
            live: Arc::new(AtomicUsize::new(0)),
            observer,
        }
    }

    /// Make `payload` the live download, releasing any previous handle
    /// before the new one is created.
    pub fn publish(&mut self, payload: &[u8], source_name: &str) -> Result<DownloadInfo, DarkPdfError> {
        self.release();

        self.next_id += 1;
        let filename = download_filename(&self.prefix, source_name);
        let handle = DownloadHandle::create(self.next_id, payload, filename, Arc::clone(&self.live))?;
        let info = handle.info();
        info!(
            "Download ready: {} ({} bytes) at {}",
            info.filename, info.size_bytes, info.url
        );
        self.current = Some(handle);
        self.observer.on_handle_published(&info);
        Ok(info)
    }

    /// Release the live handle. Returns whether one was live.
    pub fn release(&mut self) -> bool {
        match self.current.take() {
            Some(handle) => {
                let id = handle.id();
                drop(handle);
                self.observer.on_handle_released(id);
                true
            }
            None => false,
        }
    }

    pub fn current(&self) -> Option<&DownloadHandle> {
        self.current.as_ref()
    }

    pub fn info(&self) -> Option<DownloadInfo> {
        self.current.as_ref().map(DownloadHandle::info)
    }

    /// Number of handles not yet dropped, across every handle this
    /// lifecycle created.
    pub fn live_handles(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Copy the live document to `dest`.
    ///
    /// If `dest` is a directory the suggested filename is used inside it.
    /// The write goes to a sibling temp path first and is then renamed into
    /// place. Returns the final path.
    pub async fn save_to(&self, dest: &Path) -> Result<PathBuf, DarkPdfError> {
        let handle = self.current.as_ref().ok_or(DarkPdfError::NoLiveHandle)?;

        let path = if tokio::fs::metadata(dest)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
        {
            dest.join(handle.filename())
        } else {
            dest.to_path_buf()
        };
        let write_err = |e: std::io::Error| DarkPdfError::OutputWriteFailed {
            path: path.clone(),
            source: e,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
        }

        let payload = tokio::fs::read(handle.path())
            .await
            .map_err(|e| DarkPdfError::HandleIo { source: e })?;

        let tmp_path = path.with_extension("pdf.tmp");
        tokio::fs::write(&tmp_path, &payload)
            .await
            .map_err(write_err)?;
        if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(write_err(e));
        }

        info!("Saved {} bytes to {}", payload.len(), path.display());
        Ok(path)
    }
}

impl std::fmt::Debug for ResultLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultLifecycle")
            .field("prefix", &self.prefix)
            .field("current", &self.current)
            .field("live", &self.live_handles())
            .finish()
    }
}
