//! Configuration types for the dark-mode conversion client.
//!
//! Two kinds of settings live here:
//!
//! * [`ClientConfig`]: process-wide knobs read once at startup (endpoint,
//!   deadline, preview scale, download naming). Built via
//!   [`ClientConfigBuilder`] or [`ClientConfig::from_env`].
//! * [`ConversionOptions`]: the per-request parameters sent to the
//!   conversion endpoint. A snapshot is taken at submit time, so later
//!   edits never affect a request already in flight.

use crate::error::DarkPdfError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Environment variable holding the conversion service base URL.
pub const API_URL_ENV: &str = "DARKPDF_API_URL";

/// Base URL used when [`API_URL_ENV`] is unset or empty.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Client configuration.
///
/// # Example
/// ```rust
/// use darkpdf::ClientConfig;
///
/// let config = ClientConfig::builder()
///     .api_base("http://localhost:9000/")
///     .request_timeout_ms(30_000)
///     .build()
///     .unwrap();
/// assert_eq!(config.convert_url(), "http://localhost:9000/convert");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the conversion service. Default: [`DEFAULT_API_BASE`].
    pub api_base: String,

    /// Deadline for one conversion request, in milliseconds. Default: 60 000.
    ///
    /// Covers connect, upload and the full response body. Exceeding it
    /// settles the request as a timeout.
    pub request_timeout_ms: u64,

    /// Preview viewport scale relative to the native page size. Default: 1.5.
    pub preview_scale: f32,

    /// Prefix of the suggested download filename. Default: `dark_mode_`.
    pub download_prefix: String,

    /// Path to the pdfium shared library, or a directory holding it.
    /// If None, `./` then the system library search path are tried.
    pub pdfium_lib_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            request_timeout_ms: 60_000,
            preview_scale: 1.5,
            download_prefix: "dark_mode_".to_string(),
            pdfium_lib_path: None,
        }
    }
}

impl ClientConfig {
    /// Create a new builder for `ClientConfig`.
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults, with the API base taken from [`API_URL_ENV`] when set.
    pub fn from_env() -> Self {
        Self {
            api_base: api_base_or_default(std::env::var(API_URL_ENV).ok()),
            ..Self::default()
        }
    }

    /// Full URL of the conversion endpoint.
    pub fn convert_url(&self) -> String {
        format!("{}/convert", self.api_base.trim_end_matches('/'))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Resolve the configured base URL, falling back to the loopback default
/// when the value is missing or blank.
pub fn api_base_or_default(value: Option<String>) -> String {
    match value {
        Some(v) if !v.trim().is_empty() => v.trim().to_string(),
        _ => DEFAULT_API_BASE.to_string(),
    }
}

/// Builder for [`ClientConfig`].
#[derive(Debug)]
pub struct ClientConfigBuilder {
    config: ClientConfig,
}

impl ClientConfigBuilder {
    pub fn api_base(mut self, url: impl Into<String>) -> Self {
        self.config.api_base = url.into();
        self
    }

    pub fn request_timeout_ms(mut self, ms: u64) -> Self {
        self.config.request_timeout_ms = ms;
        self
    }

    pub fn preview_scale(mut self, scale: f32) -> Self {
        self.config.preview_scale = scale.clamp(0.1, 8.0);
        self
    }

    pub fn download_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.download_prefix = prefix.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ClientConfig, DarkPdfError> {
        let c = &self.config;
        let url = reqwest::Url::parse(c.api_base.trim()).map_err(|e| {
            DarkPdfError::InvalidConfig(format!("API base '{}' is not a URL: {e}", c.api_base))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(DarkPdfError::InvalidConfig(format!(
                "API base must be http or https, got '{}'",
                url.scheme()
            )));
        }
        if c.request_timeout_ms == 0 {
            return Err(DarkPdfError::InvalidConfig(
                "Request timeout must be ≥ 1ms".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Per-request options ──────────────────────────────────────────────────

/// Visual treatment requested from the service and mirrored by the preview
/// filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Theme {
    /// Inverted page on true black. (default)
    #[default]
    PureBlack,
    /// Softer inversion on dark grey.
    DarkGray,
    /// Warm, low-blue inversion.
    Sepia,
}

impl Theme {
    /// Every theme, in declaration order.
    pub const ALL: [Theme; 3] = [Theme::PureBlack, Theme::DarkGray, Theme::Sepia];

    /// The wire identifier sent in the `theme` form field.
    pub fn as_str(self) -> &'static str {
        match self {
            Theme::PureBlack => "pure-black",
            Theme::DarkGray => "dark-gray",
            Theme::Sepia => "sepia",
        }
    }

    /// Parse a theme identifier, returning `None` for anything unrecognised.
    pub fn parse_lenient(s: &str) -> Option<Theme> {
        s.parse().ok()
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Theme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pure-black" => Ok(Theme::PureBlack),
            "dark-gray" | "dark-grey" => Ok(Theme::DarkGray),
            "sepia" => Ok(Theme::Sepia),
            other => Err(format!(
                "unknown theme '{other}' (expected pure-black, dark-gray or sepia)"
            )),
        }
    }
}

/// Value of the `pages` form field. The service always converts the whole
/// document.
pub const PAGES_ALL: &str = "all";

/// Parameters of one conversion request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub theme: Theme,
    /// Ask the service for its eye-care (reduced blue light) treatment.
    pub eye_care: bool,
}

impl ConversionOptions {
    pub fn with_theme(mut self, theme: Theme) -> Self {
        self.theme = theme;
        self
    }

    pub fn with_eye_care(mut self, on: bool) -> Self {
        self.eye_care = on;
        self
    }
}
