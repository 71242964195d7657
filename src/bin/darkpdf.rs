//! CLI binary for darkpdf.
//!
//! A thin shim over the library crate: maps CLI flags to `ClientConfig`
//! and `ConversionOptions`, runs select → preview → convert → save on one
//! `Session`, and prints the result.

use anyhow::{Context, Result};
use clap::Parser;
use darkpdf::config::api_base_or_default;
use darkpdf::{
    ClientConfig, ConversionFailure, DarkPdfError, DownloadInfo, PreviewError, Session,
    SessionObserver, SubmitError, Theme,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI observer using indicatif ─────────────────────────────────────────────

/// Terminal observer: a spinner while the request is in flight plus one log
/// line per preview and conversion event. Preview and conversion run
/// concurrently, so lines go through `bar.println` to keep the spinner
/// anchored.
struct CliObserver {
    bar: ProgressBar,
    started: std::sync::Mutex<Option<Instant>>,
}

impl CliObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  ⏱ {elapsed}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Preparing");
        Arc::new(Self {
            bar,
            started: std::sync::Mutex::new(None),
        })
    }
}

impl SessionObserver for CliObserver {
    fn on_preview_ready(&self, _generation: u64, width: u32, height: u32) {
        self.bar.println(format!(
            "  {} Preview    {}",
            green("✓"),
            dim(&format!("page 1 at {width}x{height} px"))
        ));
    }

    fn on_preview_failed(&self, _generation: u64, error: &PreviewError) {
        self.bar.println(format!(
            "  {} Preview    {}",
            cyan("⚠"),
            dim(&format!("unavailable: {error}"))
        ));
    }

    fn on_conversion_started(&self, _request_id: u64, file_name: &str) {
        if let Ok(mut started) = self.started.lock() {
            *started = Some(Instant::now());
        }
        self.bar.set_prefix("Converting");
        self.bar.set_message(file_name.to_string());
        self.bar.enable_steady_tick(Duration::from_millis(80));
    }

    fn on_conversion_settled(&self, _request_id: u64, outcome: Result<usize, &ConversionFailure>) {
        let elapsed = self
            .started
            .lock()
            .ok()
            .and_then(|mut s| s.take())
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);
        let secs = dim(&format!("{:.1}s", elapsed as f64 / 1000.0));
        match outcome {
            Ok(len) => self.bar.println(format!(
                "  {} Conversion {}  {}",
                green("✓"),
                dim(&format!("{len} bytes")),
                secs
            )),
            Err(failure) => self.bar.println(format!(
                "  {} Conversion {}  {}",
                red("✗"),
                red(&failure.kind.to_string()),
                secs
            )),
        }
        self.bar.finish_and_clear();
    }

    fn on_handle_published(&self, info: &DownloadInfo) {
        self.bar
            .println(format!("  {} Download   {}", green("✓"), dim(&info.url)));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert with the default pure-black theme into the current directory
  darkpdf document.pdf

  # Sepia, eye-care on, explicit output file
  darkpdf --theme sepia --eye-care paper.pdf -o paper-dark.pdf

  # Preview page 1 locally with the dark-gray overlay, no conversion
  darkpdf --preview-only --theme dark-gray --preview page1.png document.pdf

  # JSON session report
  darkpdf --json document.pdf > report.json

THEMES (preview overlay, CSS filter syntax):
  pure-black   invert(1) hue-rotate(180deg) brightness(0.8) contrast(1.2)
  dark-gray    invert(0.9) hue-rotate(180deg) brightness(0.7)
  sepia        invert(0.9) sepia(0.6) hue-rotate(10deg) brightness(0.8)

ENVIRONMENT VARIABLES:
  DARKPDF_API_URL     Conversion service base URL (default http://127.0.0.1:8000)
  PDFIUM_LIB_PATH     Path to libpdfium, or the directory holding it
  RUST_LOG            Override the log filter (e.g. darkpdf=debug)

NOTES:
  The preview needs the pdfium shared library. Without it the preview is
  skipped with a warning and the conversion still runs.
"#;

/// Convert PDFs to dark mode through a conversion service.
#[derive(Parser, Debug)]
#[command(
    name = "darkpdf",
    version,
    about = "Convert PDFs to dark mode through a conversion service",
    long_about = "Send a PDF to a dark-mode conversion service and save the converted document. \
A themed preview of page 1 is rendered locally with pdfium while the request is in flight.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path.
    input: PathBuf,

    /// Save the converted PDF here (a file, or a directory for the suggested name).
    #[arg(short, long, env = "DARKPDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Theme: pure-black, dark-gray, sepia.
    #[arg(long, env = "DARKPDF_THEME", value_enum, default_value = "pure-black")]
    theme: ThemeArg,

    /// Ask the service for its reduced blue-light treatment.
    #[arg(long, env = "DARKPDF_EYE_CARE")]
    eye_care: bool,

    /// Conversion service base URL.
    #[arg(long, env = "DARKPDF_API_URL")]
    api_url: Option<String>,

    /// Request deadline in milliseconds.
    #[arg(long, env = "DARKPDF_TIMEOUT_MS", default_value_t = 60_000)]
    timeout_ms: u64,

    /// Write the themed page-1 preview to this PNG file.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Render the preview only; do not contact the service.
    #[arg(long)]
    preview_only: bool,

    /// Preview scale relative to the page size in points (0.1–8.0).
    #[arg(long, env = "DARKPDF_PREVIEW_SCALE", default_value_t = 1.5)]
    preview_scale: f32,

    /// Path to libpdfium or the directory holding it.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print a JSON session report on stdout.
    #[arg(long, env = "DARKPDF_JSON")]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DARKPDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DARKPDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DARKPDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ThemeArg {
    PureBlack,
    #[value(alias = "dark-grey")]
    DarkGray,
    Sepia,
}

impl From<ThemeArg> for Theme {
    fn from(v: ThemeArg) -> Self {
        match v {
            ThemeArg::PureBlack => Theme::PureBlack,
            ThemeArg::DarkGray => Theme::DarkGray,
            ThemeArg::Sepia => Theme::Sepia,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner and observer lines replace INFO logs while progress is on.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build session ────────────────────────────────────────────────────
    let config = build_config(&cli)?;
    let observer: Option<Arc<dyn SessionObserver>> = if show_progress {
        Some(CliObserver::new() as Arc<dyn SessionObserver>)
    } else {
        None
    };
    let session = Session::new(config, observer).context("Failed to start session")?;

    session
        .select_path(&cli.input)
        .await
        .with_context(|| format!("Cannot select {}", cli.input.display()))?;
    session.set_theme(cli.theme.into());
    session.set_eye_care(cli.eye_care);

    // ── Preview only ─────────────────────────────────────────────────────
    if cli.preview_only {
        session.preview_settled().await;
        write_preview(&cli, &session)?;
        if cli.json {
            print_report(&session, None).await?;
        } else if !cli.quiet {
            match (session.preview(), session.preview_error()) {
                (Some(p), _) => eprintln!(
                    "{}  page 1  {}x{} px  {}",
                    green("✔"),
                    p.raster.width(),
                    p.raster.height(),
                    dim(&p.filter.to_string())
                ),
                (None, Some(e)) => eprintln!("{}  {}", red("✘"), e),
                (None, None) => {}
            }
        }
        return Ok(());
    }

    // ── Convert (preview renders concurrently) ───────────────────────────
    let (_, converted) = tokio::join!(session.preview_settled(), session.convert());
    write_preview(&cli, &session)?;

    let download = match converted {
        Ok(info) => info,
        Err(DarkPdfError::Submit(SubmitError::Failed(failure))) => {
            if cli.json {
                print_report(&session, None).await?;
            }
            if cli.verbose {
                eprintln!("{}", dim(&failure.to_string()));
            }
            anyhow::bail!(failure.user_message());
        }
        Err(e) => return Err(e).context("Conversion failed"),
    };

    // ── Save ─────────────────────────────────────────────────────────────
    let dest = cli.output.clone().unwrap_or_else(|| PathBuf::from("."));
    let saved = session
        .save(&dest)
        .await
        .context("Failed to save the converted PDF")?;

    if cli.json {
        print_report(&session, Some(&saved)).await?;
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  {}  →  {}",
            green("✔"),
            download.filename,
            dim(&format!("{} bytes", download.size_bytes)),
            bold(&saved.display().to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `ClientConfig`.
fn build_config(cli: &Cli) -> Result<ClientConfig> {
    let mut builder = ClientConfig::builder()
        .api_base(api_base_or_default(cli.api_url.clone()))
        .request_timeout_ms(cli.timeout_ms)
        .preview_scale(cli.preview_scale);
    if let Some(ref path) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(path);
    }
    builder.build().context("Invalid configuration")
}

fn write_preview(cli: &Cli, session: &Session) -> Result<()> {
    let Some(ref path) = cli.preview else {
        return Ok(());
    };
    match session.preview() {
        Some(state) => {
            state
                .save_png(path)
                .context("Failed to write preview image")?;
            if !cli.quiet && !cli.json {
                eprintln!("   preview  →  {}", bold(&path.display().to_string()));
            }
        }
        None if !cli.quiet => eprintln!(
            "{}  no preview written to {}",
            cyan("⚠"),
            path.display()
        ),
        None => {}
    }
    Ok(())
}

async fn print_report(session: &Session, saved: Option<&std::path::Path>) -> Result<()> {
    let report = serde_json::json!({
        "session": session.snapshot().await,
        "saved_to": saved.map(|p| p.display().to_string()),
    });
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialise report")?
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_theme_and_defaults() {
        let cli = Cli::try_parse_from(["darkpdf", "--theme", "sepia", "doc.pdf"]).unwrap();
        assert!(matches!(cli.theme, ThemeArg::Sepia));
        assert_eq!(cli.timeout_ms, 60_000);
    }

    #[test]
    fn whole_document_is_always_converted() {
        assert!(Cli::try_parse_from(["darkpdf", "--pages", "1-5", "doc.pdf"]).is_err());
    }
}
