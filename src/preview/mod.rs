//! Local preview of page 1, independent of the conversion request.
//!
//! ```text
//! Selection ──► PreviewRenderer ──spawn_blocking──► PageRasterizer (pdfium)
//!                    │                                     │
//!                    │ ◄──────── RgbaImage (generation) ───┘
//!                    ▼
//!               PreviewState { raster, ThemeFilter overlay }
//! ```
//!
//! The raster is produced once per selection. Theme changes only swap the
//! overlay filter.

pub mod filter;
pub mod render;
pub mod renderer;
pub mod state;

pub use filter::{FilterOp, ThemeFilter};
pub use render::{bind_pdfium, viewport_size, PageRasterizer, PdfiumRasterizer};
pub use renderer::PreviewRenderer;
pub use state::PreviewState;
