//! Rasterisation against the real pdfium library.
//!
//! Gated behind `DARKPDF_PDFIUM_TESTS` because it needs libpdfium on the
//! machine. Run with:
//!   DARKPDF_PDFIUM_TESTS=1 PDFIUM_LIB_PATH=/path/to/lib cargo test --test pdfium -- --nocapture

use darkpdf::{PageRasterizer, PdfiumRasterizer, PreviewError};
use std::path::PathBuf;

/// Skip this test unless DARKPDF_PDFIUM_TESTS is set.
macro_rules! pdfium_skip_unless_ready {
    () => {{
        if std::env::var("DARKPDF_PDFIUM_TESTS").is_err() {
            println!("SKIP: set DARKPDF_PDFIUM_TESTS=1 to run pdfium tests");
            return;
        }
        PdfiumRasterizer::new(std::env::var("PDFIUM_LIB_PATH").ok().map(PathBuf::from))
    }};
}

/// A one-page PDF of `width` x `height` points with a correct xref table.
fn one_page_pdf(width: u32, height: u32) -> Vec<u8> {
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        format!("<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {width} {height}] >>"),
    ];

    let mut pdf = b"%PDF-1.4\n".to_vec();
    let mut offsets = Vec::new();
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }

    let xref_at = pdf.len();
    pdf.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    pdf.extend_from_slice(b"0000000000 65535 f \n");
    for offset in offsets {
        pdf.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
    }
    pdf.extend_from_slice(
        format!(
            "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_at
        )
        .as_bytes(),
    );
    pdf
}

#[test]
fn renders_first_page_at_one_and_a_half() {
    let rasterizer = pdfium_skip_unless_ready!();
    let image = rasterizer
        .rasterize_first_page(&one_page_pdf(200, 100), 1.5)
        .expect("render page 1");
    assert_eq!(image.dimensions(), (300, 150));
}

#[test]
fn garbage_payload_yields_no_preview() {
    let rasterizer = pdfium_skip_unless_ready!();
    let err = rasterizer
        .rasterize_first_page(b"%PDF-1.7 but nothing else", 1.5)
        .unwrap_err();
    assert!(
        matches!(err, PreviewError::Decode(_) | PreviewError::NoPages),
        "got {err:?}"
    );
}
