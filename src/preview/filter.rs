//! Theme filters: the cosmetic colour treatment laid over the preview.
//!
//! A [`ThemeFilter`] is an ordered chain of [`FilterOp`]s with the same
//! semantics as the CSS `filter` property, so `Display` yields an
//! expression such as `invert(1) hue-rotate(180deg)`. Applying a filter
//! always produces a new image; the rasterised page is never touched.

use crate::config::Theme;
use image::{Rgba, RgbaImage};
use std::fmt;

/// One filter primitive. Amounts are fractions (`1` = 100 %), hue rotation
/// is in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOp {
    Invert(f32),
    HueRotate(f32),
    Brightness(f32),
    Contrast(f32),
    Sepia(f32),
}

impl FilterOp {
    fn apply(self, rgb: [f32; 3]) -> [f32; 3] {
        let out = match self {
            FilterOp::Invert(a) => rgb.map(|c| a + c * (1.0 - 2.0 * a)),
            FilterOp::Brightness(b) => rgb.map(|c| c * b),
            FilterOp::Contrast(k) => rgb.map(|c| k * c + 0.5 - 0.5 * k),
            FilterOp::HueRotate(deg) => mul(&hue_rotate_matrix(deg), rgb),
            FilterOp::Sepia(a) => mul(&sepia_matrix(a), rgb),
        };
        out.map(|c| c.clamp(0.0, 1.0))
    }
}

impl fmt::Display for FilterOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterOp::Invert(a) => write!(f, "invert({a})"),
            FilterOp::HueRotate(d) => write!(f, "hue-rotate({d}deg)"),
            FilterOp::Brightness(b) => write!(f, "brightness({b})"),
            FilterOp::Contrast(c) => write!(f, "contrast({c})"),
            FilterOp::Sepia(a) => write!(f, "sepia({a})"),
        }
    }
}

type Matrix = [[f32; 3]; 3];

fn mul(m: &Matrix, v: [f32; 3]) -> [f32; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

fn hue_rotate_matrix(deg: f32) -> Matrix {
    let (sin, cos) = deg.to_radians().sin_cos();
    [
        [
            0.213 + cos * 0.787 - sin * 0.213,
            0.715 - cos * 0.715 - sin * 0.715,
            0.072 - cos * 0.072 + sin * 0.928,
        ],
        [
            0.213 - cos * 0.213 + sin * 0.143,
            0.715 + cos * 0.285 + sin * 0.140,
            0.072 - cos * 0.072 - sin * 0.283,
        ],
        [
            0.213 - cos * 0.213 - sin * 0.787,
            0.715 - cos * 0.715 + sin * 0.715,
            0.072 + cos * 0.928 + sin * 0.072,
        ],
    ]
}

fn sepia_matrix(amount: f32) -> Matrix {
    let r = 1.0 - amount.clamp(0.0, 1.0);
    [
        [0.393 + 0.607 * r, 0.769 - 0.769 * r, 0.189 - 0.189 * r],
        [0.349 - 0.349 * r, 0.686 + 0.314 * r, 0.168 - 0.168 * r],
        [0.272 - 0.272 * r, 0.534 - 0.534 * r, 0.131 + 0.869 * r],
    ]
}

/// An ordered chain of filter primitives. The empty chain is the identity.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ThemeFilter {
    ops: Vec<FilterOp>,
}

impl ThemeFilter {
    pub fn identity() -> Self {
        Self::default()
    }

    /// The filter for a theme. Total: `None` maps to the identity.
    pub fn for_theme(theme: Option<Theme>) -> Self {
        use FilterOp::*;
        let ops = match theme {
            Some(Theme::PureBlack) => vec![
                Invert(1.0),
                HueRotate(180.0),
                Brightness(0.8),
                Contrast(1.2),
            ],
            Some(Theme::DarkGray) => vec![Invert(0.9), HueRotate(180.0), Brightness(0.7)],
            Some(Theme::Sepia) => vec![
                Invert(0.9),
                Sepia(0.6),
                HueRotate(10.0),
                Brightness(0.8),
            ],
            None => Vec::new(),
        };
        Self { ops }
    }

    /// Filter for a theme identifier; unrecognised names map to the identity.
    pub fn for_name(name: &str) -> Self {
        Self::for_theme(Theme::parse_lenient(name))
    }

    pub fn ops(&self) -> &[FilterOp] {
        &self.ops
    }

    pub fn is_identity(&self) -> bool {
        self.ops.is_empty()
    }

    /// Filter one pixel. Alpha passes through unchanged.
    pub fn apply_pixel(&self, px: Rgba<u8>) -> Rgba<u8> {
        if self.ops.is_empty() {
            return px;
        }
        let [r, g, b, a] = px.0;
        let mut rgb = [r, g, b].map(|c| c as f32 / 255.0);
        for op in &self.ops {
            rgb = op.apply(rgb);
        }
        let [r, g, b] = rgb.map(|c| (c * 255.0).round() as u8);
        Rgba([r, g, b, a])
    }

    /// Return a filtered copy of `src`.
    pub fn apply(&self, src: &RgbaImage) -> RgbaImage {
        let mut out = src.clone();
        if !self.ops.is_empty() {
            for px in out.pixels_mut() {
                *px = self.apply_pixel(*px);
            }
        }
        out
    }
}

impl fmt::Display for ThemeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ops.is_empty() {
            return f.write_str("none");
        }
        for (i, op) in self.ops.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{op}")?;
        }
        Ok(())
    }
}
