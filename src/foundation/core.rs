use crate::foundation::error::{RecipeError, RecipeResult};

pub use kurbo::{Affine, BezPath, Point, Rect, Vec2};

/// Grid position of a panel inside the figure layout.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize,
    serde::Deserialize,
)]
pub struct PanelPos {
    /// 0-based row, counted from the top.
    pub row: u32,
    /// 0-based column, counted from the left.
    pub col: u32,
}

impl PanelPos {
    /// Create a panel position.
    pub const fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// Document key for this position (`ax_{row}_{col}`).
    pub fn key(self) -> String {
        format!("ax_{}_{}", self.row, self.col)
    }

    /// Parse a document key produced by [`PanelPos::key`].
    pub fn parse_key(key: &str) -> RecipeResult<Self> {
        let bad = || RecipeError::validation(format!("invalid panel key '{key}'"));
        let rest = key.strip_prefix("ax_").ok_or_else(bad)?;
        let (r, c) = rest.split_once('_').ok_or_else(bad)?;
        let row = r.parse::<u32>().map_err(|_| bad())?;
        let col = c.parse::<u32>().map_err(|_| bad())?;
        Ok(Self { row, col })
    }
}

impl std::fmt::Display for PanelPos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ax_{}_{}", self.row, self.col)
    }
}

/// Opaque 8-bit RGB color.
///
/// Serialized as a `[r, g, b]` triple so identity maps stay compact in JSON.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "[u8; 3]", into = "[u8; 3]")]
pub struct Rgb8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Rgb8 {
    /// Create a color from channels.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Expand to an opaque RGBA color.
    pub const fn opaque(self) -> Rgba8 {
        Rgba8::new(self.r, self.g, self.b, 255)
    }
}

impl From<[u8; 3]> for Rgb8 {
    fn from(v: [u8; 3]) -> Self {
        Self::new(v[0], v[1], v[2])
    }
}

impl From<Rgb8> for [u8; 3] {
    fn from(c: Rgb8) -> Self {
        [c.r, c.g, c.b]
    }
}

/// Straight (non-premultiplied) 8-bit RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(from = "[u8; 4]", into = "[u8; 4]")]
pub struct Rgba8 {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl Rgba8 {
    /// Create a color from channels.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Drop the alpha channel.
    pub const fn rgb(self) -> Rgb8 {
        Rgb8::new(self.r, self.g, self.b)
    }

    /// Return the same color with alpha scaled by `alpha` (clamped to `[0, 1]`).
    pub fn with_alpha(self, alpha: f64) -> Self {
        let a = (alpha.clamp(0.0, 1.0) * 255.0).round() as u8;
        Self { a, ..self }
    }
}

impl From<[u8; 4]> for Rgba8 {
    fn from(v: [u8; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<Rgba8> for [u8; 4] {
    fn from(c: Rgba8) -> Self {
        [c.r, c.g, c.b, c.a]
    }
}

/// Raster dimensions in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RasterSize {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl RasterSize {
    /// Create a validated raster size (both dimensions non-zero and within `u16`).
    pub fn new(width: u32, height: u32) -> RecipeResult<Self> {
        if width == 0 || height == 0 {
            return Err(RecipeError::validation("raster size must be non-zero"));
        }
        if width > u32::from(u16::MAX) || height > u32::from(u16::MAX) {
            return Err(RecipeError::validation(format!(
                "raster size {width}x{height} exceeds {}",
                u16::MAX
            )));
        }
        Ok(Self { width, height })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
