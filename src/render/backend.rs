use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;

use crate::codec::value::Value;
use crate::foundation::core::{PanelPos, Point, RasterSize, Rect, Rgba8};
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::recipe::model::{FigureConfig, FinalizeSpec};
use crate::recipe::ops::Operation;

/// Result token returned by [`LiveCanvas::invoke`].
///
/// Handles are only meaningful for the canvas that issued them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle(pub u64);

/// Identifier of one visual element held by a canvas.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ElementId(pub u64);

/// A rendered raster as straight RGBA8 pixels, row-major, top-left origin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Raster {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// RGBA8 bytes, tightly packed.
    pub data: Vec<u8>,
}

impl Raster {
    /// RGBA of pixel `(x, y)`, or `None` outside the raster.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let i = ((y as usize) * (self.width as usize) + (x as usize)) * 4;
        Some([
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ])
    }

    /// Raster dimensions.
    pub fn size(&self) -> RasterSize {
        RasterSize {
            width: self.width,
            height: self.height,
        }
    }

    /// Encode as PNG.
    pub fn to_png(&self) -> RecipeResult<Vec<u8>> {
        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| RecipeError::validation("raster data does not match its dimensions"))?;
        let mut buf = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .context("encode png")?;
        Ok(buf)
    }

    /// Write as a PNG file.
    pub fn save_png(&self, path: &Path) -> RecipeResult<()> {
        std::fs::write(path, self.to_png()?)
            .with_context(|| format!("write png '{}'", path.display()))?;
        Ok(())
    }

    /// Decode an image file's bytes into straight RGBA8.
    pub fn from_png(bytes: &[u8]) -> RecipeResult<Self> {
        let img = image::load_from_memory(bytes)
            .context("decode image from memory")?
            .to_rgba8();
        Ok(Self {
            width: img.width(),
            height: img.height(),
            data: img.into_raw(),
        })
    }

    /// Read a PNG file.
    pub fn load_png(path: &Path) -> RecipeResult<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("read image '{}'", path.display()))?;
        Self::from_png(&bytes)
    }
}

/// Visual category of an element.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    /// Polyline (plot, step, reference lines, whiskers).
    Line,
    /// Marker collection (scatter).
    Markers,
    /// Rectangle patch (bar, histogram bin, box body).
    Patch,
    /// Pie wedge.
    Wedge,
    /// Filled region (fill_between, stack layer, violin body).
    Fill,
    /// Raster image cell grid.
    Image,
    /// Free text (titles, labels, annotations).
    Text,
    /// Legend frame.
    Legend,
    /// Axes frame, tick marks and grid lines.
    Structural,
}

/// Read-only description of one element, as reported by the canvas.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementInfo {
    /// Element identifier.
    pub id: ElementId,
    /// Index of the owning panel in creation order.
    pub panel_index: usize,
    /// Visual category.
    pub kind: ElementKind,
    /// Handle of the call that produced the element; `None` for canvas furniture.
    pub handle: Option<Handle>,
    /// Part index under `handle`.
    pub part: usize,
    /// `false` for structural elements that must never receive an identity.
    pub selectable: bool,
}

/// Mutable appearance of an element.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Appearance {
    /// Fill color, if the element is filled.
    pub fill: Option<Rgba8>,
    /// Stroke color, if the element is stroked.
    pub stroke: Option<Rgba8>,
    /// Stroke width in points.
    pub line_width: f64,
}

/// A mutable rendering surface, driven by recorded operations.
///
/// Coordinates returned by [`LiveCanvas::element_extent`] and [`LiveCanvas::element_path`]
/// are device units (pixels at the figure's native resolution) with a bottom-left origin.
pub trait LiveCanvas {
    /// Version tag of the engine that owns this canvas.
    fn engine_version(&self) -> &str;

    /// Execute one drawing operation with native arguments.
    fn invoke(
        &mut self,
        op: Operation,
        panel: PanelPos,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> RecipeResult<Handle>;

    /// Bring derived elements (such as legends) up to date after a call and its
    /// post-processing.
    fn settle(&mut self) -> RecipeResult<()> {
        Ok(())
    }

    /// Rasterize the canvas at `size`.
    fn render(&mut self, size: RasterSize) -> RecipeResult<Raster>;

    /// Raster size at the figure's native resolution.
    fn native_size(&self) -> RasterSize;

    /// Tightest box enclosing the exported canvas, in inches.
    fn tight_bounding_box(&self) -> Rect;

    /// Device units per inch.
    fn device_to_physical_unit_ratio(&self) -> f64;

    /// Apply the figure-level finalization pass.
    fn finalize(&mut self, spec: &FinalizeSpec) -> RecipeResult<()>;

    /// All visible elements in paint order.
    fn elements(&self) -> Vec<ElementInfo>;

    /// One element, hidden ones included.
    fn element(&self, id: ElementId) -> Option<ElementInfo>;

    /// Elements produced by `handle`, in part order.
    fn handle_parts(&self, handle: Handle) -> Vec<ElementId>;

    /// Current appearance of an element.
    fn appearance(&self, id: ElementId) -> RecipeResult<Appearance>;

    /// Replace the appearance of an element.
    fn set_appearance(&mut self, id: ElementId, appearance: Appearance) -> RecipeResult<()>;

    /// Figure background color.
    fn background(&self) -> Rgba8;

    /// Replace the figure background color.
    fn set_background(&mut self, color: Rgba8);

    /// Extent of an element in device units.
    fn element_extent(&self, id: ElementId) -> Option<Rect>;

    /// Vertices of a path-like element in device units.
    fn element_path(&self, id: ElementId) -> Option<Vec<Point>>;
}

/// Factory for fresh canvases.
pub trait RenderEngine {
    /// Version tag recorded into recipes and compared on replay.
    fn engine_version(&self) -> &str;

    /// Create an empty canvas laid out for `figure`.
    fn new_canvas(&self, figure: &FigureConfig) -> RecipeResult<Box<dyn LiveCanvas>>;
}
