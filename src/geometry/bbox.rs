use indexmap::IndexMap;
use serde::Serialize;

use crate::foundation::core::{Point, RasterSize, Rect};
use crate::identity::hitmap::selectable_elements;
use crate::live::LiveFigure;
use crate::render::backend::{ElementId, ElementKind, LiveCanvas};

/// Maximum number of path points attached to a line-like record.
pub const MAX_PATH_POINTS: usize = 100;

/// Device units (bottom-left origin) to raster pixels (top-left origin).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PixelTransform {
    ratio: f64,
    origin: Point,
    scale_x: f64,
    scale_y: f64,
    size: RasterSize,
}

impl PixelTransform {
    /// Transform for a canvas whose exported region is `tight` (inches), with `ratio` device
    /// units per inch, rasterized at `size`.
    pub fn new(ratio: f64, tight: Rect, size: RasterSize) -> Self {
        Self {
            ratio,
            origin: tight.origin(),
            scale_x: f64::from(size.width) / tight.width(),
            scale_y: f64::from(size.height) / tight.height(),
            size,
        }
    }

    /// Transform matching `canvas` rendered at `size`.
    pub fn for_canvas(canvas: &dyn LiveCanvas, size: RasterSize) -> Self {
        Self::new(
            canvas.device_to_physical_unit_ratio(),
            canvas.tight_bounding_box(),
            size,
        )
    }

    /// Map a device point to pixels, clamped to the raster.
    pub fn map_point(&self, p: Point) -> Point {
        let x = (p.x / self.ratio - self.origin.x) * self.scale_x;
        let y = (p.y / self.ratio - self.origin.y) * self.scale_y;
        let (w, h) = (f64::from(self.size.width), f64::from(self.size.height));
        Point::new(x.clamp(0.0, w), (h - y).clamp(0.0, h))
    }

    /// Map a device rectangle to pixels. `None` when nothing of it is left after clamping.
    pub fn map_rect(&self, r: Rect) -> Option<Rect> {
        let out = Rect::from_points(
            self.map_point(Point::new(r.x0, r.y0)),
            self.map_point(Point::new(r.x1, r.y1)),
        );
        (out.width() > 0.0 && out.height() > 0.0).then_some(out)
    }
}

/// Pixel-space box of one element, plus sampled points for thin geometry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct BBoxRecord {
    /// Left edge.
    pub x: f64,
    /// Top edge.
    pub y: f64,
    /// Width.
    pub width: f64,
    /// Height.
    pub height: f64,
    /// Visual category.
    pub element_type: ElementKind,
    /// Panel index in creation order.
    pub panel_index: usize,
    /// Owning call id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Sampled path points, line-like elements only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<Vec<[f64; 2]>>,
}

/// Map one element into the pixel space of a `size` raster of `canvas`.
///
/// Returns `None` for unknown or hidden elements and for boxes that collapse after clamping.
pub fn map_to_pixel_space(
    canvas: &dyn LiveCanvas,
    element: ElementId,
    size: RasterSize,
) -> Option<BBoxRecord> {
    map_with(canvas, &PixelTransform::for_canvas(canvas, size), element)
}

fn map_with(canvas: &dyn LiveCanvas, tf: &PixelTransform, element: ElementId) -> Option<BBoxRecord> {
    let info = canvas.element(element)?;
    let r = tf.map_rect(canvas.element_extent(element)?)?;
    let points = matches!(info.kind, ElementKind::Line | ElementKind::Markers)
        .then(|| canvas.element_path(element))
        .flatten()
        .map(|pts| pixel_path(tf, &pts));
    Some(BBoxRecord {
        x: r.x0,
        y: r.y0,
        width: r.width(),
        height: r.height(),
        element_type: info.kind,
        panel_index: info.panel_index,
        call_id: None,
        points,
    })
}

/// Finite points of a device path, downsampled and mapped to pixels.
fn pixel_path(tf: &PixelTransform, pts: &[Point]) -> Vec<[f64; 2]> {
    let finite: Vec<Point> = pts
        .iter()
        .copied()
        .filter(|p| p.x.is_finite() && p.y.is_finite())
        .collect();
    downsample(&finite, MAX_PATH_POINTS)
        .into_iter()
        .map(|p| {
            let q = tf.map_point(p);
            [q.x, q.y]
        })
        .collect()
}

/// Every `step`-th point so that at most `max` remain; the last point is always kept.
fn downsample(pts: &[Point], max: usize) -> Vec<Point> {
    if pts.len() <= max {
        return pts.to_vec();
    }
    if max < 2 {
        return pts.iter().take(max).copied().collect();
    }
    let step = pts.len().div_ceil(max - 1);
    let mut out: Vec<Point> = pts.iter().step_by(step).copied().collect();
    if let Some(last) = pts.last()
        && out.last() != Some(last)
    {
        out.push(*last);
    }
    out.truncate(max);
    out
}

/// Pixel boxes of every selectable element, keyed like the identity map.
pub fn bbox_map(figure: &LiveFigure, size: RasterSize) -> IndexMap<String, BBoxRecord> {
    let canvas = figure.canvas();
    let tf = PixelTransform::for_canvas(canvas, size);
    selectable_elements(canvas, figure.index())
        .into_iter()
        .filter_map(|s| {
            let mut record = map_with(canvas, &tf, s.info.id)?;
            record.call_id = s.call_id;
            Some((s.key.to_string(), record))
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/geometry/bbox.rs"]
mod tests;
