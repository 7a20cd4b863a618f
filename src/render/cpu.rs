use std::collections::BTreeMap;

use crate::codec::value::Value;
use crate::foundation::core::{Affine, PanelPos, Point, RasterSize, Rect, Rgba8, Vec2};
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::recipe::model::{CropMode, FigureConfig, FinalizeSpec};
use crate::recipe::ops::Operation;
use crate::render::backend::{
    Appearance, ElementId, ElementInfo, ElementKind, Handle, LiveCanvas, Raster, RenderEngine,
};
use crate::render::color::parse_color;
use crate::render::draw::LegendSpec;

/// Version tag of the reference engine.
pub const ENGINE_VERSION: &str = concat!("figrecipe-cpu/", env!("CARGO_PKG_VERSION"));

// Subplot margins as figure fractions, and inter-panel spacing as a fraction of panel size.
const MARGIN_LEFT: f64 = 0.125;
const MARGIN_RIGHT: f64 = 0.9;
const MARGIN_BOTTOM: f64 = 0.11;
const MARGIN_TOP: f64 = 0.88;
const PANEL_SPACING: f64 = 0.2;
const AUTOSCALE_MARGIN: f64 = 0.05;
const TICK_LEN_PT: f64 = 3.5;
const DEFAULT_TICKS: u32 = 5;

/// Reference rendering engine: a retained scene rasterized with `vello_cpu`.
///
/// Text is drawn as one solid block per glyph, so output is independent of installed fonts.
#[derive(Clone, Copy, Debug, Default)]
pub struct CpuEngine;

impl RenderEngine for CpuEngine {
    fn engine_version(&self) -> &str {
        ENGINE_VERSION
    }

    fn new_canvas(&self, figure: &FigureConfig) -> RecipeResult<Box<dyn LiveCanvas>> {
        Ok(Box::new(CpuCanvas::new(figure)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Coord {
    Data,
    Axes,
    Device,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Space {
    pub(crate) x: Coord,
    pub(crate) y: Coord,
}

impl Space {
    pub(crate) const DATA: Space = Space {
        x: Coord::Data,
        y: Coord::Data,
    };
    pub(crate) const AXES: Space = Space {
        x: Coord::Axes,
        y: Coord::Axes,
    };
    pub(crate) const DEVICE: Space = Space {
        x: Coord::Device,
        y: Coord::Device,
    };
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Align {
    Start,
    Center,
    End,
}

impl Align {
    pub(crate) fn parse_h(s: &str) -> RecipeResult<Self> {
        match s {
            "left" => Ok(Self::Start),
            "center" | "centre" => Ok(Self::Center),
            "right" => Ok(Self::End),
            other => Err(RecipeError::engine(format!("invalid horizontal alignment '{other}'"))),
        }
    }

    pub(crate) fn parse_v(s: &str) -> RecipeResult<Self> {
        match s {
            "bottom" | "baseline" => Ok(Self::Start),
            "center" | "center_baseline" => Ok(Self::Center),
            "top" => Ok(Self::End),
            other => Err(RecipeError::engine(format!("invalid vertical alignment '{other}'"))),
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct TextShape {
    pub(crate) anchor: Point,
    pub(crate) offset_pt: Vec2,
    pub(crate) text: String,
    pub(crate) size_pt: f64,
    pub(crate) ha: Align,
    pub(crate) va: Align,
    pub(crate) vertical: bool,
}

#[derive(Clone, Debug)]
pub(crate) enum Shape {
    Polyline {
        points: Vec<Point>,
        offsets_pt: Vec<Vec2>,
    },
    Polygon {
        points: Vec<Point>,
    },
    Segments {
        segments: Vec<(Point, Point)>,
        offsets_pt: Vec<(Vec2, Vec2)>,
    },
    Markers {
        points: Vec<Point>,
        radius_pt: f64,
    },
    Text(TextShape),
    Cells {
        extent: Rect,
        rows: usize,
        cols: usize,
        colors: Vec<Rgba8>,
    },
    Frame,
    Ticks,
    Grid {
        x: bool,
        y: bool,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct Element {
    pub(crate) panel: usize,
    pub(crate) kind: ElementKind,
    pub(crate) handle: Option<Handle>,
    pub(crate) part: usize,
    pub(crate) selectable: bool,
    pub(crate) visible: bool,
    pub(crate) autoscale: bool,
    pub(crate) z: i8,
    pub(crate) space: Space,
    pub(crate) shape: Shape,
    pub(crate) appearance: Appearance,
}

impl Element {
    pub(crate) fn new(panel: usize, kind: ElementKind, space: Space, shape: Shape) -> Self {
        Self {
            panel,
            kind,
            handle: None,
            part: 0,
            selectable: true,
            visible: true,
            autoscale: space.x == Coord::Data || space.y == Coord::Data,
            z: 0,
            space,
            shape,
            appearance: Appearance {
                fill: None,
                stroke: None,
                line_width: 1.0,
            },
        }
    }

    pub(crate) fn stroke(mut self, color: Rgba8, width_pt: f64) -> Self {
        self.appearance.stroke = Some(color);
        self.appearance.line_width = width_pt;
        self
    }

    pub(crate) fn fill(mut self, color: Rgba8) -> Self {
        self.appearance.fill = Some(color);
        self
    }

    pub(crate) fn z(mut self, z: i8) -> Self {
        self.z = z;
        self
    }

    pub(crate) fn structural(mut self) -> Self {
        self.selectable = false;
        self.kind = ElementKind::Structural;
        self
    }

    /// Data-space points used for autoscaling.
    fn data_points(&self) -> Vec<Point> {
        match &self.shape {
            Shape::Polyline { points, .. }
            | Shape::Polygon { points }
            | Shape::Markers { points, .. } => points.clone(),
            Shape::Segments { segments, .. } => {
                segments.iter().flat_map(|(a, b)| [*a, *b]).collect()
            }
            Shape::Cells { extent, .. } => vec![extent.origin(), Point::new(extent.x1, extent.y1)],
            Shape::Text(_) | Shape::Frame | Shape::Ticks | Shape::Grid { .. } => Vec::new(),
        }
    }
}

/// Bar geometry retained for label placement, in data space.
#[derive(Clone, Copy, Debug)]
pub(crate) struct BarGeom {
    pub(crate) rect: Rect,
    pub(crate) value: f64,
    pub(crate) horizontal: bool,
}

#[derive(Clone, Debug)]
pub(crate) struct HandleEntry {
    pub(crate) op: Operation,
    pub(crate) panel: usize,
    pub(crate) parts: Vec<ElementId>,
    /// Legend entries as `(part index, label)`.
    pub(crate) legend: Vec<(usize, String)>,
    pub(crate) bars: Vec<BarGeom>,
}

#[derive(Clone, Debug)]
pub(crate) struct PanelState {
    pub(crate) pos: PanelPos,
    pub(crate) rect: Rect,
    /// Explicit `(lower, upper)` limits; a missing side autoscales.
    pub(crate) xlim: [Option<f64>; 2],
    pub(crate) ylim: [Option<f64>; 2],
    pub(crate) tight: bool,
    pub(crate) cycle: usize,
    pub(crate) tick_count: u32,
    pub(crate) title: Option<ElementId>,
    pub(crate) xlabel: Option<ElementId>,
    pub(crate) ylabel: Option<ElementId>,
    pub(crate) legend: Option<(Handle, LegendSpec)>,
    /// A labelled element was added after the legend was built.
    pub(crate) legend_stale: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Limits {
    pub(crate) x: (f64, f64),
    pub(crate) y: (f64, f64),
}

/// Live canvas of the reference engine.
pub struct CpuCanvas {
    pub(crate) figure: FigureConfig,
    pub(crate) size_dev: (f64, f64),
    background: Rgba8,
    pub(crate) panels: Vec<PanelState>,
    pub(crate) elements: Vec<Element>,
    pub(crate) handles: Vec<HandleEntry>,
    ctx: Option<vello_cpu::RenderContext>,
}

impl CpuCanvas {
    /// Lay out an empty canvas for `figure`.
    pub fn new(figure: &FigureConfig) -> RecipeResult<Self> {
        figure.validate()?;
        let w = figure.size[0] * figure.dpi;
        let h = figure.size[1] * figure.dpi;
        let background = parse_color(&figure.facecolor)?;

        let (rows, cols) = (figure.grid.rows, figure.grid.cols);
        let avail_w = (MARGIN_RIGHT - MARGIN_LEFT) * w;
        let avail_h = (MARGIN_TOP - MARGIN_BOTTOM) * h;
        let pw = avail_w / (f64::from(cols) + f64::from(cols - 1) * PANEL_SPACING);
        let ph = avail_h / (f64::from(rows) + f64::from(rows - 1) * PANEL_SPACING);

        let mut canvas = Self {
            figure: figure.clone(),
            size_dev: (w, h),
            background,
            panels: Vec::new(),
            elements: Vec::new(),
            handles: Vec::new(),
            ctx: None,
        };
        let frame_color = Rgba8::new(0, 0, 0, 255);
        for row in 0..rows {
            for col in 0..cols {
                let x0 = MARGIN_LEFT * w + f64::from(col) * pw * (1.0 + PANEL_SPACING);
                let y1 = MARGIN_TOP * h - f64::from(row) * ph * (1.0 + PANEL_SPACING);
                let index = canvas.panels.len();
                canvas.panels.push(PanelState {
                    pos: PanelPos::new(row, col),
                    rect: Rect::new(x0, y1 - ph, x0 + pw, y1),
                    xlim: [None, None],
                    ylim: [None, None],
                    tight: false,
                    cycle: 0,
                    tick_count: DEFAULT_TICKS,
                    title: None,
                    xlabel: None,
                    ylabel: None,
                    legend: None,
                    legend_stale: false,
                });
                canvas.push(
                    Element::new(index, ElementKind::Structural, Space::DEVICE, Shape::Frame)
                        .stroke(frame_color, 0.8)
                        .z(2)
                        .structural(),
                );
                canvas.push(
                    Element::new(index, ElementKind::Structural, Space::DEVICE, Shape::Ticks)
                        .stroke(frame_color, 0.8)
                        .z(2)
                        .structural(),
                );
            }
        }
        Ok(canvas)
    }

    pub(crate) fn pt_to_dev(&self, pt: f64) -> f64 {
        pt * self.figure.dpi / 72.0
    }

    pub(crate) fn push(&mut self, el: Element) -> ElementId {
        self.elements.push(el);
        ElementId((self.elements.len() - 1) as u64)
    }

    pub(crate) fn panel_index(&self, pos: PanelPos) -> RecipeResult<usize> {
        self.panels
            .iter()
            .position(|p| p.pos == pos)
            .ok_or_else(|| {
                RecipeError::engine(format!(
                    "panel {pos} is outside the {}x{} grid",
                    self.figure.grid.rows, self.figure.grid.cols
                ))
            })
    }

    /// Register elements under a new handle.
    pub(crate) fn finish_handle(
        &mut self,
        op: Operation,
        panel: usize,
        elements: Vec<Element>,
        legend: Vec<(usize, String)>,
        bars: Vec<BarGeom>,
    ) -> Handle {
        let handle = Handle(self.handles.len() as u64);
        if op != Operation::Legend && !legend.is_empty() {
            let state = &mut self.panels[panel];
            state.legend_stale |= state.legend.is_some();
        }
        let mut parts = Vec::with_capacity(elements.len());
        for (i, mut el) in elements.into_iter().enumerate() {
            el.handle = Some(handle);
            el.part = i;
            parts.push(self.push(el));
        }
        self.handles.push(HandleEntry {
            op,
            panel,
            parts,
            legend,
            bars,
        });
        handle
    }

    /// Next color from the panel's cycle.
    pub(crate) fn next_cycle_color(&mut self, panel: usize) -> Rgba8 {
        let p = &mut self.panels[panel];
        let c = crate::render::color::CYCLE[p.cycle % crate::render::color::CYCLE.len()];
        p.cycle += 1;
        c
    }

    pub(crate) fn limits(&self, panel: usize) -> Limits {
        let state = &self.panels[panel];
        let mut xr = (f64::INFINITY, f64::NEG_INFINITY);
        let mut yr = (f64::INFINITY, f64::NEG_INFINITY);
        for el in self
            .elements
            .iter()
            .filter(|e| e.panel == panel && e.visible && e.autoscale)
        {
            for p in el.data_points() {
                if el.space.x == Coord::Data && p.x.is_finite() {
                    xr = (xr.0.min(p.x), xr.1.max(p.x));
                }
                if el.space.y == Coord::Data && p.y.is_finite() {
                    yr = (yr.0.min(p.y), yr.1.max(p.y));
                }
            }
        }
        let settle = |r: (f64, f64), fixed: [Option<f64>; 2]| -> (f64, f64) {
            let auto = if !r.0.is_finite() {
                (0.0, 1.0)
            } else if r.0 == r.1 {
                (r.0 - 0.5, r.1 + 0.5)
            } else if state.tight {
                r
            } else {
                let m = (r.1 - r.0) * AUTOSCALE_MARGIN;
                (r.0 - m, r.1 + m)
            };
            let range = (fixed[0].unwrap_or(auto.0), fixed[1].unwrap_or(auto.1));
            if range.0 == range.1 {
                (range.0 - 0.5, range.1 + 0.5)
            } else {
                range
            }
        };
        Limits {
            x: settle(xr, state.xlim),
            y: settle(yr, state.ylim),
        }
    }

    fn to_device(&self, panel: usize, lim: &Limits, space: Space, p: Point) -> Point {
        let r = self.panels[panel].rect;
        let x = match space.x {
            Coord::Data => r.x0 + (p.x - lim.x.0) / (lim.x.1 - lim.x.0) * r.width(),
            Coord::Axes => r.x0 + p.x * r.width(),
            Coord::Device => p.x,
        };
        let y = match space.y {
            Coord::Data => r.y0 + (p.y - lim.y.0) / (lim.y.1 - lim.y.0) * r.height(),
            Coord::Axes => r.y0 + p.y * r.height(),
            Coord::Device => p.y,
        };
        Point::new(x, y)
    }

    fn ticks(&self, panel: usize, lim: &Limits) -> (Vec<f64>, Vec<f64>) {
        let n = self.panels[panel].tick_count;
        (nice_ticks(lim.x, n), nice_ticks(lim.y, n))
    }

    fn text_rects(&self, t: &TextShape, anchor: Point) -> Vec<Rect> {
        let size = self.pt_to_dev(t.size_pt);
        let adv = 0.6 * size;
        let gw = 0.5 * size;
        let gh = 0.7 * size;
        let n = t.text.chars().count() as f64;
        let along = |a: Align, total: f64| match a {
            Align::Start => 0.0,
            Align::Center => -total / 2.0,
            Align::End => -total,
        };
        let anchor = anchor + Vec2::new(self.pt_to_dev(t.offset_pt.x), self.pt_to_dev(t.offset_pt.y));
        t.text
            .chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .map(|(i, _)| {
                let step = i as f64 * adv + (adv - gw) / 2.0;
                if t.vertical {
                    let x0 = anchor.x + along(t.ha, gh);
                    let y0 = anchor.y + along(t.va, n * adv) + step;
                    Rect::new(x0, y0, x0 + gh, y0 + gw)
                } else {
                    let x0 = anchor.x + along(t.ha, n * adv) + step;
                    let y0 = anchor.y + along(t.va, gh);
                    Rect::new(x0, y0, x0 + gw, y0 + gh)
                }
            })
            .collect()
    }

    /// Device-space geometry of an element: stroked polylines, filled polygons, filled rects.
    fn device_geometry(&self, el: &Element, lim: &Limits) -> DeviceGeom {
        let dev = |p: Point| self.to_device(el.panel, lim, el.space, p);
        let mut g = DeviceGeom::default();
        match &el.shape {
            Shape::Polyline { points, offsets_pt } => {
                let pts = points
                    .iter()
                    .enumerate()
                    .map(|(i, p)| {
                        let off = offsets_pt.get(i).copied().unwrap_or(Vec2::ZERO);
                        dev(*p) + Vec2::new(self.pt_to_dev(off.x), self.pt_to_dev(off.y))
                    })
                    .collect();
                g.lines.push(pts);
            }
            Shape::Polygon { points } => {
                g.polygons.push(points.iter().map(|p| dev(*p)).collect());
            }
            Shape::Segments {
                segments,
                offsets_pt,
            } => {
                for (i, (a, b)) in segments.iter().enumerate() {
                    let (oa, ob) = offsets_pt.get(i).copied().unwrap_or((Vec2::ZERO, Vec2::ZERO));
                    g.lines.push(vec![
                        dev(*a) + Vec2::new(self.pt_to_dev(oa.x), self.pt_to_dev(oa.y)),
                        dev(*b) + Vec2::new(self.pt_to_dev(ob.x), self.pt_to_dev(ob.y)),
                    ]);
                }
            }
            Shape::Markers { points, radius_pt } => {
                let r = self.pt_to_dev(*radius_pt);
                g.circles.extend(
                    points
                        .iter()
                        .filter(|p| p.x.is_finite() && p.y.is_finite())
                        .map(|p| (dev(*p), r)),
                );
            }
            Shape::Text(t) => {
                g.rects = self.text_rects(t, dev(t.anchor));
            }
            Shape::Cells {
                extent,
                rows,
                cols,
                colors,
            } => {
                let cw = extent.width() / *cols as f64;
                let ch = extent.height() / *rows as f64;
                for r in 0..*rows {
                    for c in 0..*cols {
                        // Row 0 is the top row of the image.
                        let y_top = extent.y1 - r as f64 * ch;
                        let a = dev(Point::new(extent.x0 + c as f64 * cw, y_top - ch));
                        let b = dev(Point::new(extent.x0 + (c + 1) as f64 * cw, y_top));
                        g.cells.push((Rect::from_points(a, b), colors[r * cols + c]));
                    }
                }
            }
            Shape::Frame => {
                let r = self.panels[el.panel].rect;
                g.lines.push(vec![
                    Point::new(r.x0, r.y0),
                    Point::new(r.x1, r.y0),
                    Point::new(r.x1, r.y1),
                    Point::new(r.x0, r.y1),
                    Point::new(r.x0, r.y0),
                ]);
            }
            Shape::Ticks => {
                let (xt, yt) = self.ticks(el.panel, lim);
                let len = self.pt_to_dev(TICK_LEN_PT);
                let r = self.panels[el.panel].rect;
                for x in xt {
                    let d = self.to_device(el.panel, lim, Space::DATA, Point::new(x, lim.y.0));
                    g.lines.push(vec![Point::new(d.x, r.y0), Point::new(d.x, r.y0 - len)]);
                }
                for y in yt {
                    let d = self.to_device(el.panel, lim, Space::DATA, Point::new(lim.x.0, y));
                    g.lines.push(vec![Point::new(r.x0, d.y), Point::new(r.x0 - len, d.y)]);
                }
            }
            Shape::Grid { x, y } => {
                let (xt, yt) = self.ticks(el.panel, lim);
                let r = self.panels[el.panel].rect;
                if *x {
                    for t in xt {
                        let d = self.to_device(el.panel, lim, Space::DATA, Point::new(t, lim.y.0));
                        g.lines.push(vec![Point::new(d.x, r.y0), Point::new(d.x, r.y1)]);
                    }
                }
                if *y {
                    for t in yt {
                        let d = self.to_device(el.panel, lim, Space::DATA, Point::new(lim.x.0, t));
                        g.lines.push(vec![Point::new(r.x0, d.y), Point::new(r.x1, d.y)]);
                    }
                }
            }
        }
        g
    }

    fn paint(&self, ctx: &mut vello_cpu::RenderContext, el: &Element, lim: &Limits) {
        let g = self.device_geometry(el, lim);
        let app = el.appearance;
        let half = self.pt_to_dev(app.line_width) / 2.0;

        if let Some(fill) = app.fill {
            set_paint(ctx, fill);
            for poly in g.polygons.iter().filter(|p| p.len() >= 3) {
                ctx.fill_path(&polygon_path(poly));
            }
            for r in &g.rects {
                ctx.fill_rect(&cpu_rect(*r));
            }
        }
        for (r, c) in &g.cells {
            set_paint(ctx, app.fill.unwrap_or(*c));
            ctx.fill_rect(&cpu_rect(*r));
        }
        if let Some(marker) = app.fill.or(app.stroke) {
            set_paint(ctx, marker);
            for (c, r) in &g.circles {
                let circle = vello_cpu::kurbo::Circle::new(cpu_point(*c), *r);
                ctx.fill_path(&vello_cpu::kurbo::Shape::to_path(&circle, 0.1));
            }
        }
        if let Some(stroke) = app.stroke {
            if half > 0.0 {
                set_paint(ctx, stroke);
                for line in &g.lines {
                    ctx.fill_path(&stroke_path(line, half));
                }
                for poly in &g.polygons {
                    let mut closed = poly.clone();
                    if let Some(first) = poly.first() {
                        closed.push(*first);
                    }
                    ctx.fill_path(&stroke_path(&closed, half));
                }
            }
        }
    }

    fn extent_of(&self, el: &Element) -> Option<Rect> {
        let lim = self.limits(el.panel);
        let g = self.device_geometry(el, &lim);
        let half = if el.appearance.stroke.is_some() {
            self.pt_to_dev(el.appearance.line_width) / 2.0
        } else {
            0.0
        };
        let mut out: Option<Rect> = None;
        let mut add = |r: Rect| {
            if r.x0.is_finite() && r.y0.is_finite() && r.x1.is_finite() && r.y1.is_finite() {
                out = Some(out.map_or(r, |o| o.union(r)));
            }
        };
        for pts in g.lines.iter().chain(g.polygons.iter()) {
            if let Some(b) = bounds(pts) {
                add(b.inflate(half, half));
            }
        }
        for (c, r) in &g.circles {
            add(Rect::new(c.x - r, c.y - r, c.x + r, c.y + r));
        }
        for r in g.rects.iter().chain(g.cells.iter().map(|(r, _)| r)) {
            add(*r);
        }
        out
    }

    fn element_ref(&self, id: ElementId) -> RecipeResult<&Element> {
        self.elements
            .get(id.0 as usize)
            .ok_or_else(|| RecipeError::engine(format!("no element {}", id.0)))
    }

    /// Indices of visible elements in paint order.
    ///
    /// Sorted by layer, then panel; within a panel, call elements paint below decoration
    /// elements and each group keeps call order. The order depends only on the relative order
    /// of calls and of decorations, never on how the two were interleaved.
    pub(crate) fn paint_order(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.elements.len())
            .filter(|i| self.elements[*i].visible)
            .collect();
        order.sort_by_key(|i| {
            let el = &self.elements[*i];
            let decoration = el
                .handle
                .and_then(|h| self.handles.get(h.0 as usize))
                .is_some_and(|h| h.op.is_decoration());
            (el.z, el.panel, decoration, el.handle.map(|h| h.0))
        });
        order
    }

    /// Hide an element superseded by a later call (for example a second `set_title`).
    pub(crate) fn hide(&mut self, id: ElementId) {
        if let Some(el) = self.elements.get_mut(id.0 as usize) {
            el.visible = false;
        }
    }

    fn render_impl(&mut self, size: RasterSize) -> RecipeResult<Raster> {
        let w: u16 = size
            .width
            .try_into()
            .map_err(|_| RecipeError::engine("raster width exceeds u16"))?;
        let h: u16 = size
            .height
            .try_into()
            .map_err(|_| RecipeError::engine("raster height exceeds u16"))?;
        if w == 0 || h == 0 {
            return Err(RecipeError::engine("raster size must be non-zero"));
        }

        let dpi = self.figure.dpi;
        let tight = self.tight_bounding_box();
        let region = Rect::new(tight.x0 * dpi, tight.y0 * dpi, tight.x1 * dpi, tight.y1 * dpi);
        let sx = f64::from(w) / region.width();
        let sy = f64::from(h) / region.height();
        // Device space is y-up; raster space is y-down.
        let to_pixels = Affine::new([
            sx,
            0.0,
            0.0,
            -sy,
            -region.x0 * sx,
            f64::from(h) + region.y0 * sy,
        ]);
        let limits: Vec<Limits> = (0..self.panels.len()).map(|i| self.limits(i)).collect();

        let mut ctx = match self.ctx.take() {
            Some(ctx) if ctx.width() == w && ctx.height() == h => ctx,
            _ => vello_cpu::RenderContext::new(w, h),
        };
        ctx.reset();
        ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
        set_paint(&mut ctx, self.background);
        ctx.fill_rect(&vello_cpu::kurbo::Rect::new(0.0, 0.0, f64::from(w), f64::from(h)));
        ctx.set_transform(vello_cpu::kurbo::Affine::new(to_pixels.as_coeffs()));
        for i in self.paint_order() {
            let el = &self.elements[i];
            self.paint(&mut ctx, el, &limits[el.panel]);
        }
        ctx.flush();
        let mut pixmap = vello_cpu::Pixmap::new(w, h);
        ctx.render_to_pixmap(&mut pixmap);
        self.ctx = Some(ctx);

        let mut data = pixmap.data_as_u8_slice().to_vec();
        unpremultiply_in_place(&mut data);
        Ok(Raster {
            width: size.width,
            height: size.height,
            data,
        })
    }
}

#[derive(Default)]
struct DeviceGeom {
    lines: Vec<Vec<Point>>,
    polygons: Vec<Vec<Point>>,
    circles: Vec<(Point, f64)>,
    rects: Vec<Rect>,
    cells: Vec<(Rect, Rgba8)>,
}

fn bounds(pts: &[Point]) -> Option<Rect> {
    let mut it = pts.iter().filter(|p| p.x.is_finite() && p.y.is_finite());
    let first = it.next()?;
    Some(it.fold(Rect::from_points(*first, *first), |r, p| r.union_pt(*p)))
}

/// Tick positions at 1/2/5 multiples of a power of ten inside `range`.
pub(crate) fn nice_ticks(range: (f64, f64), count: u32) -> Vec<f64> {
    let (lo, hi) = (range.0.min(range.1), range.0.max(range.1));
    let span = hi - lo;
    if !(span > 0.0) || count < 2 {
        return Vec::new();
    }
    let raw = span / f64::from(count - 1);
    let mag = 10f64.powf(raw.log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .into_iter()
        .map(|m| m * mag)
        .find(|s| *s >= raw)
        .unwrap_or(10.0 * mag);
    let mut t = (lo / step).ceil() * step;
    let mut out = Vec::new();
    while t <= hi + step * 1e-9 && out.len() < 64 {
        out.push(t);
        t += step;
    }
    out
}

fn cpu_point(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn cpu_rect(r: Rect) -> vello_cpu::kurbo::Rect {
    vello_cpu::kurbo::Rect::new(r.x0, r.y0, r.x1, r.y1)
}

fn set_paint(ctx: &mut vello_cpu::RenderContext, c: Rgba8) {
    ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a));
}

fn polygon_path(points: &[Point]) -> vello_cpu::kurbo::BezPath {
    let mut path = vello_cpu::kurbo::BezPath::new();
    let mut pts = points.iter().filter(|p| p.x.is_finite() && p.y.is_finite());
    if let Some(first) = pts.next() {
        path.move_to(cpu_point(*first));
        for p in pts {
            path.line_to(cpu_point(*p));
        }
        path.close_path();
    }
    path
}

/// Outline of a polyline of half-width `half` as one quad per segment plus a square per joint.
///
/// Every sub-path has the same winding, so the non-zero fill rule unions them.
fn stroke_path(points: &[Point], half: f64) -> vello_cpu::kurbo::BezPath {
    let mut path = vello_cpu::kurbo::BezPath::new();
    let mut quad = |a: Point, b: Point, c: Point, d: Point| {
        path.move_to(cpu_point(a));
        path.line_to(cpu_point(b));
        path.line_to(cpu_point(c));
        path.line_to(cpu_point(d));
        path.close_path();
    };
    let finite = |p: &Point| p.x.is_finite() && p.y.is_finite();
    for pair in points.windows(2) {
        let (p0, p1) = (pair[0], pair[1]);
        if !finite(&p0) || !finite(&p1) {
            continue;
        }
        let d = p1 - p0;
        let len = d.hypot();
        if len == 0.0 {
            continue;
        }
        let n = Vec2::new(-d.y, d.x) * (half / len);
        quad(p0 + n, p1 + n, p1 - n, p0 - n);
    }
    if points.len() > 2 {
        for p in points[1..points.len() - 1].iter().filter(|p| finite(p)) {
            quad(
                Point::new(p.x - half, p.y + half),
                Point::new(p.x + half, p.y + half),
                Point::new(p.x + half, p.y - half),
                Point::new(p.x - half, p.y - half),
            );
        }
    }
    path
}

fn unpremultiply_in_place(rgba: &mut [u8]) {
    for px in rgba.chunks_exact_mut(4) {
        let a = u16::from(px[3]);
        if a == 0 || a == 255 {
            continue;
        }
        for c in &mut px[..3] {
            *c = ((u16::from(*c) * 255 + a / 2) / a).min(255) as u8;
        }
    }
}

impl LiveCanvas for CpuCanvas {
    fn engine_version(&self) -> &str {
        ENGINE_VERSION
    }

    fn invoke(
        &mut self,
        op: Operation,
        panel: PanelPos,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> RecipeResult<Handle> {
        let panel = self.panel_index(panel)?;
        self.dispatch(op, panel, args, kwargs)
    }

    #[tracing::instrument(skip(self))]
    fn render(&mut self, size: RasterSize) -> RecipeResult<Raster> {
        self.render_impl(size)
    }

    fn native_size(&self) -> RasterSize {
        let tight = self.tight_bounding_box();
        RasterSize {
            width: (tight.width() * self.figure.dpi).round().max(1.0) as u32,
            height: (tight.height() * self.figure.dpi).round().max(1.0) as u32,
        }
    }

    fn tight_bounding_box(&self) -> Rect {
        let full = Rect::new(0.0, 0.0, self.figure.size[0], self.figure.size[1]);
        if self.figure.crop == CropMode::Full {
            return full;
        }
        let dpi = self.figure.dpi;
        self.elements
            .iter()
            .filter(|e| e.visible)
            .filter_map(|e| self.extent_of(e))
            .reduce(|a, b| a.union(b))
            .map(|r| {
                let pad = self.figure.pad_inches;
                Rect::new(r.x0 / dpi, r.y0 / dpi, r.x1 / dpi, r.y1 / dpi).inflate(pad, pad)
            })
            .unwrap_or(full)
    }

    fn device_to_physical_unit_ratio(&self) -> f64 {
        self.figure.dpi
    }

    fn finalize(&mut self, spec: &FinalizeSpec) -> RecipeResult<()> {
        if let Some(n) = spec.tick_count {
            if n < 2 {
                return Err(RecipeError::engine("tick_count must be at least 2"));
            }
            for p in &mut self.panels {
                p.tick_count = n;
            }
        }
        for h in &self.handles {
            let width = match h.op {
                Operation::Legend => spec.legend_frame_width,
                op => spec.line_widths.get(op.name()).copied(),
            };
            let Some(width) = width else { continue };
            for id in &h.parts {
                let el = &mut self.elements[id.0 as usize];
                let is_frame = el.kind == ElementKind::Legend;
                if el.appearance.stroke.is_some() && (h.op != Operation::Legend || is_frame) {
                    el.appearance.line_width = width;
                }
            }
        }
        Ok(())
    }

    fn settle(&mut self) -> RecipeResult<()> {
        self.refresh_legends();
        Ok(())
    }

    fn elements(&self) -> Vec<ElementInfo> {
        self.paint_order()
            .into_iter()
            .map(|i| info(ElementId(i as u64), &self.elements[i]))
            .collect()
    }

    fn element(&self, id: ElementId) -> Option<ElementInfo> {
        self.elements.get(id.0 as usize).map(|e| info(id, e))
    }

    fn handle_parts(&self, handle: Handle) -> Vec<ElementId> {
        self.handles
            .get(handle.0 as usize)
            .map(|h| h.parts.clone())
            .unwrap_or_default()
    }

    fn appearance(&self, id: ElementId) -> RecipeResult<Appearance> {
        Ok(self.element_ref(id)?.appearance)
    }

    fn set_appearance(&mut self, id: ElementId, appearance: Appearance) -> RecipeResult<()> {
        let el = self
            .elements
            .get_mut(id.0 as usize)
            .ok_or_else(|| RecipeError::engine(format!("no element {}", id.0)))?;
        el.appearance = appearance;
        Ok(())
    }

    fn background(&self) -> Rgba8 {
        self.background
    }

    fn set_background(&mut self, color: Rgba8) {
        self.background = color;
    }

    fn element_extent(&self, id: ElementId) -> Option<Rect> {
        let el = self.elements.get(id.0 as usize).filter(|e| e.visible)?;
        self.extent_of(el)
    }

    fn element_path(&self, id: ElementId) -> Option<Vec<Point>> {
        let el = self.elements.get(id.0 as usize).filter(|e| e.visible)?;
        if !matches!(el.shape, Shape::Polyline { .. } | Shape::Markers { .. }) {
            return None;
        }
        let lim = self.limits(el.panel);
        let g = self.device_geometry(el, &lim);
        let mut pts: Vec<Point> = g.lines.into_iter().flatten().collect();
        pts.extend(g.circles.into_iter().map(|(c, _)| c));
        Some(pts)
    }
}

fn info(id: ElementId, e: &Element) -> ElementInfo {
    ElementInfo {
        id,
        panel_index: e.panel,
        kind: e.kind,
        handle: e.handle,
        part: e.part,
        selectable: e.selectable,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/cpu.rs"]
mod tests;
