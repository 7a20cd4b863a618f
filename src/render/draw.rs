use std::collections::BTreeMap;
use std::fmt::Display;

use crate::codec::value::Value;
use crate::foundation::core::{Point, Rect, Rgba8, Vec2};
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::foundation::math::{gaussian_kde, quantile_sorted};
use crate::recipe::ops::Operation;
use crate::render::backend::{ElementId, ElementKind, Handle};
use crate::render::color::{CYCLE, color_from_value, colormap, colors_from_value};
use crate::render::cpu::{Align, BarGeom, Coord, CpuCanvas, Element, Shape, Space, TextShape};

type Kwargs = BTreeMap<String, Value>;

const BLACK: Rgba8 = Rgba8::new(0, 0, 0, 255);
const WHITE: Rgba8 = Rgba8::new(255, 255, 255, 255);
const DEFAULT_FONT_PT: f64 = 10.0;
const TITLE_FONT_PT: f64 = 12.0;

const PLOT_KW: &[&str] = &[
    "color", "c", "linewidth", "lw", "linestyle", "ls", "alpha", "label", "marker", "markersize",
    "ms",
];
const STEP_KW: &[&str] = &[
    "color", "c", "linewidth", "lw", "linestyle", "ls", "alpha", "label", "marker", "markersize",
    "ms", "where",
];
const SCATTER_KW: &[&str] = &["s", "c", "color", "alpha", "label", "marker"];
const BAR_KW: &[&str] = &[
    "width", "bottom", "align", "color", "edgecolor", "linewidth", "alpha", "label",
];
const BARH_KW: &[&str] = &[
    "height", "left", "align", "color", "edgecolor", "linewidth", "alpha", "label",
];
const HIST_KW: &[&str] = &[
    "bins", "range", "density", "histtype", "color", "edgecolor", "linewidth", "alpha", "label",
];
const FILL_KW: &[&str] = &[
    "y2", "color", "facecolor", "edgecolor", "linewidth", "alpha", "label",
];
const ERRORBAR_KW: &[&str] = &[
    "yerr", "xerr", "fmt", "color", "c", "ecolor", "elinewidth", "capsize", "linewidth", "lw",
    "markersize", "ms", "alpha", "label",
];
const STACK_KW: &[&str] = &["colors", "labels", "alpha", "baseline"];
const PIE_KW: &[&str] = &[
    "colors", "labels", "startangle", "counterclock", "radius", "labeldistance",
];
const BOX_KW: &[&str] = &["positions", "widths", "vert", "patch_artist", "showfliers", "whis"];
const VIOLIN_KW: &[&str] = &[
    "positions", "widths", "vert", "showmeans", "showextrema", "showmedians", "points",
];
const IMSHOW_KW: &[&str] = &["cmap", "vmin", "vmax", "alpha", "origin"];
const BAR_LABEL_KW: &[&str] = &["labels", "fmt", "padding", "fontsize", "color", "label_type"];
const TITLE_KW: &[&str] = &["fontsize", "color", "loc", "pad"];
const AXIS_LABEL_KW: &[&str] = &["fontsize", "color", "labelpad"];
const XLIM_KW: &[&str] = &["left", "right"];
const YLIM_KW: &[&str] = &["bottom", "top"];
const LEGEND_KW: &[&str] = &["loc", "frameon", "fontsize", "ncol", "title", "framealpha"];
const GRID_KW: &[&str] = &["visible", "axis", "color", "linewidth", "alpha"];
const AXHLINE_KW: &[&str] = &[
    "xmin", "xmax", "color", "linewidth", "lw", "linestyle", "ls", "alpha", "label",
];
const AXVLINE_KW: &[&str] = &[
    "ymin", "ymax", "color", "linewidth", "lw", "linestyle", "ls", "alpha", "label",
];
const TEXT_KW: &[&str] = &[
    "fontsize", "color", "ha", "va", "horizontalalignment", "verticalalignment", "rotation",
    "transform", "alpha",
];
const ANNOTATE_KW: &[&str] = &["xytext", "xycoords", "arrowprops", "fontsize", "color", "ha", "va"];
const STAT_KW: &[&str] = &["tip", "linewidth", "color", "fontsize"];

/// Positional and keyword arguments of one invocation, checked against what the operation accepts.
struct Args<'a> {
    op: Operation,
    pos: &'a [Value],
    kw: &'a Kwargs,
}

impl<'a> Args<'a> {
    fn new(
        op: Operation,
        pos: &'a [Value],
        kw: &'a Kwargs,
        max_pos: usize,
        allowed: &[&str],
    ) -> RecipeResult<Self> {
        if pos.len() > max_pos {
            return Err(RecipeError::engine(format!(
                "{op}() takes at most {max_pos} positional arguments ({} given)",
                pos.len()
            )));
        }
        if let Some(bad) = kw.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(RecipeError::engine(format!(
                "{op}() got an unexpected keyword argument '{bad}'"
            )));
        }
        Ok(Self { op, pos, kw })
    }

    fn err(&self, msg: impl Display) -> RecipeError {
        RecipeError::engine(format!("{}(): {msg}", self.op))
    }

    fn arg(&self, i: usize) -> Option<&'a Value> {
        self.pos.get(i).filter(|v| !matches!(v, Value::Null))
    }

    fn req(&self, i: usize, name: &str) -> RecipeResult<&'a Value> {
        self.arg(i)
            .ok_or_else(|| self.err(format!("missing required argument '{name}'")))
    }

    fn kw(&self, name: &str) -> Option<&'a Value> {
        self.kw.get(name).filter(|v| !matches!(v, Value::Null))
    }

    fn kw_any(&self, names: &[&str]) -> Option<&'a Value> {
        names.iter().find_map(|n| self.kw(n))
    }

    fn floats_of(&self, v: &Value, name: &str) -> RecipeResult<Vec<f64>> {
        v.to_f64_vec()
            .ok_or_else(|| self.err(format!("'{name}' must be numeric, got {}", v.kind())))
    }

    fn scalar_of(&self, v: &Value, name: &str) -> RecipeResult<f64> {
        v.as_f64()
            .ok_or_else(|| self.err(format!("'{name}' must be a number, got {}", v.kind())))
    }

    fn floats(&self, i: usize, name: &str) -> RecipeResult<Vec<f64>> {
        self.floats_of(self.req(i, name)?, name)
    }

    fn scalar(&self, i: usize, name: &str) -> RecipeResult<f64> {
        self.scalar_of(self.req(i, name)?, name)
    }

    /// Numeric positions; a list of strings is treated as categories at `0..n`.
    fn positions(&self, i: usize, name: &str) -> RecipeResult<Vec<f64>> {
        match self.req(i, name)? {
            Value::List(items) if items.iter().all(|v| matches!(v, Value::Str(_))) => {
                Ok((0..items.len()).map(|k| k as f64).collect())
            }
            v => self.floats_of(v, name),
        }
    }

    fn text(&self, i: usize, name: &str) -> RecipeResult<String> {
        match self.req(i, name)? {
            Value::Str(s) => Ok(s.clone()),
            v => v
                .as_f64()
                .map(fmt_number)
                .ok_or_else(|| self.err(format!("'{name}' must be text, got {}", v.kind()))),
        }
    }

    fn kw_f64(&self, names: &[&str], default: f64) -> RecipeResult<f64> {
        Ok(self.kw_opt_f64(names)?.unwrap_or(default))
    }

    fn kw_opt_f64(&self, names: &[&str]) -> RecipeResult<Option<f64>> {
        let Some(v) = self.kw_any(names) else {
            return Ok(None);
        };
        self.scalar_of(v, names[0]).map(Some)
    }

    fn kw_floats(&self, name: &str) -> RecipeResult<Option<Vec<f64>>> {
        self.kw(name).map(|v| self.floats_of(v, name)).transpose()
    }

    fn kw_str(&self, names: &[&str]) -> RecipeResult<Option<&'a str>> {
        let Some(v) = self.kw_any(names) else {
            return Ok(None);
        };
        v.as_str()
            .map(Some)
            .ok_or_else(|| self.err(format!("'{}' must be a string, got {}", names[0], v.kind())))
    }

    fn kw_bool(&self, name: &str, default: bool) -> RecipeResult<bool> {
        let Some(v) = self.kw(name) else {
            return Ok(default);
        };
        v.as_bool()
            .ok_or_else(|| self.err(format!("'{name}' must be a boolean, got {}", v.kind())))
    }

    fn kw_color(&self, names: &[&str]) -> RecipeResult<Option<Rgba8>> {
        self.kw_any(names)
            .map(|v| color_from_value(v).map_err(|e| self.err(e)))
            .transpose()
    }

    fn alpha(&self) -> RecipeResult<Option<f64>> {
        self.kw_opt_f64(&["alpha"])
    }

    /// Legend label; labels starting with `_` are hidden from legends.
    fn label(&self) -> Option<String> {
        match self.kw("label")? {
            Value::Str(s) if s.starts_with('_') => None,
            Value::Str(s) => Some(s.clone()),
            v => v.as_f64().map(fmt_number),
        }
    }

    fn legend(&self) -> Vec<(usize, String)> {
        self.label().map(|l| vec![(0, l)]).unwrap_or_default()
    }

    fn font_size(&self, default: f64) -> RecipeResult<f64> {
        self.kw_f64(&["fontsize"], default)
    }

    fn xy(&self) -> RecipeResult<(Vec<f64>, Vec<f64>)> {
        let (x, y) = if self.arg(1).is_none() {
            let y = self.floats(0, "y")?;
            ((0..y.len()).map(|i| i as f64).collect(), y)
        } else {
            (self.positions(0, "x")?, self.floats(1, "y")?)
        };
        if x.len() != y.len() {
            return Err(self.err(format!(
                "x and y must have the same length, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        Ok((x, y))
    }

    fn broadcast(&self, v: Vec<f64>, n: usize, name: &str) -> RecipeResult<Vec<f64>> {
        match v.len() {
            1 => Ok(vec![v[0]; n]),
            len if len == n => Ok(v),
            len => Err(self.err(format!("'{name}' has {len} values, expected 1 or {n}"))),
        }
    }
}

fn fmt_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{}", v as i64);
    }
    let s = format!("{v:.6}");
    s.trim_end_matches('0').trim_end_matches('.').to_owned()
}

/// Format a bar value with a printf-style (`%.2f`, `%d`, `%g`) or brace-style (`{:.1f}`) spec.
pub(crate) fn format_value(v: f64, fmt: &str) -> RecipeResult<String> {
    let spec = if let Some(inner) = fmt.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
        inner.strip_prefix(':').unwrap_or(inner)
    } else if let Some(rest) = fmt.strip_prefix('%') {
        rest
    } else {
        return Err(RecipeError::engine(format!("unsupported label format '{fmt}'")));
    };
    match spec {
        "" | "g" => Ok(fmt_number(v)),
        "d" => Ok(format!("{}", v.round() as i64)),
        s => s
            .strip_prefix('.')
            .and_then(|p| p.strip_suffix('f'))
            .and_then(|p| p.parse::<usize>().ok())
            .map(|prec| format!("{v:.prec$}"))
            .ok_or_else(|| RecipeError::engine(format!("unsupported label format '{fmt}'"))),
    }
}

fn tint(c: Rgba8, alpha: Option<f64>) -> Rgba8 {
    match alpha {
        Some(a) => c.with_alpha(a * f64::from(c.a) / 255.0),
        None => c,
    }
}

fn rect_points(r: Rect) -> Vec<Point> {
    vec![
        Point::new(r.x0, r.y0),
        Point::new(r.x1, r.y0),
        Point::new(r.x1, r.y1),
        Point::new(r.x0, r.y1),
    ]
}

fn is_none_style(ls: &str) -> bool {
    matches!(ls, "" | " " | "none" | "None")
}

fn step_points(points: &[Point], mode: &str) -> RecipeResult<Vec<Point>> {
    let Some(first) = points.first() else {
        return Ok(Vec::new());
    };
    let mut out = vec![*first];
    for w in points.windows(2) {
        let (a, b) = (w[0], w[1]);
        match mode {
            "pre" => out.extend([Point::new(a.x, b.y), b]),
            "post" => out.extend([Point::new(b.x, a.y), b]),
            "mid" => {
                let xm = (a.x + b.x) / 2.0;
                out.extend([Point::new(xm, a.y), Point::new(xm, b.y), b]);
            }
            other => {
                return Err(RecipeError::engine(format!(
                    "step(): 'where' must be 'pre', 'post' or 'mid', got '{other}'"
                )));
            }
        }
    }
    Ok(out)
}

/// Datasets of a box or violin plot: groups, the columns of a matrix, or one flat array.
fn datasets(v: &Value) -> Option<Vec<Vec<f64>>> {
    match v {
        Value::Groups(groups) => Some(groups.iter().map(|g| g.to_f64_vec()).collect()),
        Value::Array(arr) if arr.shape().len() == 2 => {
            let (rows, cols) = (arr.shape()[0], arr.shape()[1]);
            let flat = arr.to_f64_vec();
            Some(
                (0..cols)
                    .map(|c| (0..rows).map(|r| flat[r * cols + c]).collect())
                    .collect(),
            )
        }
        other => other.to_f64_vec().map(|v| vec![v]),
    }
}

/// Rows of a stacked dataset: groups, the rows of a matrix, or a single series.
fn rows_of(v: &Value) -> Option<Vec<Vec<f64>>> {
    match v {
        Value::Groups(groups) => Some(groups.iter().map(|g| g.to_f64_vec()).collect()),
        Value::Array(arr) if arr.shape().len() == 2 => {
            let cols = arr.shape()[1];
            Some(arr.to_f64_vec().chunks(cols.max(1)).map(<[f64]>::to_vec).collect())
        }
        other => other.to_f64_vec().map(|v| vec![v]),
    }
}

fn sorted_finite(values: &[f64]) -> Vec<f64> {
    let mut v: Vec<f64> = values.iter().copied().filter(|x| x.is_finite()).collect();
    v.sort_by(f64::total_cmp);
    v
}

fn orient(p: Point, vertical: bool) -> Point {
    if vertical { p } else { Point::new(p.y, p.x) }
}

fn labels_of(v: &Value) -> Option<Vec<String>> {
    match v {
        Value::List(items) => items
            .iter()
            .map(|it| match it {
                Value::Str(s) => Some(s.clone()),
                other => other.as_f64().map(fmt_number),
            })
            .collect(),
        Value::Colors(list) => Some(list.clone()),
        Value::Str(s) => Some(vec![s.clone()]),
        other => other
            .to_f64_vec()
            .map(|v| v.into_iter().map(fmt_number).collect()),
    }
}

#[allow(clippy::too_many_arguments)]
fn text_element(
    panel: usize,
    space: Space,
    anchor: Point,
    offset_pt: Vec2,
    text: String,
    size_pt: f64,
    (ha, va): (Align, Align),
    color: Rgba8,
) -> Element {
    let mut el = Element::new(
        panel,
        ElementKind::Text,
        space,
        Shape::Text(TextShape {
            anchor,
            offset_pt,
            text,
            size_pt,
            ha,
            va,
            vertical: false,
        }),
    )
    .fill(color)
    .z(3);
    el.autoscale = false;
    el
}

/// Parsed arguments of a `legend` call, kept so the legend can be rebuilt.
#[derive(Clone, Debug)]
pub(crate) struct LegendSpec {
    font_pt: f64,
    frame_on: bool,
    frame_alpha: f64,
    ncol: usize,
    title: Option<String>,
    /// Placement inside the panel as fractions of the free space.
    anchor: (f64, f64),
}

enum Swatch {
    Line(Rgba8, f64),
    Patch(Rgba8),
    Marker(Rgba8, f64),
}

impl CpuCanvas {
    /// Execute one operation against panel `panel` and return the handle of what it produced.
    pub(crate) fn dispatch(
        &mut self,
        op: Operation,
        panel: usize,
        pos: &[Value],
        kw: &Kwargs,
    ) -> RecipeResult<Handle> {
        use Operation as O;
        let args = |max: usize, allowed: &[&str]| Args::new(op, pos, kw, max, allowed);
        match op {
            O::Plot => self.plot(&args(2, PLOT_KW)?, panel, false),
            O::Step => self.plot(&args(2, STEP_KW)?, panel, true),
            O::Scatter => self.scatter(&args(2, SCATTER_KW)?, panel),
            O::Bar => self.bars(&args(2, BAR_KW)?, panel, false),
            O::Barh => self.bars(&args(2, BARH_KW)?, panel, true),
            O::Hist => self.hist(&args(1, HIST_KW)?, panel),
            O::FillBetween => self.fill_between(&args(3, FILL_KW)?, panel),
            O::Errorbar => self.errorbar(&args(3, ERRORBAR_KW)?, panel),
            O::Stackplot => self.stackplot(&args(usize::MAX, STACK_KW)?, panel),
            O::Pie => self.pie(&args(1, PIE_KW)?, panel),
            O::Boxplot => self.boxplot(&args(1, BOX_KW)?, panel),
            O::Violinplot => self.violinplot(&args(1, VIOLIN_KW)?, panel),
            O::Imshow => self.imshow(&args(1, IMSHOW_KW)?, panel),
            O::BarLabel => self.bar_label(&args(1, BAR_LABEL_KW)?, panel),
            O::SetTitle => self.title(&args(1, TITLE_KW)?, panel),
            O::SetXlabel | O::SetYlabel => self.axis_label(&args(1, AXIS_LABEL_KW)?, panel),
            O::SetXlim => self.limit(&args(2, XLIM_KW)?, panel, ["left", "right"]),
            O::SetYlim => self.limit(&args(2, YLIM_KW)?, panel, ["bottom", "top"]),
            O::Legend => self.legend(&args(0, LEGEND_KW)?, panel),
            O::Grid => self.grid(&args(1, GRID_KW)?, panel),
            O::Axhline => self.ref_line(&args(1, AXHLINE_KW)?, panel, true),
            O::Axvline => self.ref_line(&args(1, AXVLINE_KW)?, panel, false),
            O::Text => self.text(&args(3, TEXT_KW)?, panel),
            O::Annotate => self.annotate(&args(2, ANNOTATE_KW)?, panel),
            O::StatAnnotation => self.stat_annotation(&args(4, STAT_KW)?, panel),
        }
    }

    fn color_or_cycle(&mut self, a: &Args<'_>, names: &[&str], panel: usize) -> RecipeResult<Rgba8> {
        let c = match a.kw_color(names)? {
            Some(c) => c,
            None => self.next_cycle_color(panel),
        };
        Ok(tint(c, a.alpha()?))
    }

    fn plot(&mut self, a: &Args<'_>, panel: usize, step: bool) -> RecipeResult<Handle> {
        let (x, y) = a.xy()?;
        let color = self.color_or_cycle(a, &["color", "c"], panel)?;
        let lw = a.kw_f64(&["linewidth", "lw"], 1.5)?;
        let ls = a.kw_str(&["linestyle", "ls"])?.unwrap_or("-");
        let points: Vec<Point> = x.iter().zip(&y).map(|(x, y)| Point::new(*x, *y)).collect();

        let mut parts = Vec::new();
        if !is_none_style(ls) {
            let line = if step {
                step_points(&points, a.kw_str(&["where"])?.unwrap_or("pre"))?
            } else {
                points.clone()
            };
            parts.push(
                Element::new(
                    panel,
                    ElementKind::Line,
                    Space::DATA,
                    Shape::Polyline {
                        points: line,
                        offsets_pt: Vec::new(),
                    },
                )
                .stroke(color, lw),
            );
        }
        if a.kw_str(&["marker"])?.is_some_and(|m| !is_none_style(m)) {
            let size = a.kw_f64(&["markersize", "ms"], 6.0)?;
            parts.push(
                Element::new(
                    panel,
                    ElementKind::Markers,
                    Space::DATA,
                    Shape::Markers {
                        points,
                        radius_pt: size / 2.0,
                    },
                )
                .fill(color),
            );
        }
        if parts.is_empty() {
            return Err(a.err("nothing to draw: linestyle is none and no marker is set"));
        }
        Ok(self.finish_handle(a.op, panel, parts, a.legend(), Vec::new()))
    }

    fn scatter(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let x = a.positions(0, "x")?;
        let y = a.floats(1, "y")?;
        if x.len() != y.len() {
            return Err(a.err("x and y must be the same size"));
        }
        let s = match a.kw("s") {
            None => 36.0,
            Some(v) => {
                let sizes = a.floats_of(v, "s")?;
                match sizes.as_slice() {
                    [s] => *s,
                    [first, rest @ ..] if rest.iter().all(|s| s == first) => *first,
                    _ => return Err(a.err("per-point marker sizes are not supported")),
                }
            }
        };
        if s < 0.0 {
            return Err(a.err("marker size 's' must be non-negative"));
        }
        let color = self.color_or_cycle(a, &["c", "color"], panel)?;
        let points = x.iter().zip(&y).map(|(x, y)| Point::new(*x, *y)).collect();
        let el = Element::new(
            panel,
            ElementKind::Markers,
            Space::DATA,
            Shape::Markers {
                points,
                radius_pt: s.sqrt() / 2.0,
            },
        )
        .fill(color);
        Ok(self.finish_handle(a.op, panel, vec![el], a.legend(), Vec::new()))
    }

    fn bar_colors(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Vec<Rgba8>> {
        let alpha = a.alpha()?;
        let colors = match a.kw("color") {
            Some(v) => colors_from_value(v).map_err(|e| a.err(e))?,
            None => vec![self.next_cycle_color(panel)],
        };
        if colors.is_empty() {
            return Err(a.err("'color' must not be empty"));
        }
        Ok(colors.into_iter().map(|c| tint(c, alpha)).collect())
    }

    fn bar_elements(
        &self,
        a: &Args<'_>,
        panel: usize,
        rects: &[(Rect, f64)],
        colors: &[Rgba8],
        horizontal: bool,
    ) -> RecipeResult<(Vec<Element>, Vec<BarGeom>)> {
        let edge = a.kw_color(&["edgecolor"])?;
        let lw = a.kw_f64(&["linewidth"], 1.0)?;
        let mut parts = Vec::with_capacity(rects.len());
        let mut bars = Vec::with_capacity(rects.len());
        for (i, (rect, value)) in rects.iter().enumerate() {
            let mut el = Element::new(
                panel,
                ElementKind::Patch,
                Space::DATA,
                Shape::Polygon {
                    points: rect_points(*rect),
                },
            )
            .fill(colors[i % colors.len()]);
            if let Some(edge) = edge {
                el = el.stroke(edge, lw);
            }
            parts.push(el);
            bars.push(BarGeom {
                rect: *rect,
                value: *value,
                horizontal,
            });
        }
        Ok((parts, bars))
    }

    fn bars(&mut self, a: &Args<'_>, panel: usize, horizontal: bool) -> RecipeResult<Handle> {
        let (pos_name, val_name, thick_name, base_name) = if horizontal {
            ("y", "width", "height", "left")
        } else {
            ("x", "height", "width", "bottom")
        };
        let pos = a.positions(0, pos_name)?;
        let n = pos.len();
        let vals = a.broadcast(a.floats(1, val_name)?, n, val_name)?;
        let thick = a.broadcast(a.kw_floats(thick_name)?.unwrap_or(vec![0.8]), n, thick_name)?;
        let base = a.broadcast(a.kw_floats(base_name)?.unwrap_or(vec![0.0]), n, base_name)?;
        let centered = match a.kw_str(&["align"])?.unwrap_or("center") {
            "center" => true,
            "edge" => false,
            other => return Err(a.err(format!("'align' must be 'center' or 'edge', got '{other}'"))),
        };
        let colors = self.bar_colors(a, panel)?;

        let rects: Vec<(Rect, f64)> = (0..n)
            .map(|i| {
                let lo = if centered { pos[i] - thick[i] / 2.0 } else { pos[i] };
                let (p0, p1) = if horizontal {
                    (
                        Point::new(base[i], lo),
                        Point::new(base[i] + vals[i], lo + thick[i]),
                    )
                } else {
                    (
                        Point::new(lo, base[i]),
                        Point::new(lo + thick[i], base[i] + vals[i]),
                    )
                };
                (Rect::from_points(p0, p1), vals[i])
            })
            .collect();
        let (parts, bars) = self.bar_elements(a, panel, &rects, &colors, horizontal)?;
        let legend = if parts.is_empty() { Vec::new() } else { a.legend() };
        Ok(self.finish_handle(a.op, panel, parts, legend, bars))
    }

    fn hist(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let data = sorted_finite(&a.floats(0, "x")?);
        let (lo, hi) = match a.kw_floats("range")? {
            Some(r) if r.len() == 2 => (r[0], r[1]),
            Some(_) => return Err(a.err("'range' must hold two values")),
            None => match (data.first(), data.last()) {
                (Some(lo), Some(hi)) => (*lo, *hi),
                _ => (0.0, 1.0),
            },
        };
        let (lo, hi) = if lo == hi { (lo - 0.5, hi + 0.5) } else { (lo, hi) };
        let uniform = |n: usize| -> Vec<f64> {
            (0..=n)
                .map(|i| lo + (hi - lo) * i as f64 / n as f64)
                .collect()
        };
        let edges = match a.kw("bins") {
            None => uniform(10),
            Some(v) => match v.as_f64() {
                Some(n) if n >= 1.0 && n.fract() == 0.0 => uniform(n as usize),
                Some(_) => return Err(a.err("'bins' must be a positive integer or bin edges")),
                None => {
                    let e = a.floats_of(v, "bins")?;
                    if e.len() < 2 || e.windows(2).any(|w| w[1] <= w[0]) {
                        return Err(a.err("bin edges must be increasing with at least two values"));
                    }
                    e
                }
            },
        };
        match a.kw_str(&["histtype"])?.unwrap_or("bar") {
            "bar" | "stepfilled" => {}
            other => return Err(a.err(format!("unsupported histtype '{other}'"))),
        }

        let nb = edges.len() - 1;
        let mut counts = vec![0.0; nb];
        let (first, last) = (edges[0], edges[nb]);
        for v in data.iter().filter(|v| **v >= first && **v <= last) {
            let idx = edges.partition_point(|e| e <= v).saturating_sub(1).min(nb - 1);
            counts[idx] += 1.0;
        }
        if a.kw_bool("density", false)? {
            let total: f64 = counts.iter().sum();
            if total > 0.0 {
                for (i, c) in counts.iter_mut().enumerate() {
                    *c /= total * (edges[i + 1] - edges[i]);
                }
            }
        }
        let colors = self.bar_colors(a, panel)?;
        let rects: Vec<(Rect, f64)> = (0..nb)
            .map(|i| {
                (
                    Rect::from_points(
                        Point::new(edges[i], 0.0),
                        Point::new(edges[i + 1], counts[i]),
                    ),
                    counts[i],
                )
            })
            .collect();
        let (parts, bars) = self.bar_elements(a, panel, &rects, &colors, false)?;
        Ok(self.finish_handle(a.op, panel, parts, a.legend(), bars))
    }

    fn fill_between(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let x = a.positions(0, "x")?;
        let n = x.len();
        let y1 = a.broadcast(a.floats(1, "y1")?, n, "y1")?;
        let y2 = match a.arg(2).or_else(|| a.kw("y2")) {
            Some(v) => a.broadcast(a.floats_of(v, "y2")?, n, "y2")?,
            None => vec![0.0; n],
        };
        let color = self.color_or_cycle(a, &["color", "facecolor"], panel)?;
        let mut points: Vec<Point> = x.iter().zip(&y1).map(|(x, y)| Point::new(*x, *y)).collect();
        points.extend(x.iter().zip(&y2).rev().map(|(x, y)| Point::new(*x, *y)));
        let mut el =
            Element::new(panel, ElementKind::Fill, Space::DATA, Shape::Polygon { points }).fill(color);
        if let Some(edge) = a.kw_color(&["edgecolor"])? {
            el = el.stroke(edge, a.kw_f64(&["linewidth"], 1.0)?);
        }
        Ok(self.finish_handle(a.op, panel, vec![el], a.legend(), Vec::new()))
    }

    /// Lower and upper error extents for `n` points.
    fn error_extents(&self, a: &Args<'_>, v: &Value, n: usize, name: &str) -> RecipeResult<(Vec<f64>, Vec<f64>)> {
        let pair = match v {
            Value::Groups(g) if g.len() == 2 => Some((g[0].to_f64_vec(), g[1].to_f64_vec())),
            Value::Array(arr) if arr.shape() == [2, n] => {
                let flat = arr.to_f64_vec();
                Some((flat[..n].to_vec(), flat[n..].to_vec()))
            }
            _ => None,
        };
        match pair {
            Some((lo, hi)) => Ok((a.broadcast(lo, n, name)?, a.broadcast(hi, n, name)?)),
            None => {
                let sym = a.broadcast(a.floats_of(v, name)?, n, name)?;
                Ok((sym.clone(), sym))
            }
        }
    }

    fn errorbar(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let (x, y) = a.xy_strict()?;
        let n = x.len();
        let color = self.color_or_cycle(a, &["color", "c"], panel)?;
        let lw = a.kw_f64(&["linewidth", "lw"], 1.5)?;
        let ecolor = a.kw_color(&["ecolor"])?.map_or(color, |c| tint(c, a.alpha().ok().flatten()));
        let elw = a.kw_f64(&["elinewidth"], lw)?;
        let cap = a.kw_f64(&["capsize"], 0.0)?;
        let fmt = a.kw_str(&["fmt"])?.unwrap_or("");
        let points: Vec<Point> = x.iter().zip(&y).map(|(x, y)| Point::new(*x, *y)).collect();

        let mut parts = Vec::new();
        if fmt != "none" {
            if fmt.is_empty() || fmt.contains('-') {
                parts.push(
                    Element::new(
                        panel,
                        ElementKind::Line,
                        Space::DATA,
                        Shape::Polyline {
                            points: points.clone(),
                            offsets_pt: Vec::new(),
                        },
                    )
                    .stroke(color, lw),
                );
            }
            if fmt.chars().any(|c| "o.sv^D*+x".contains(c)) {
                let size = a.kw_f64(&["markersize", "ms"], 6.0)?;
                parts.push(
                    Element::new(
                        panel,
                        ElementKind::Markers,
                        Space::DATA,
                        Shape::Markers {
                            points: points.clone(),
                            radius_pt: size / 2.0,
                        },
                    )
                    .fill(color),
                );
            }
        }

        let mut bars = Vec::new();
        let mut caps = Vec::new();
        let mut cap_offsets = Vec::new();
        let half = cap / 2.0;
        if let Some(v) = a.arg(2).or_else(|| a.kw("yerr")) {
            let (lo, hi) = self.error_extents(a, v, n, "yerr")?;
            for (i, p) in points.iter().enumerate() {
                let (b, t) = (Point::new(p.x, p.y - lo[i]), Point::new(p.x, p.y + hi[i]));
                bars.push((b, t));
                for end in [b, t] {
                    caps.push((end, end));
                    cap_offsets.push((Vec2::new(-half, 0.0), Vec2::new(half, 0.0)));
                }
            }
        }
        if let Some(v) = a.kw("xerr") {
            let (lo, hi) = self.error_extents(a, v, n, "xerr")?;
            for (i, p) in points.iter().enumerate() {
                let (l, r) = (Point::new(p.x - lo[i], p.y), Point::new(p.x + hi[i], p.y));
                bars.push((l, r));
                for end in [l, r] {
                    caps.push((end, end));
                    cap_offsets.push((Vec2::new(0.0, -half), Vec2::new(0.0, half)));
                }
            }
        }
        if !bars.is_empty() {
            parts.push(
                Element::new(
                    panel,
                    ElementKind::Line,
                    Space::DATA,
                    Shape::Segments {
                        segments: bars,
                        offsets_pt: Vec::new(),
                    },
                )
                .stroke(ecolor, elw),
            );
            if cap > 0.0 {
                parts.push(
                    Element::new(
                        panel,
                        ElementKind::Line,
                        Space::DATA,
                        Shape::Segments {
                            segments: caps,
                            offsets_pt: cap_offsets,
                        },
                    )
                    .stroke(ecolor, elw),
                );
            }
        }
        if parts.is_empty() {
            return Err(a.err("nothing to draw: fmt is 'none' and no error values are given"));
        }
        Ok(self.finish_handle(a.op, panel, parts, a.legend(), Vec::new()))
    }

    fn stackplot(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let x = a.positions(0, "x")?;
        let first = a.req(1, "ys")?;
        let rows = if a.pos.len() > 2 {
            a.pos[1..]
                .iter()
                .map(|v| a.floats_of(v, "ys"))
                .collect::<RecipeResult<Vec<_>>>()?
        } else {
            rows_of(first).ok_or_else(|| a.err(format!("'ys' must be numeric, got {}", first.kind())))?
        };
        if let Some(baseline) = a.kw_str(&["baseline"])? {
            if baseline != "zero" {
                return Err(a.err(format!("unsupported baseline '{baseline}'")));
            }
        }
        let alpha = a.alpha()?;
        let colors = a
            .kw("colors")
            .map(|v| colors_from_value(v).map_err(|e| a.err(e)))
            .transpose()?
            .filter(|c| !c.is_empty());
        let labels = a.kw("labels").and_then(labels_of).unwrap_or_default();

        let mut prev = vec![0.0; x.len()];
        let mut parts = Vec::with_capacity(rows.len());
        let mut legend = Vec::new();
        for (i, row) in rows.iter().enumerate() {
            if row.len() != x.len() {
                return Err(a.err(format!(
                    "layer {i} has {} values but x has {}",
                    row.len(),
                    x.len()
                )));
            }
            let next: Vec<f64> = prev.iter().zip(row).map(|(p, r)| p + r).collect();
            let mut points: Vec<Point> =
                x.iter().zip(&next).map(|(x, y)| Point::new(*x, *y)).collect();
            points.extend(x.iter().zip(&prev).rev().map(|(x, y)| Point::new(*x, *y)));
            let color = match &colors {
                Some(c) => c[i % c.len()],
                None => self.next_cycle_color(panel),
            };
            parts.push(
                Element::new(panel, ElementKind::Fill, Space::DATA, Shape::Polygon { points })
                    .fill(tint(color, alpha)),
            );
            if let Some(label) = labels.get(i).filter(|l| !l.starts_with('_')) {
                legend.push((i, label.clone()));
            }
            prev = next;
        }
        Ok(self.finish_handle(a.op, panel, parts, legend, Vec::new()))
    }

    fn pie(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let x = a.floats(0, "x")?;
        if x.iter().any(|v| *v < 0.0 || !v.is_finite()) {
            return Err(a.err("wedge sizes must be finite and non-negative"));
        }
        let total: f64 = x.iter().sum();
        if total <= 0.0 {
            return Err(a.err("wedge sizes must not all be zero"));
        }
        let colors = a
            .kw("colors")
            .map(|v| colors_from_value(v).map_err(|e| a.err(e)))
            .transpose()?
            .filter(|c| !c.is_empty());
        let labels = a.kw("labels").and_then(labels_of).unwrap_or_default();
        let start = a.kw_f64(&["startangle"], 0.0)?;
        let dir = if a.kw_bool("counterclock", true)? { 1.0 } else { -1.0 };
        let radius = a.kw_f64(&["radius"], 1.0)?;
        let label_dist = a.kw_f64(&["labeldistance"], 1.1)?;

        let rect = self.panels[panel].rect;
        let r_dev = 0.4 * rect.width().min(rect.height()) * radius;
        let (rx, ry) = (r_dev / rect.width(), r_dev / rect.height());
        let at = |theta: f64, scale: f64| {
            Point::new(0.5 + scale * rx * theta.cos(), 0.5 + scale * ry * theta.sin())
        };

        let mut wedges = Vec::with_capacity(x.len());
        let mut texts = Vec::new();
        let mut legend = Vec::new();
        let mut theta = start.to_radians();
        for (i, v) in x.iter().enumerate() {
            let frac = v / total;
            let span = dir * frac * std::f64::consts::TAU;
            let steps = ((frac * 90.0).ceil() as usize).max(2);
            let mut points = vec![Point::new(0.5, 0.5)];
            points.extend((0..=steps).map(|k| at(theta + span * k as f64 / steps as f64, 1.0)));
            let color = match &colors {
                Some(c) => c[i % c.len()],
                None => self.next_cycle_color(panel),
            };
            wedges.push(
                Element::new(panel, ElementKind::Wedge, Space::AXES, Shape::Polygon { points })
                    .fill(color),
            );
            if let Some(label) = labels.get(i) {
                let mid = theta + span / 2.0;
                let ha = if mid.cos() >= 0.0 { Align::Start } else { Align::End };
                texts.push(text_element(
                    panel,
                    Space::AXES,
                    at(mid, label_dist),
                    Vec2::ZERO,
                    label.clone(),
                    DEFAULT_FONT_PT,
                    (ha, Align::Center),
                    BLACK,
                ));
                if !label.starts_with('_') {
                    legend.push((i, label.clone()));
                }
            }
            theta += span;
        }
        wedges.extend(texts);
        Ok(self.finish_handle(a.op, panel, wedges, legend, Vec::new()))
    }

    fn group_positions(
        &self,
        a: &Args<'_>,
        n: usize,
        default_width: f64,
    ) -> RecipeResult<(Vec<f64>, Vec<f64>)> {
        let positions = match a.kw_floats("positions")? {
            Some(p) if p.len() == n => p,
            Some(p) => {
                return Err(a.err(format!("'positions' has {} values for {n} datasets", p.len())));
            }
            None => (1..=n).map(|i| i as f64).collect(),
        };
        let widths = a.broadcast(a.kw_floats("widths")?.unwrap_or(vec![default_width]), n, "widths")?;
        Ok((positions, widths))
    }

    fn vertical(&self, a: &Args<'_>) -> RecipeResult<bool> {
        a.kw_bool("vert", true)
    }

    fn boxplot(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let data = a.req(0, "data")?;
        let sets = datasets(data).ok_or_else(|| a.err(format!("'data' must be numeric, got {}", data.kind())))?;
        let (positions, widths) = self.group_positions(a, sets.len(), 0.5)?;
        let vert = self.vertical(a)?;
        let whis = a.kw_f64(&["whis"], 1.5)?;
        let show_fliers = a.kw_bool("showfliers", true)?;
        let fill = a.kw_bool("patch_artist", false)?.then_some(CYCLE[0]);
        let median_color = CYCLE[1];

        let mut parts = Vec::new();
        for (i, set) in sets.iter().enumerate() {
            let sorted = sorted_finite(set);
            if sorted.is_empty() {
                continue;
            }
            let (q1, med, q3) = (
                quantile_sorted(&sorted, 0.25),
                quantile_sorted(&sorted, 0.5),
                quantile_sorted(&sorted, 0.75),
            );
            let iqr = q3 - q1;
            let lo = sorted.iter().copied().find(|v| *v >= q1 - whis * iqr).unwrap_or(q1);
            let hi = sorted.iter().rev().copied().find(|v| *v <= q3 + whis * iqr).unwrap_or(q3);
            let (p, w) = (positions[i], widths[i]);
            let pt = |u: f64, v: f64| orient(Point::new(u, v), vert);

            let mut body = Element::new(
                panel,
                ElementKind::Patch,
                Space::DATA,
                Shape::Polygon {
                    points: vec![pt(p - w / 2.0, q1), pt(p + w / 2.0, q1), pt(p + w / 2.0, q3), pt(p - w / 2.0, q3)],
                },
            )
            .stroke(BLACK, 1.0);
            if let Some(fill) = fill {
                body = body.fill(fill);
            }
            parts.push(body);
            parts.push(
                Element::new(
                    panel,
                    ElementKind::Line,
                    Space::DATA,
                    Shape::Polyline {
                        points: vec![pt(p - w / 2.0, med), pt(p + w / 2.0, med)],
                        offsets_pt: Vec::new(),
                    },
                )
                .stroke(median_color, 1.0),
            );
            let segments = |pairs: Vec<(Point, Point)>| Shape::Segments {
                segments: pairs,
                offsets_pt: Vec::new(),
            };
            parts.push(
                Element::new(
                    panel,
                    ElementKind::Line,
                    Space::DATA,
                    segments(vec![(pt(p, q1), pt(p, lo)), (pt(p, q3), pt(p, hi))]),
                )
                .stroke(BLACK, 1.0),
            );
            parts.push(
                Element::new(
                    panel,
                    ElementKind::Line,
                    Space::DATA,
                    segments(vec![
                        (pt(p - w / 4.0, lo), pt(p + w / 4.0, lo)),
                        (pt(p - w / 4.0, hi), pt(p + w / 4.0, hi)),
                    ]),
                )
                .stroke(BLACK, 1.0),
            );
            let fliers: Vec<Point> = sorted
                .iter()
                .filter(|v| **v < lo || **v > hi)
                .map(|v| pt(p, *v))
                .collect();
            if show_fliers && !fliers.is_empty() {
                parts.push(
                    Element::new(
                        panel,
                        ElementKind::Markers,
                        Space::DATA,
                        Shape::Markers {
                            points: fliers,
                            radius_pt: 3.0,
                        },
                    )
                    .stroke(BLACK, 1.0),
                );
            }
        }
        Ok(self.finish_handle(a.op, panel, parts, Vec::new(), Vec::new()))
    }

    fn violinplot(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let data = a.req(0, "dataset")?;
        let sets = datasets(data).ok_or_else(|| a.err(format!("'dataset' must be numeric, got {}", data.kind())))?;
        let (positions, widths) = self.group_positions(a, sets.len(), 0.5)?;
        let vert = self.vertical(a)?;
        let n_points = a.kw_f64(&["points"], 100.0)?;
        if n_points < 2.0 || n_points.fract() != 0.0 {
            return Err(a.err("'points' must be an integer of at least 2"));
        }
        let n_points = n_points as usize;
        let body_color = CYCLE[0].with_alpha(0.3);
        let line_color = CYCLE[0];

        let mut bodies = Vec::new();
        let mut extrema = Vec::new();
        let mut means = Vec::new();
        let mut medians = Vec::new();
        for (i, set) in sets.iter().enumerate() {
            let sorted = sorted_finite(set);
            let (Some(&lo), Some(&hi)) = (sorted.first(), sorted.last()) else {
                continue;
            };
            let (p, w) = (positions[i], widths[i]);
            let pt = |u: f64, v: f64| orient(Point::new(u, v), vert);
            let ys: Vec<f64> = (0..n_points)
                .map(|k| lo + (hi - lo) * k as f64 / (n_points - 1) as f64)
                .collect();
            let density = gaussian_kde(&sorted, &ys);
            let peak = density.iter().copied().fold(0.0, f64::max);
            let scale = if peak > 0.0 { w / 2.0 / peak } else { 0.0 };
            let mut points: Vec<Point> = ys
                .iter()
                .zip(&density)
                .map(|(y, d)| pt(p - d * scale, *y))
                .collect();
            points.extend(ys.iter().zip(&density).rev().map(|(y, d)| pt(p + d * scale, *y)));
            bodies.push(
                Element::new(panel, ElementKind::Fill, Space::DATA, Shape::Polygon { points })
                    .fill(body_color),
            );

            let hline = |v: f64| (pt(p - w / 4.0, v), pt(p + w / 4.0, v));
            extrema.extend([hline(lo), hline(hi), (pt(p, lo), pt(p, hi))]);
            means.push(hline(sorted.iter().sum::<f64>() / sorted.len() as f64));
            medians.push(hline(quantile_sorted(&sorted, 0.5)));
        }

        let mut parts = bodies;
        let mut lines = |segments: Vec<(Point, Point)>, show: bool| {
            if show && !segments.is_empty() {
                parts.push(
                    Element::new(
                        panel,
                        ElementKind::Line,
                        Space::DATA,
                        Shape::Segments {
                            segments,
                            offsets_pt: Vec::new(),
                        },
                    )
                    .stroke(line_color, 1.0),
                );
            }
        };
        lines(extrema, a.kw_bool("showextrema", true)?);
        lines(means, a.kw_bool("showmeans", false)?);
        lines(medians, a.kw_bool("showmedians", false)?);
        Ok(self.finish_handle(a.op, panel, parts, Vec::new(), Vec::new()))
    }

    fn imshow(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let z = a.req(0, "z")?;
        let (rows, cols, channels, values) = match z {
            Value::Array(arr) => match *arr.shape() {
                [r, c] => (r, c, 1, arr.to_f64_vec()),
                [r, c, ch @ (3 | 4)] => (r, c, ch, arr.to_f64_vec()),
                _ => return Err(a.err(format!("invalid image shape {:?}", arr.shape()))),
            },
            Value::Groups(groups) => {
                let cols = groups.first().map_or(0, |g| g.len());
                if groups.iter().any(|g| g.len() != cols) {
                    return Err(a.err("image rows must have equal length"));
                }
                (groups.len(), cols, 1, groups.iter().flat_map(|g| g.to_f64_vec()).collect())
            }
            other => return Err(a.err(format!("'z' must be a 2-D array, got {}", other.kind()))),
        };
        if rows == 0 || cols == 0 {
            return Err(a.err("image must not be empty"));
        }
        let alpha = a.alpha()?;
        let mut colors = Vec::with_capacity(rows * cols);
        if channels == 1 {
            let finite = values.iter().copied().filter(|v| v.is_finite());
            let vmin = match a.kw_opt_f64(&["vmin"])? {
                Some(v) => v,
                None => finite.clone().fold(f64::INFINITY, f64::min),
            };
            let vmax = match a.kw_opt_f64(&["vmax"])? {
                Some(v) => v,
                None => finite.fold(f64::NEG_INFINITY, f64::max),
            };
            let cmap = a.kw_str(&["cmap"])?.unwrap_or("viridis");
            for v in &values {
                if !v.is_finite() {
                    colors.push(Rgba8::new(0, 0, 0, 0));
                    continue;
                }
                let t = if vmax > vmin { (v - vmin) / (vmax - vmin) } else { 0.0 };
                colors.push(tint(colormap(cmap, t).map_err(|e| a.err(e))?, alpha));
            }
        } else {
            let integer = values.iter().any(|v| *v > 1.0);
            let to_u8 = |v: f64| {
                let v = if integer { v } else { v * 255.0 };
                v.round().clamp(0.0, 255.0) as u8
            };
            for px in values.chunks(channels) {
                let a8 = px.get(3).map_or(255, |v| to_u8(*v));
                colors.push(tint(Rgba8::new(to_u8(px[0]), to_u8(px[1]), to_u8(px[2]), a8), alpha));
            }
        }
        match a.kw_str(&["origin"])?.unwrap_or("upper") {
            "upper" => {}
            "lower" => {
                colors = colors.chunks(cols).rev().flatten().copied().collect();
            }
            other => return Err(a.err(format!("'origin' must be 'upper' or 'lower', got '{other}'"))),
        }
        self.panels[panel].tight = true;
        let el = Element::new(
            panel,
            ElementKind::Image,
            Space::DATA,
            Shape::Cells {
                extent: Rect::new(-0.5, -0.5, cols as f64 - 0.5, rows as f64 - 0.5),
                rows,
                cols,
                colors,
            },
        );
        Ok(self.finish_handle(a.op, panel, vec![el], Vec::new(), Vec::new()))
    }

    fn bar_label(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let container = match a.req(0, "container")? {
            Value::Handle(h) => *h,
            other => return Err(a.err(format!("'container' must be a bar container, got {}", other.kind()))),
        };
        let entry = self
            .handles
            .get(container.0 as usize)
            .filter(|h| h.panel == panel && !h.bars.is_empty())
            .ok_or_else(|| a.err("'container' is not a bar container in this panel"))?;
        let bars = entry.bars.clone();
        let labels = match a.kw("labels") {
            Some(v) => labels_of(v).ok_or_else(|| a.err("'labels' must be a list"))?,
            None => {
                let fmt = a.kw_str(&["fmt"])?.unwrap_or("%g");
                bars.iter()
                    .map(|b| format_value(b.value, fmt).map_err(|e| a.err(e)))
                    .collect::<RecipeResult<Vec<_>>>()?
            }
        };
        if labels.len() != bars.len() {
            return Err(a.err(format!(
                "{} labels for {} bars",
                labels.len(),
                bars.len()
            )));
        }
        let padding = a.kw_f64(&["padding"], 3.0)?;
        let size = a.font_size(DEFAULT_FONT_PT)?;
        let color = a.kw_color(&["color"])?.unwrap_or(BLACK);
        let center = match a.kw_str(&["label_type"])?.unwrap_or("edge") {
            "edge" => false,
            "center" => true,
            other => return Err(a.err(format!("'label_type' must be 'edge' or 'center', got '{other}'"))),
        };

        let parts = bars
            .iter()
            .zip(labels)
            .map(|(b, text)| {
                let r = b.rect;
                let c = r.center();
                let neg = b.value < 0.0;
                let (anchor, offset, align) = if center {
                    (c, Vec2::ZERO, (Align::Center, Align::Center))
                } else if b.horizontal {
                    if neg {
                        (Point::new(r.x0, c.y), Vec2::new(-padding, 0.0), (Align::End, Align::Center))
                    } else {
                        (Point::new(r.x1, c.y), Vec2::new(padding, 0.0), (Align::Start, Align::Center))
                    }
                } else if neg {
                    (Point::new(c.x, r.y0), Vec2::new(0.0, -padding), (Align::Center, Align::End))
                } else {
                    (Point::new(c.x, r.y1), Vec2::new(0.0, padding), (Align::Center, Align::Start))
                };
                text_element(panel, Space::DATA, anchor, offset, text, size, align, color)
            })
            .collect();
        Ok(self.finish_handle(a.op, panel, parts, Vec::new(), Vec::new()))
    }

    fn title(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let text = a.text(0, "label")?;
        let (x, ha) = match a.kw_str(&["loc"])?.unwrap_or("center") {
            "center" => (0.5, Align::Center),
            "left" => (0.0, Align::Start),
            "right" => (1.0, Align::End),
            other => return Err(a.err(format!("'loc' must be 'left', 'center' or 'right', got '{other}'"))),
        };
        let pad = a.kw_f64(&["pad"], 6.0)?;
        let el = text_element(
            panel,
            Space::AXES,
            Point::new(x, 1.0),
            Vec2::new(0.0, pad),
            text,
            a.font_size(TITLE_FONT_PT)?,
            (ha, Align::Start),
            a.kw_color(&["color"])?.unwrap_or(BLACK),
        );
        let handle = self.finish_handle(a.op, panel, vec![el], Vec::new(), Vec::new());
        self.replace_slot(panel, handle, |p| &mut p.title);
        Ok(handle)
    }

    fn axis_label(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let text = a.text(0, "label")?;
        let gap = 3.5 + a.kw_f64(&["labelpad"], 4.0)?;
        let size = a.font_size(DEFAULT_FONT_PT)?;
        let color = a.kw_color(&["color"])?.unwrap_or(BLACK);
        let x_axis = a.op == Operation::SetXlabel;
        let mut el = if x_axis {
            text_element(
                panel,
                Space::AXES,
                Point::new(0.5, 0.0),
                Vec2::new(0.0, -gap),
                text,
                size,
                (Align::Center, Align::End),
                color,
            )
        } else {
            text_element(
                panel,
                Space::AXES,
                Point::new(0.0, 0.5),
                Vec2::new(-gap, 0.0),
                text,
                size,
                (Align::End, Align::Center),
                color,
            )
        };
        if let Shape::Text(t) = &mut el.shape {
            t.vertical = !x_axis;
        }
        let handle = self.finish_handle(a.op, panel, vec![el], Vec::new(), Vec::new());
        if x_axis {
            self.replace_slot(panel, handle, |p| &mut p.xlabel);
        } else {
            self.replace_slot(panel, handle, |p| &mut p.ylabel);
        }
        Ok(handle)
    }

    /// Store the first part of `handle` in a per-panel slot, hiding what it replaces.
    fn replace_slot(
        &mut self,
        panel: usize,
        handle: Handle,
        slot: impl Fn(&mut crate::render::cpu::PanelState) -> &mut Option<ElementId>,
    ) {
        let new = self.handles[handle.0 as usize].parts.first().copied();
        if let Some(old) = std::mem::replace(slot(&mut self.panels[panel]), new) {
            self.hide(old);
        }
    }

    fn limit(&mut self, a: &Args<'_>, panel: usize, names: [&str; 2]) -> RecipeResult<Handle> {
        let (mut lo, mut hi) = match (a.arg(0), a.arg(1)) {
            (Some(v), None) => match a.floats_of(v, names[0])?.as_slice() {
                [lo, hi] => (Some(*lo), Some(*hi)),
                [lo] => (Some(*lo), None),
                _ => return Err(a.err("limits must be a pair of numbers")),
            },
            (lo, hi) => (
                lo.map(|v| a.scalar_of(v, names[0])).transpose()?,
                hi.map(|v| a.scalar_of(v, names[1])).transpose()?,
            ),
        };
        if let Some(v) = a.kw_opt_f64(&[names[0]])? {
            lo = Some(v);
        }
        if let Some(v) = a.kw_opt_f64(&[names[1]])? {
            hi = Some(v);
        }
        if let Some(bad) = [lo, hi].into_iter().flatten().find(|v| !v.is_finite()) {
            return Err(a.err(format!("invalid limit {bad}")));
        }
        if let (Some(l), Some(h)) = (lo, hi)
            && l == h
        {
            return Err(a.err(format!("invalid limits {l} and {h}")));
        }
        // A side left open keeps autoscaling until render.
        let state = &mut self.panels[panel];
        let slot = if a.op == Operation::SetXlim {
            &mut state.xlim
        } else {
            &mut state.ylim
        };
        for (side, v) in slot.iter_mut().zip([lo, hi]) {
            if v.is_some() {
                *side = v;
            }
        }
        Ok(self.finish_handle(a.op, panel, Vec::new(), Vec::new(), Vec::new()))
    }

    fn hide_handles(&mut self, panel: usize, op: Operation) {
        let stale: Vec<ElementId> = self
            .handles
            .iter()
            .filter(|h| h.panel == panel && h.op == op)
            .flat_map(|h| h.parts.iter().copied())
            .collect();
        for id in stale {
            self.hide(id);
        }
    }

    /// Labelled swatches of `panel`: call elements first, then decorations, each in call order.
    fn legend_entries(&self, panel: usize) -> Vec<(Swatch, ElementKind, String)> {
        let mut sources: Vec<_> = self.handles.iter().filter(|h| h.panel == panel).collect();
        sources.sort_by_key(|h| h.op.is_decoration());
        let mut entries = Vec::new();
        for h in sources {
            for (part, label) in &h.legend {
                let Some(el) = h.parts.get(*part).map(|id| &self.elements[id.0 as usize]) else {
                    continue;
                };
                if !el.visible {
                    continue;
                }
                let app = el.appearance;
                let swatch = match (&el.shape, app.fill, app.stroke) {
                    (Shape::Markers { radius_pt, .. }, fill, stroke) => {
                        Swatch::Marker(fill.or(stroke).unwrap_or(BLACK), *radius_pt)
                    }
                    (Shape::Polyline { .. } | Shape::Segments { .. }, _, Some(stroke)) => {
                        Swatch::Line(stroke, app.line_width)
                    }
                    (_, Some(fill), _) => Swatch::Patch(fill),
                    (_, None, Some(stroke)) => Swatch::Line(stroke, app.line_width),
                    (_, None, None) => continue,
                };
                entries.push((swatch, el.kind, label.clone()));
            }
        }
        entries
    }

    fn legend(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let ncol = a.kw_f64(&["ncol"], 1.0)?;
        if ncol < 1.0 || ncol.fract() != 0.0 {
            return Err(a.err("'ncol' must be a positive integer"));
        }
        let anchor = match a.kw_str(&["loc"])?.unwrap_or("best") {
            "best" | "upper right" => (1.0, 1.0),
            "upper left" => (0.0, 1.0),
            "lower left" => (0.0, 0.0),
            "lower right" => (1.0, 0.0),
            "right" | "center right" => (1.0, 0.5),
            "center left" => (0.0, 0.5),
            "upper center" => (0.5, 1.0),
            "lower center" => (0.5, 0.0),
            "center" => (0.5, 0.5),
            other => return Err(a.err(format!("unknown legend location '{other}'"))),
        };
        let spec = LegendSpec {
            font_pt: a.font_size(DEFAULT_FONT_PT)?,
            frame_on: a.kw_bool("frameon", true)?,
            frame_alpha: a.kw_f64(&["framealpha"], 0.8)?,
            ncol: ncol as usize,
            title: a.kw("title").map(|v| match v {
                Value::Str(s) => s.clone(),
                other => other.as_f64().map(fmt_number).unwrap_or_default(),
            }),
            anchor,
        };

        self.hide_handles(panel, Operation::Legend);
        let parts = self.legend_parts(panel, &spec);
        if parts.iter().all(|p| !p.visible) {
            tracing::warn!(panel, "no labelled elements for legend");
        }
        let handle = self.finish_handle(a.op, panel, parts, Vec::new(), Vec::new());
        let state = &mut self.panels[panel];
        state.legend = Some((handle, spec));
        state.legend_stale = false;
        Ok(handle)
    }

    /// Rebuild every legend whose panel gained labelled elements since it was drawn.
    ///
    /// The frame keeps the appearance it had, so styling applied after the legend call survives.
    pub(crate) fn refresh_legends(&mut self) {
        for panel in 0..self.panels.len() {
            if !std::mem::take(&mut self.panels[panel].legend_stale) {
                continue;
            }
            let Some((handle, spec)) = self.panels[panel].legend.clone() else {
                continue;
            };
            let old = std::mem::take(&mut self.handles[handle.0 as usize].parts);
            let frame_style = old
                .iter()
                .map(|id| &self.elements[id.0 as usize])
                .find(|e| e.kind == ElementKind::Legend)
                .map(|e| e.appearance);
            for id in &old {
                self.hide(*id);
            }
            let mut parts = self.legend_parts(panel, &spec);
            if let (Some(style), Some(frame)) =
                (frame_style, parts.iter_mut().find(|e| e.kind == ElementKind::Legend))
            {
                frame.appearance = style;
            }
            let ids = parts
                .into_iter()
                .enumerate()
                .map(|(i, mut el)| {
                    el.handle = Some(handle);
                    el.part = i;
                    self.push(el)
                })
                .collect();
            self.handles[handle.0 as usize].parts = ids;
        }
    }

    /// Frame, title and entries of a legend over the current labelled elements of `panel`.
    ///
    /// Without entries the frame is kept hidden so that later styling and rebuilds have a part
    /// to carry.
    fn legend_parts(&self, panel: usize, spec: &LegendSpec) -> Vec<Element> {
        let entries = self.legend_entries(panel);
        let (fx, fy) = spec.anchor;
        let fs = self.pt_to_dev(spec.font_pt);
        let (pad, handle_len, gap, row_h, adv) = (0.4 * fs, 2.0 * fs, 0.8 * fs, 1.4 * fs, 0.6 * fs);
        let rows = entries.len().div_ceil(spec.ncol);
        let longest = entries.iter().map(|e| e.2.chars().count()).max().unwrap_or(0);
        let col_w = handle_len + gap + longest as f64 * adv + pad;
        let title_rows = usize::from(spec.title.is_some());
        let w = pad + spec.ncol as f64 * col_w;
        let h = 2.0 * pad + (rows + title_rows) as f64 * row_h;
        let r = self.panels[panel].rect;
        let border = 0.5 * fs;
        let place = |f: f64, lo: f64, hi: f64, size: f64| {
            lo + border + f * (hi - lo - 2.0 * border - size)
        };
        let x0 = place(fx, r.x0, r.x1, w);
        let y0 = place(fy, r.y0, r.y1, h);
        let y1 = y0 + h;

        let mut parts = Vec::new();
        if spec.frame_on {
            let mut frame = Element::new(
                panel,
                ElementKind::Legend,
                Space::DEVICE,
                Shape::Polygon {
                    points: rect_points(Rect::new(x0, y0, x0 + w, y1)),
                },
            )
            .fill(WHITE.with_alpha(spec.frame_alpha))
            .stroke(Rgba8::new(204, 204, 204, 255), 1.0)
            .z(3);
            frame.visible = !entries.is_empty();
            parts.push(frame);
        }
        if entries.is_empty() {
            return parts;
        }
        if let Some(title) = &spec.title {
            parts.push(text_element(
                panel,
                Space::DEVICE,
                Point::new(x0 + w / 2.0, y1 - pad - row_h / 2.0),
                Vec2::ZERO,
                title.clone(),
                spec.font_pt,
                (Align::Center, Align::Center),
                BLACK,
            ));
        }
        for (i, (swatch, kind, label)) in entries.into_iter().enumerate() {
            let (col, row) = (i / rows, i % rows);
            let cy = y1 - pad - (row + title_rows) as f64 * row_h - row_h / 2.0;
            let hx = x0 + pad + col as f64 * col_w;
            let el = match swatch {
                Swatch::Line(c, lw) => Element::new(
                    panel,
                    kind,
                    Space::DEVICE,
                    Shape::Polyline {
                        points: vec![Point::new(hx, cy), Point::new(hx + handle_len, cy)],
                        offsets_pt: Vec::new(),
                    },
                )
                .stroke(c, lw),
                Swatch::Patch(c) => Element::new(
                    panel,
                    kind,
                    Space::DEVICE,
                    Shape::Polygon {
                        points: rect_points(Rect::new(hx, cy - 0.35 * fs, hx + handle_len, cy + 0.35 * fs)),
                    },
                )
                .fill(c),
                Swatch::Marker(c, radius) => Element::new(
                    panel,
                    kind,
                    Space::DEVICE,
                    Shape::Markers {
                        points: vec![Point::new(hx + handle_len / 2.0, cy)],
                        radius_pt: radius,
                    },
                )
                .fill(c),
            };
            parts.push(el.z(3));
            parts.push(text_element(
                panel,
                Space::DEVICE,
                Point::new(hx + handle_len + gap, cy),
                Vec2::ZERO,
                label,
                spec.font_pt,
                (Align::Start, Align::Center),
                BLACK,
            ));
        }
        parts
    }

    fn grid(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let visible = match a.arg(0).or_else(|| a.kw("visible")) {
            Some(v) => v
                .as_bool()
                .ok_or_else(|| a.err(format!("'visible' must be a boolean, got {}", v.kind())))?,
            None => true,
        };
        let (x, y) = match a.kw_str(&["axis"])?.unwrap_or("both") {
            "both" => (true, true),
            "x" => (true, false),
            "y" => (false, true),
            other => return Err(a.err(format!("'axis' must be 'both', 'x' or 'y', got '{other}'"))),
        };
        self.hide_handles(panel, Operation::Grid);
        let mut parts = Vec::new();
        if visible {
            let color = a.kw_color(&["color"])?.unwrap_or(Rgba8::new(0xb0, 0xb0, 0xb0, 255));
            parts.push(
                Element::new(panel, ElementKind::Structural, Space::DEVICE, Shape::Grid { x, y })
                    .stroke(tint(color, a.alpha()?), a.kw_f64(&["linewidth"], 0.8)?)
                    .z(-1)
                    .structural(),
            );
        }
        Ok(self.finish_handle(a.op, panel, parts, Vec::new(), Vec::new()))
    }

    fn ref_line(&mut self, a: &Args<'_>, panel: usize, horizontal: bool) -> RecipeResult<Handle> {
        let at = match a.arg(0) {
            Some(v) => a.scalar_of(v, if horizontal { "y" } else { "x" })?,
            None => 0.0,
        };
        let (lo_name, hi_name) = if horizontal { ("xmin", "xmax") } else { ("ymin", "ymax") };
        let lo = a.kw_f64(&[lo_name], 0.0)?;
        let hi = a.kw_f64(&[hi_name], 1.0)?;
        let color = tint(a.kw_color(&["color"])?.unwrap_or(CYCLE[0]), a.alpha()?);
        let lw = a.kw_f64(&["linewidth", "lw"], 1.5)?;
        if is_none_style(a.kw_str(&["linestyle", "ls"])?.unwrap_or("-")) {
            return Err(a.err("nothing to draw: linestyle is none"));
        }
        let (space, points) = if horizontal {
            (
                Space {
                    x: Coord::Axes,
                    y: Coord::Data,
                },
                vec![Point::new(lo, at), Point::new(hi, at)],
            )
        } else {
            (
                Space {
                    x: Coord::Data,
                    y: Coord::Axes,
                },
                vec![Point::new(at, lo), Point::new(at, hi)],
            )
        };
        let el = Element::new(
            panel,
            ElementKind::Line,
            space,
            Shape::Polyline {
                points,
                offsets_pt: Vec::new(),
            },
        )
        .stroke(color, lw);
        Ok(self.finish_handle(a.op, panel, vec![el], a.legend(), Vec::new()))
    }

    fn text(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let x = a.scalar(0, "x")?;
        let y = a.scalar(1, "y")?;
        let s = a.text(2, "s")?;
        let space = match a.kw_str(&["transform"])?.unwrap_or("data") {
            "data" => Space::DATA,
            "axes" => Space::AXES,
            other => return Err(a.err(format!("'transform' must be 'data' or 'axes', got '{other}'"))),
        };
        let vertical = match a.kw("rotation") {
            None => false,
            Some(Value::Str(s)) if s == "horizontal" => false,
            Some(Value::Str(s)) if s == "vertical" => true,
            Some(v) => match v.as_f64() {
                Some(r) if r.rem_euclid(360.0) == 0.0 => false,
                Some(r) if r.rem_euclid(360.0) == 90.0 => true,
                _ => return Err(a.err("only rotations of 0 and 90 degrees are supported")),
            },
        };
        let ha = Align::parse_h(a.kw_str(&["ha", "horizontalalignment"])?.unwrap_or("left"))
            .map_err(|e| a.err(e))?;
        let va = Align::parse_v(a.kw_str(&["va", "verticalalignment"])?.unwrap_or("baseline"))
            .map_err(|e| a.err(e))?;
        let color = tint(a.kw_color(&["color"])?.unwrap_or(BLACK), a.alpha()?);
        let mut el = text_element(
            panel,
            space,
            Point::new(x, y),
            Vec2::ZERO,
            s,
            a.font_size(DEFAULT_FONT_PT)?,
            (ha, va),
            color,
        );
        if let Shape::Text(t) = &mut el.shape {
            t.vertical = vertical;
        }
        Ok(self.finish_handle(a.op, panel, vec![el], Vec::new(), Vec::new()))
    }

    fn point_arg(&self, a: &Args<'_>, v: &Value, name: &str) -> RecipeResult<Point> {
        match a.floats_of(v, name)?.as_slice() {
            [x, y] => Ok(Point::new(*x, *y)),
            _ => Err(a.err(format!("'{name}' must be an (x, y) pair"))),
        }
    }

    fn annotate(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let text = a.text(0, "text")?;
        let xy = self.point_arg(a, a.req(1, "xy")?, "xy")?;
        let xytext = a.kw("xytext").map(|v| self.point_arg(a, v, "xytext")).transpose()?;
        let space = match a.kw_str(&["xycoords"])?.unwrap_or("data") {
            "data" => Space::DATA,
            "axes fraction" => Space::AXES,
            other => {
                return Err(a.err(format!(
                    "'xycoords' must be 'data' or 'axes fraction', got '{other}'"
                )));
            }
        };
        let ha = Align::parse_h(a.kw_str(&["ha"])?.unwrap_or("left")).map_err(|e| a.err(e))?;
        let va = Align::parse_v(a.kw_str(&["va"])?.unwrap_or("baseline")).map_err(|e| a.err(e))?;
        let color = a.kw_color(&["color"])?.unwrap_or(BLACK);
        let mut parts = vec![text_element(
            panel,
            space,
            xytext.unwrap_or(xy),
            Vec2::ZERO,
            text,
            a.font_size(DEFAULT_FONT_PT)?,
            (ha, va),
            color,
        )];
        if let (Some(from), Some(Value::Map(props))) = (xytext, a.kw("arrowprops")) {
            let arrow_color = match props.get("color") {
                Some(v) => color_from_value(v).map_err(|e| a.err(e))?,
                None => BLACK,
            };
            let lw = match props.get("linewidth").or_else(|| props.get("lw")) {
                Some(v) => a.scalar_of(v, "arrowprops.linewidth")?,
                None => 1.0,
            };
            let mut arrow = Element::new(
                panel,
                ElementKind::Line,
                space,
                Shape::Polyline {
                    points: vec![from, xy],
                    offsets_pt: Vec::new(),
                },
            )
            .stroke(arrow_color, lw);
            arrow.autoscale = false;
            parts.push(arrow);
        }
        Ok(self.finish_handle(a.op, panel, parts, Vec::new(), Vec::new()))
    }

    fn stat_annotation(&mut self, a: &Args<'_>, panel: usize) -> RecipeResult<Handle> {
        let x1 = a.scalar(0, "x1")?;
        let x2 = a.scalar(1, "x2")?;
        let y = a.scalar(2, "y")?;
        let text = a.text(3, "text")?;
        let tip = a.kw_f64(&["tip"], 5.0)?;
        let color = a.kw_color(&["color"])?.unwrap_or(BLACK);
        let bracket = Element::new(
            panel,
            ElementKind::Line,
            Space::DATA,
            Shape::Polyline {
                points: vec![
                    Point::new(x1, y),
                    Point::new(x1, y),
                    Point::new(x2, y),
                    Point::new(x2, y),
                ],
                offsets_pt: vec![
                    Vec2::ZERO,
                    Vec2::new(0.0, tip),
                    Vec2::new(0.0, tip),
                    Vec2::ZERO,
                ],
            },
        )
        .stroke(color, a.kw_f64(&["linewidth"], 1.0)?);
        let label = text_element(
            panel,
            Space::DATA,
            Point::new((x1 + x2) / 2.0, y),
            Vec2::new(0.0, tip + 2.0),
            text,
            a.font_size(DEFAULT_FONT_PT)?,
            (Align::Center, Align::Start),
            color,
        );
        Ok(self.finish_handle(a.op, panel, vec![bracket, label], Vec::new(), Vec::new()))
    }
}

impl Args<'_> {
    /// `(x, y)` with both required.
    fn xy_strict(&self) -> RecipeResult<(Vec<f64>, Vec<f64>)> {
        let x = self.positions(0, "x")?;
        let y = self.floats(1, "y")?;
        if x.len() != y.len() {
            return Err(self.err(format!(
                "x and y must have the same length, got {} and {}",
                x.len(),
                y.len()
            )));
        }
        Ok((x, y))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/draw.rs"]
mod tests;
