//! Record-time keywords that native operations do not accept.
//!
//! Each entry names the keywords to pop before the native call and a function that applies them
//! to the parts of the returned handle. Recording and replay share [`invoke`], so both paths
//! draw the same pixels.

use std::collections::BTreeMap;

use crate::codec::value::Value;
use crate::foundation::core::PanelPos;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::recipe::ops::Operation;
use crate::render::backend::{ElementKind, Handle, LiveCanvas};
use crate::render::color::{color_from_value, colors_from_value};

type Apply = fn(&mut dyn LiveCanvas, Handle, &BTreeMap<String, Value>) -> RecipeResult<()>;

/// One post-processing rule.
#[derive(Clone, Copy)]
pub struct PostProcess {
    /// Operation the rule applies to.
    pub op: Operation,
    /// Keywords popped before the native call.
    pub keys: &'static [&'static str],
    apply: Apply,
}

impl std::fmt::Debug for PostProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostProcess")
            .field("op", &self.op)
            .field("keys", &self.keys)
            .finish()
    }
}

/// The complete rule table.
pub const TABLE: &[PostProcess] = &[
    PostProcess {
        op: Operation::Boxplot,
        keys: &["color", "linewidth"],
        apply: restyle_box,
    },
    PostProcess {
        op: Operation::Violinplot,
        keys: &["color", "colors", "alpha"],
        apply: restyle_violin,
    },
    PostProcess {
        op: Operation::Legend,
        keys: &["frame_linewidth", "frame_edgecolor"],
        apply: restyle_legend_frame,
    },
    PostProcess {
        op: Operation::Pie,
        keys: &["edgecolor", "linewidth"],
        apply: outline_wedges,
    },
];

/// Rule for `op`, if any.
pub fn lookup(op: Operation) -> Option<&'static PostProcess> {
    TABLE.iter().find(|p| p.op == op)
}

/// Invoke `op` on `canvas`, applying post-processing keywords to the result.
pub(crate) fn invoke(
    canvas: &mut dyn LiveCanvas,
    op: Operation,
    panel: PanelPos,
    args: &[Value],
    mut kwargs: BTreeMap<String, Value>,
) -> RecipeResult<Handle> {
    let handle = match lookup(op) {
        None => canvas.invoke(op, panel, args, &kwargs)?,
        Some(rule) => {
            let extra: BTreeMap<String, Value> = rule
                .keys
                .iter()
                .filter_map(|k| kwargs.remove(*k).map(|v| ((*k).to_owned(), v)))
                .filter(|(_, v)| !matches!(v, Value::Null))
                .collect();
            let handle = canvas.invoke(op, panel, args, &kwargs)?;
            if !extra.is_empty() {
                (rule.apply)(canvas, handle, &extra)?;
            }
            handle
        }
    };
    canvas.settle()?;
    Ok(handle)
}

fn width_of(extra: &BTreeMap<String, Value>, key: &str) -> RecipeResult<Option<f64>> {
    extra
        .get(key)
        .map(|v| {
            v.as_f64()
                .ok_or_else(|| RecipeError::engine(format!("'{key}' must be a number")))
        })
        .transpose()
}

/// Apply `edit` to the appearance of every part of `handle` accepted by `filter`.
fn restyle(
    canvas: &mut dyn LiveCanvas,
    handle: Handle,
    filter: impl Fn(ElementKind) -> bool,
    mut edit: impl FnMut(usize, &mut crate::render::backend::Appearance),
) -> RecipeResult<()> {
    let mut n = 0;
    for id in canvas.handle_parts(handle) {
        let Some(info) = canvas.element(id) else {
            continue;
        };
        if !filter(info.kind) {
            continue;
        }
        let mut app = canvas.appearance(id)?;
        edit(n, &mut app);
        canvas.set_appearance(id, app)?;
        n += 1;
    }
    Ok(())
}

fn restyle_box(
    canvas: &mut dyn LiveCanvas,
    handle: Handle,
    extra: &BTreeMap<String, Value>,
) -> RecipeResult<()> {
    let color = extra.get("color").map(color_from_value).transpose()?;
    let width = width_of(extra, "linewidth")?;
    restyle(canvas, handle, |_| true, |_, app| {
        if let Some(c) = color {
            app.stroke = Some(c);
        }
        if let Some(w) = width {
            app.line_width = w;
        }
    })
}

fn restyle_violin(
    canvas: &mut dyn LiveCanvas,
    handle: Handle,
    extra: &BTreeMap<String, Value>,
) -> RecipeResult<()> {
    let colors = match (extra.get("colors"), extra.get("color")) {
        (Some(v), _) | (None, Some(v)) => Some(colors_from_value(v)?),
        (None, None) => None,
    }
    .filter(|c| !c.is_empty());
    let alpha = width_of(extra, "alpha")?;
    restyle(
        canvas,
        handle,
        |k| k == ElementKind::Fill,
        |i, app| {
            let Some(fill) = app.fill else { return };
            let mut next = colors.as_ref().map_or(fill, |c| c[i % c.len()].with_alpha(f64::from(fill.a) / 255.0));
            if let Some(a) = alpha {
                next = next.with_alpha(a);
            }
            app.fill = Some(next);
        },
    )
}

fn restyle_legend_frame(
    canvas: &mut dyn LiveCanvas,
    handle: Handle,
    extra: &BTreeMap<String, Value>,
) -> RecipeResult<()> {
    let color = extra.get("frame_edgecolor").map(color_from_value).transpose()?;
    let width = width_of(extra, "frame_linewidth")?;
    restyle(canvas, handle, |k| k == ElementKind::Legend, |_, app| {
        if let Some(c) = color {
            app.stroke = Some(c);
        }
        if let Some(w) = width {
            app.line_width = w;
        }
    })
}

fn outline_wedges(
    canvas: &mut dyn LiveCanvas,
    handle: Handle,
    extra: &BTreeMap<String, Value>,
) -> RecipeResult<()> {
    let color = extra.get("edgecolor").map(color_from_value).transpose()?;
    let width = width_of(extra, "linewidth")?;
    restyle(canvas, handle, |k| k == ElementKind::Wedge, |_, app| {
        app.stroke = color.or(app.stroke).or(Some(crate::foundation::core::Rgba8::new(255, 255, 255, 255)));
        app.line_width = width.unwrap_or(1.0);
    })
}

#[cfg(test)]
#[path = "../../tests/unit/replay/postprocess.rs"]
mod tests;
