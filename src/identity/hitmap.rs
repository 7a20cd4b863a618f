use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use serde::Serialize;

use crate::foundation::core::{RasterSize, Rgb8, Rgba8};
use crate::foundation::error::RecipeResult;
use crate::identity::palette::{BACKGROUND, STRUCTURAL, id_to_rgb};
use crate::live::{CallIndex, LiveFigure};
use crate::render::backend::{
    Appearance, ElementId, ElementInfo, ElementKind, Handle, LiveCanvas, Raster,
};

/// Stable name of a selectable element: panel, producing operation, ordinal and layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ElementKey {
    /// Panel index in creation order.
    pub panel_index: usize,
    /// Operation name, or `untracked` for elements of calls that were not recorded.
    pub kind: String,
    /// Ordinal of the producing call among same-operation calls in the panel.
    pub local_index: usize,
    /// Part index when the call produced more than one element.
    pub layer: Option<usize>,
}

impl std::fmt::Display for ElementKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ax{}_{}{}", self.panel_index, self.kind, self.local_index)?;
        if let Some(layer) = self.layer {
            write!(f, "_layer{layer}")?;
        }
        Ok(())
    }
}

/// A selectable element together with the call that produced it.
#[derive(Clone, Debug)]
pub(crate) struct Selectable {
    pub(crate) info: ElementInfo,
    pub(crate) key: ElementKey,
    pub(crate) call_id: Option<String>,
    pub(crate) panel: Option<String>,
}

/// Selectable elements of `canvas` in paint order, keyed through `index`.
pub(crate) fn selectable_elements(canvas: &dyn LiveCanvas, index: &CallIndex) -> Vec<Selectable> {
    let mut untracked: HashMap<Handle, usize> = HashMap::new();
    let mut counters: HashMap<usize, usize> = HashMap::new();
    canvas
        .elements()
        .into_iter()
        .filter(|e| e.selectable)
        .filter_map(|info| {
            let handle = info.handle?;
            let layered = canvas.handle_parts(handle).len() > 1;
            let layer = layered.then_some(info.part);
            let (kind, local_index, call_id, panel) = match index.origin(handle) {
                Some(o) => (
                    o.op.name().to_owned(),
                    o.ordinal,
                    Some(o.call_id.clone()),
                    Some(o.panel.key()),
                ),
                None => {
                    let ordinal = *untracked.entry(handle).or_insert_with(|| {
                        let next = counters.entry(info.panel_index).or_insert(0);
                        *next += 1;
                        *next - 1
                    });
                    ("untracked".to_owned(), ordinal, None, None)
                }
            };
            Some(Selectable {
                key: ElementKey {
                    panel_index: info.panel_index,
                    kind,
                    local_index,
                    layer,
                },
                info,
                call_id,
                panel,
            })
        })
        .collect()
}

/// One element that received an identifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct IdentityRecord {
    /// Element key (`ax0_plot0`, `ax0_pie0_layer2`).
    pub key: String,
    /// Identifier, starting at 1.
    pub identifier: u32,
    /// Color the element was drawn with in the hitmap.
    pub rgb: Rgb8,
    /// Owning call id; shared by every layer of a multi-part call.
    pub call_id: Option<String>,
    /// Panel key of the owning call.
    pub panel: Option<String>,
    /// Visual category.
    pub element_type: ElementKind,
    /// Appearance before recoloring.
    pub original: Appearance,
    /// Canvas element.
    #[serde(skip)]
    pub element: ElementId,
}

/// Identifier assignment of one hitmap render. The source of truth for color lookups.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(transparent)]
pub struct IdentityMap {
    records: IndexMap<String, IdentityRecord>,
    #[serde(skip)]
    by_rgb: HashMap<Rgb8, String>,
    #[serde(skip)]
    by_id: HashMap<u32, String>,
}

impl IdentityMap {
    fn insert(&mut self, record: IdentityRecord) {
        self.by_rgb.insert(record.rgb, record.key.clone());
        self.by_id.insert(record.identifier, record.key.clone());
        self.records.insert(record.key.clone(), record);
    }

    /// Record by element key.
    pub fn get(&self, key: &str) -> Option<&IdentityRecord> {
        self.records.get(key)
    }

    /// Record by identifier.
    pub fn by_identifier(&self, id: u32) -> Option<&IdentityRecord> {
        self.by_id.get(&id).and_then(|k| self.records.get(k))
    }

    /// Record drawn with `rgb`.
    pub fn by_rgb(&self, rgb: Rgb8) -> Option<&IdentityRecord> {
        self.by_rgb.get(&rgb).and_then(|k| self.records.get(k))
    }

    /// Record under pixel `(x, y)` of a hitmap rendered with this map.
    pub fn at_pixel(&self, hitmap: &Raster, x: u32, y: u32) -> Option<&IdentityRecord> {
        let [r, g, b, _] = hitmap.pixel(x, y)?;
        self.by_rgb(Rgb8::new(r, g, b))
    }

    /// Records in assignment order.
    pub fn iter(&self) -> impl Iterator<Item = &IdentityRecord> {
        self.records.values()
    }

    /// Number of identified elements.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` when nothing was identified.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Options for [`assign_identities`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HitmapOpts {
    /// Give text elements (titles, labels, annotations) identifiers. When `false` they are
    /// painted in the background color.
    pub include_text: bool,
}

impl Default for HitmapOpts {
    fn default() -> Self {
        Self { include_text: true }
    }
}

/// Restores every touched appearance and the background when dropped.
struct Restore<'a> {
    canvas: &'a mut dyn LiveCanvas,
    saved: Vec<(ElementId, Appearance)>,
    background: Rgba8,
}

impl Restore<'_> {
    fn recolor(&mut self, id: ElementId, color: Rgb8) -> RecipeResult<Appearance> {
        let original = self.canvas.appearance(id)?;
        self.saved.push((id, original));
        let c = color.opaque();
        let painted = Appearance {
            fill: original.fill.map(|_| c),
            stroke: original.stroke.map(|_| c),
            line_width: original.line_width,
        };
        self.canvas.set_appearance(id, painted)?;
        Ok(original)
    }
}

impl Drop for Restore<'_> {
    fn drop(&mut self) {
        for (id, appearance) in self.saved.drain(..).rev() {
            if let Err(e) = self.canvas.set_appearance(id, appearance) {
                tracing::warn!(element = id.0, "appearance not restored: {e}");
            }
        }
        self.canvas.set_background(self.background);
    }
}

/// Give every selectable element a unique color, render the hitmap at `size` and restore the
/// canvas.
///
/// Structural elements are drawn in [`STRUCTURAL`] on a [`BACKGROUND`] field. Appearances are
/// restored on every path, errors included, so the canvas renders as before afterwards.
#[tracing::instrument(skip(figure))]
pub fn assign_identities(
    figure: &mut LiveFigure,
    size: RasterSize,
    opts: &HitmapOpts,
) -> RecipeResult<(IdentityMap, Raster)> {
    let (canvas, index) = figure.parts_mut();
    let selectable = selectable_elements(canvas, index);
    let structural: Vec<ElementId> = canvas
        .elements()
        .into_iter()
        .filter(|e| !e.selectable)
        .map(|e| e.id)
        .collect();

    let background = canvas.background();
    let mut guard = Restore {
        canvas,
        saved: Vec::new(),
        background,
    };
    guard.canvas.set_background(BACKGROUND.opaque());
    for id in structural {
        guard.recolor(id, STRUCTURAL)?;
    }

    let mut map = IdentityMap::default();
    let mut used: HashSet<Rgb8> = HashSet::from([BACKGROUND, STRUCTURAL]);
    let mut next = 1u32;
    for s in selectable {
        if !opts.include_text && s.info.kind == ElementKind::Text {
            guard.recolor(s.info.id, BACKGROUND)?;
            continue;
        }
        // Generated colors are not checked for collisions up front; skip any repeat here.
        let (identifier, rgb) = loop {
            let rgb = id_to_rgb(next);
            next += 1;
            if used.insert(rgb) {
                break (next - 1, rgb);
            }
        };
        let original = guard.recolor(s.info.id, rgb)?;
        map.insert(IdentityRecord {
            key: s.key.to_string(),
            identifier,
            rgb,
            call_id: s.call_id,
            panel: s.panel,
            element_type: s.info.kind,
            original,
            element: s.info.id,
        });
    }

    let raster = guard.canvas.render(size)?;
    drop(guard);
    tracing::debug!(elements = map.len(), "assigned identities");
    Ok((map, raster))
}

#[cfg(test)]
#[path = "../../tests/unit/identity/hitmap.rs"]
mod tests;
