use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use crate::codec::payload::PayloadStore;
use crate::codec::spec::{ArgumentSpec, ExternalRef, PositionalArg};
use crate::foundation::core::PanelPos;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::foundation::math::Fnv1a64;
use crate::recipe::ops::Operation;

/// Document format version written by this build.
pub const SCHEMA_VERSION: &str = "1.1";
/// Highest document major version this build reads.
pub const SCHEMA_MAJOR: u32 = 1;

/// Versioned description of a figure: config, metadata and recorded calls per panel.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct Recipe {
    /// Document format version (`major.minor`).
    #[serde(rename = "figrecipe", alias = "schema_version")]
    pub schema_version: String,
    /// Figure identifier.
    #[serde(default)]
    pub id: String,
    /// Creation time, RFC 3339.
    #[serde(default)]
    pub created: String,
    /// Version tag of the rendering engine used while recording.
    #[serde(default, alias = "matplotlib_version")]
    pub engine_version: String,
    /// Figure-level configuration.
    #[serde(default)]
    pub figure: FigureConfig,
    /// Figure-level metadata.
    #[serde(default, skip_serializing_if = "FigureMetadata::is_empty")]
    pub metadata: FigureMetadata,
    /// Panels keyed by `ax_{row}_{col}`, in document order.
    #[serde(default, alias = "axes")]
    pub panels: IndexMap<String, Panel>,
    /// Present when payloads were saved as one merged table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<MergedData>,
    /// Numeric payloads behind external references.
    #[serde(skip)]
    pub payloads: PayloadStore,
}

/// Pointer to a merged payload table.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MergedData {
    /// Table path relative to the document.
    pub csv_path: String,
    /// Layout tag (`single`).
    #[serde(default = "MergedData::single")]
    pub csv_format: String,
}

impl MergedData {
    fn single() -> String {
        "single".to_owned()
    }
}

/// Layout grid of the figure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct GridSpec {
    /// Number of panel rows.
    #[serde(alias = "nrows")]
    pub rows: u32,
    /// Number of panel columns.
    #[serde(alias = "ncols")]
    pub cols: u32,
}

impl Default for GridSpec {
    fn default() -> Self {
        Self { rows: 1, cols: 1 }
    }
}

/// How the exported canvas is cropped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CropMode {
    /// Export the full figure rectangle.
    #[default]
    Full,
    /// Export the tight box around drawn content plus `pad_inches`.
    Tight,
}

/// Figure-level configuration.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FigureConfig {
    /// Physical size `[width, height]` in inches.
    #[serde(alias = "figsize")]
    pub size: [f64; 2],
    /// Resolution in device units per inch.
    pub dpi: f64,
    /// Panel layout.
    #[serde(alias = "layout")]
    pub grid: GridSpec,
    /// Figure background color.
    pub facecolor: String,
    /// Export crop mode.
    pub crop: CropMode,
    /// Padding around the tight box, in inches.
    pub pad_inches: f64,
    /// Finalization applied after all calls replayed.
    pub finalize: FinalizeSpec,
}

impl Default for FigureConfig {
    fn default() -> Self {
        Self {
            size: [6.4, 4.8],
            dpi: 100.0,
            grid: GridSpec::default(),
            facecolor: "white".to_owned(),
            crop: CropMode::Full,
            pad_inches: 0.1,
            finalize: FinalizeSpec::default(),
        }
    }
}

impl FigureConfig {
    /// Config for a `rows x cols` grid with defaults elsewhere.
    pub fn grid(rows: u32, cols: u32) -> Self {
        Self {
            grid: GridSpec { rows, cols },
            ..Self::default()
        }
    }

    /// Check ranges the canvas relies on.
    pub fn validate(&self) -> RecipeResult<()> {
        if !(self.size[0] > 0.0 && self.size[1] > 0.0) {
            return Err(RecipeError::validation(format!(
                "figure size must be positive, got {:?}",
                self.size
            )));
        }
        if !(self.dpi > 0.0) {
            return Err(RecipeError::validation("figure dpi must be positive"));
        }
        if self.grid.rows == 0 || self.grid.cols == 0 {
            return Err(RecipeError::validation("figure grid must have rows and cols"));
        }
        Ok(())
    }
}

/// Normalization pass applied once after replay.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FinalizeSpec {
    /// Major tick count per axis.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tick_count: Option<u32>,
    /// Legend frame stroke width in points.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legend_frame_width: Option<f64>,
    /// Stroke width per operation name (for example `boxplot: 1.0`).
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub line_widths: BTreeMap<String, f64>,
}

/// Figure-level metadata.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct FigureMetadata {
    /// Figure title.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Figure caption.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Free-form statistics.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    /// Name of the style preset the figure was drawn with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style_ref: Option<String>,
}

impl FigureMetadata {
    fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// One subplot position with its recorded calls.
#[derive(Clone, Debug, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Panel {
    /// Grid position, derived from the document key.
    #[serde(skip)]
    pub pos: PanelPos,
    /// Drawing calls in invocation order.
    #[serde(default)]
    pub calls: Vec<CallRecord>,
    /// Decoration calls, replayed after `calls`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub decorations: Vec<CallRecord>,
    /// Panel caption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    /// Panel statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
}

impl Panel {
    /// Empty panel at `pos`.
    pub fn new(pos: PanelPos) -> Self {
        Self {
            pos,
            ..Self::default()
        }
    }

    /// Drawing calls followed by decorations.
    pub fn records(&self) -> impl Iterator<Item = &CallRecord> {
        self.calls.iter().chain(self.decorations.iter())
    }

    /// `true` if any record in this panel uses `id`.
    pub fn contains_id(&self, id: &str) -> bool {
        self.records().any(|r| r.id == id)
    }

    /// Record by id.
    pub fn record(&self, id: &str) -> Option<&CallRecord> {
        self.records().find(|r| r.id == id)
    }

    /// Mutable record by id.
    pub fn record_mut(&mut self, id: &str) -> Option<&mut CallRecord> {
        self.calls
            .iter_mut()
            .chain(self.decorations.iter_mut())
            .find(|r| r.id == id)
    }
}

/// One recorded invocation.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CallRecord {
    /// Stable id, unique within the panel.
    pub id: String,
    /// Operation name.
    #[serde(alias = "function")]
    pub operation: String,
    /// Positional arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<PositionalArg>,
    /// Keyword arguments.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub kwargs: BTreeMap<String, ArgumentSpec>,
    /// Per-call statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<serde_json::Value>,
    /// Recording time, RFC 3339.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl CallRecord {
    /// Resolve the operation against the supported set.
    pub fn op(&self) -> RecipeResult<Operation> {
        Operation::from_name(&self.operation)
            .ok_or_else(|| RecipeError::UnknownOperation(self.operation.clone()))
    }

    /// Argument spec by positional variable name or keyword.
    pub fn argument(&self, name: &str) -> Option<&ArgumentSpec> {
        self.args
            .iter()
            .find(|a| a.name == name)
            .map(|a| &a.spec)
            .or_else(|| self.kwargs.get(name))
    }

    fn specs(&self) -> impl Iterator<Item = &ArgumentSpec> {
        self.args.iter().map(|a| &a.spec).chain(self.kwargs.values())
    }

    fn specs_mut(&mut self) -> impl Iterator<Item = &mut ArgumentSpec> {
        self.args
            .iter_mut()
            .map(|a| &mut a.spec)
            .chain(self.kwargs.values_mut())
    }
}

static RECIPE_SEQ: AtomicU64 = AtomicU64::new(0);

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
}

impl Recipe {
    /// Empty recipe for a new figure.
    pub fn new(engine_version: impl Into<String>, figure: FigureConfig) -> Self {
        let created = now_rfc3339();
        let mut h = Fnv1a64::new_default();
        h.write_bytes(created.as_bytes());
        h.write_bytes(&RECIPE_SEQ.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        Self {
            schema_version: SCHEMA_VERSION.to_owned(),
            id: format!("fig_{:08x}", h.finish() as u32),
            created,
            engine_version: engine_version.into(),
            figure,
            metadata: FigureMetadata::default(),
            panels: IndexMap::new(),
            data: None,
            payloads: PayloadStore::default(),
        }
    }

    /// Panel at `pos`.
    pub fn panel(&self, pos: PanelPos) -> Option<&Panel> {
        self.panels.get(&pos.key())
    }

    /// Mutable panel at `pos`.
    pub fn panel_mut(&mut self, pos: PanelPos) -> Option<&mut Panel> {
        self.panels.get_mut(&pos.key())
    }

    /// Panel at `pos`, created empty if absent.
    pub fn panel_entry(&mut self, pos: PanelPos) -> &mut Panel {
        self.panels
            .entry(pos.key())
            .or_insert_with(|| Panel::new(pos))
    }

    /// Every `(panel key, record)` whose id equals `call_id`.
    pub fn find_calls(&self, call_id: &str) -> Vec<(&str, &CallRecord)> {
        self.panels
            .iter()
            .filter_map(|(k, p)| p.record(call_id).map(|r| (k.as_str(), r)))
            .collect()
    }

    /// Every external reference in the document.
    pub fn external_refs(&self) -> impl Iterator<Item = &ExternalRef> {
        self.panels
            .values()
            .flat_map(|p| p.records())
            .flat_map(CallRecord::specs)
            .filter_map(ArgumentSpec::as_external)
    }

    pub(crate) fn external_refs_mut(&mut self) -> impl Iterator<Item = &mut ExternalRef> {
        self.panels
            .values_mut()
            .flat_map(|p| p.calls.iter_mut().chain(p.decorations.iter_mut()))
            .flat_map(CallRecord::specs_mut)
            .filter_map(|s| match s {
                ArgumentSpec::External(r) => Some(r),
                _ => None,
            })
    }

    /// Total number of call and decoration records.
    pub fn record_count(&self) -> usize {
        self.panels
            .values()
            .map(|p| p.calls.len() + p.decorations.len())
            .sum()
    }

    /// Derive panel positions from keys and check structural invariants.
    pub(crate) fn link(&mut self) -> RecipeResult<()> {
        self.figure.validate()?;
        for (key, panel) in self.panels.iter_mut() {
            panel.pos = PanelPos::parse_key(key)?;
            let mut seen = std::collections::HashSet::new();
            for r in panel.calls.iter().chain(panel.decorations.iter()) {
                if !seen.insert(r.id.as_str()) {
                    return Err(RecipeError::DuplicateId {
                        id: r.id.clone(),
                        panel: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/recipe/model.rs"]
mod tests;
