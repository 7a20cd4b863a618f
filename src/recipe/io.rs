use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::codec::csv::{Table, array_cells, write_table};
use crate::codec::npy::write_npy;
use crate::codec::spec::ArgumentSpec;
use crate::codec::value::NumArray;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::recipe::bundle;
use crate::recipe::model::{MergedData, Recipe, SCHEMA_MAJOR};

/// How externalized payloads are laid out on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadLayout {
    /// One file per column in `{stem}_data/`.
    #[default]
    Separate,
    /// One table `{stem}.csv` holding every column.
    Merged,
}

/// File format of separate payload files.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadFormat {
    /// Comma-separated text.
    #[default]
    Csv,
    /// `.npy` binary arrays.
    Npy,
}

/// Options for [`save_recipe`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SaveOpts {
    /// Payload layout.
    pub layout: PayloadLayout,
    /// Payload file format (separate layout only).
    pub format: PayloadFormat,
}

const DOC_EXTENSIONS: [&str; 2] = ["yaml", "yml"];
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "svg"];

impl Recipe {
    /// Parse a document, checking its schema version first.
    ///
    /// External payload paths stay relative; see [`load_recipe`] for resolving them.
    pub fn from_yaml_str(text: &str) -> RecipeResult<Self> {
        let mut raw: serde_yaml::Value = serde_yaml::from_str(text)
            .map_err(|e| RecipeError::serde(format!("invalid recipe document: {e}")))?;
        normalize_version(&mut raw)?;
        let mut recipe: Recipe = serde_yaml::from_value(raw)
            .map_err(|e| RecipeError::serde(format!("invalid recipe document: {e}")))?;
        if let Some(csv_path) = recipe.data.as_ref().map(|d| d.csv_path.clone()) {
            for r in recipe.external_refs_mut().filter(|r| r.path.is_empty()) {
                r.path = csv_path.clone();
            }
        }
        recipe.link()?;
        Ok(recipe)
    }

    /// Serialize the document (payload paths are written as they are).
    pub fn to_yaml_string(&self) -> RecipeResult<String> {
        serde_yaml::to_string(self)
            .map_err(|e| RecipeError::serde(format!("cannot serialize recipe: {e}")))
    }
}

/// Bring the version field to string form and reject unreadable major versions.
///
/// Documents without a version are read as `1.0`.
fn normalize_version(raw: &mut serde_yaml::Value) -> RecipeResult<()> {
    let map = raw
        .as_mapping_mut()
        .ok_or_else(|| RecipeError::serde("recipe document must be a mapping"))?;
    let key = ["figrecipe", "schema_version"]
        .into_iter()
        .find(|k| map.contains_key(*k))
        .unwrap_or("figrecipe");
    let found = match map.get(key) {
        None => "1.0".to_owned(),
        Some(serde_yaml::Value::String(s)) => s.clone(),
        Some(serde_yaml::Value::Number(n)) => {
            let s = n.to_string();
            if s.contains('.') { s } else { format!("{s}.0") }
        }
        Some(other) => {
            return Err(RecipeError::serde(format!(
                "schema version must be a string, got {other:?}"
            )));
        }
    };
    let major = found
        .split('.')
        .next()
        .and_then(|m| m.trim().parse::<u32>().ok());
    match major {
        Some(m) if (1..=SCHEMA_MAJOR).contains(&m) => {}
        _ => {
            return Err(RecipeError::UnsupportedVersion {
                found,
                supported: SCHEMA_MAJOR,
            });
        }
    }
    map.insert(key.into(), serde_yaml::Value::String(found));
    Ok(())
}

/// Load a recipe from a document, an image next to its document, a bundle directory, or a
/// `.zip` bundle.
#[tracing::instrument]
pub fn load_recipe(source: &Path) -> RecipeResult<Recipe> {
    if source.is_dir() || has_extension(source, &["zip"]) {
        return bundle::load_bundle(source);
    }
    let path = if has_extension(source, &IMAGE_EXTENSIONS) {
        sibling_document(source)?
    } else {
        source.to_path_buf()
    };
    load_document(&path)
}

/// Read one document file and point its payload store at the file's directory.
pub(crate) fn load_document(path: &Path) -> RecipeResult<Recipe> {
    if !path.is_file() {
        return Err(RecipeError::RecipeNotFound(path.display().to_string()));
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("read recipe '{}'", path.display()))?;
    let mut recipe = Recipe::from_yaml_str(&text)?;
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    recipe.payloads.set_base_dir(dir);
    adopt_payload_files(&mut recipe)?;
    tracing::debug!(path = %path.display(), records = recipe.record_count(), "loaded recipe");
    Ok(recipe)
}

/// Read whole-file payload references of older documents (`data: x_data/plot_000_x.csv`, or
/// the merged table named by the top-level `data` block) into memory.
fn adopt_payload_files(recipe: &mut Recipe) -> RecipeResult<()> {
    let Recipe {
        panels,
        payloads,
        data,
        ..
    } = recipe;
    let merged = data
        .as_ref()
        .filter(|d| d.csv_format == "single")
        .map(|d| d.csv_path.as_str());
    for panel in panels.values_mut() {
        let pos = panel.pos;
        for record in panel.calls.iter_mut().chain(panel.decorations.iter_mut()) {
            for arg in record.args.iter_mut() {
                let ArgumentSpec::External(r) = &mut arg.spec else {
                    continue;
                };
                if !r.is_unresolved_file() {
                    continue;
                }
                let in_table = merged == Some(r.path.as_str());
                payloads.adopt_file(r, pos, &record.id, &arg.name, in_table)?;
            }
        }
    }
    Ok(())
}

fn sibling_document(image: &Path) -> RecipeResult<PathBuf> {
    DOC_EXTENSIONS
        .iter()
        .map(|ext| image.with_extension(ext))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            RecipeError::RecipeNotFound(format!(
                "no .yaml or .yml document next to '{}'",
                image.display()
            ))
        })
}

pub(crate) fn has_extension(path: &Path, exts: &[&str]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| exts.iter().any(|x| x.eq_ignore_ascii_case(e)))
}

/// Write `recipe` to `path` with its payloads beside it. Returns the document path.
///
/// Every external reference is resolved first (from memory or from the files it was loaded
/// from), so a loaded recipe can be saved to a new location.
#[tracing::instrument(skip(recipe), fields(recipe = %recipe.id))]
pub fn save_recipe(recipe: &Recipe, path: &Path, opts: &SaveOpts) -> RecipeResult<PathBuf> {
    if opts.layout == PayloadLayout::Merged && opts.format == PayloadFormat::Npy {
        return Err(RecipeError::validation(
            "merged payload layout is only available as csv",
        ));
    }
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| RecipeError::validation(format!("invalid recipe path '{}'", path.display())))?
        .to_owned();

    let mut columns: BTreeMap<String, NumArray> = BTreeMap::new();
    for r in recipe.external_refs() {
        if !columns.contains_key(&r.selector) {
            columns.insert(r.selector.clone(), recipe.payloads.resolve(r)?);
        }
    }

    let mut doc = recipe.clone();
    doc.data = None;
    if !dir.as_os_str().is_empty() {
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("create directory '{}'", dir.display()))?;
    }
    if !columns.is_empty() {
        match opts.layout {
            PayloadLayout::Merged => {
                let rel = format!("{stem}.csv");
                let mut table = Table::default();
                for (selector, arr) in &columns {
                    table.insert(selector.clone(), array_cells(&arr.flattened()));
                }
                let target = dir.join(&rel);
                std::fs::write(&target, write_table(&table))
                    .with_context(|| format!("write payload table '{}'", target.display()))?;
                for r in doc.external_refs_mut() {
                    r.path = rel.clone();
                }
                doc.data = Some(MergedData {
                    csv_path: rel,
                    csv_format: "single".to_owned(),
                });
            }
            PayloadLayout::Separate => {
                let data_dir = format!("{stem}_data");
                std::fs::create_dir_all(dir.join(&data_dir))
                    .with_context(|| format!("create payload directory '{data_dir}'"))?;
                let ext = match opts.format {
                    PayloadFormat::Csv => "csv",
                    PayloadFormat::Npy => "npy",
                };
                for (selector, arr) in &columns {
                    let target = dir.join(&data_dir).join(format!("{selector}.{ext}"));
                    let bytes = match opts.format {
                        PayloadFormat::Csv => {
                            let mut table = Table::default();
                            table.insert(selector.clone(), array_cells(&arr.flattened()));
                            write_table(&table).into_bytes()
                        }
                        PayloadFormat::Npy => write_npy(arr),
                    };
                    std::fs::write(&target, bytes)
                        .with_context(|| format!("write payload '{}'", target.display()))?;
                }
                for r in doc.external_refs_mut() {
                    r.path = format!("{data_dir}/{}.{ext}", r.selector);
                }
            }
        }
    }

    std::fs::write(path, doc.to_yaml_string()?)
        .with_context(|| format!("write recipe '{}'", path.display()))?;
    tracing::debug!(path = %path.display(), payloads = columns.len(), "saved recipe");
    Ok(path.to_path_buf())
}

/// One call as listed by [`recipe_info`].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CallSummary {
    /// Panel key.
    pub panel: String,
    /// Call id.
    pub id: String,
    /// Operation name.
    pub function: String,
    /// Number of positional arguments.
    pub args: usize,
    /// Keyword names.
    pub kwargs: Vec<String>,
    /// `true` for decoration records.
    pub decoration: bool,
}

/// Summary of a recipe for inspection.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RecipeInfo {
    /// Recipe id.
    pub id: String,
    /// Creation timestamp.
    pub created: String,
    /// Engine version the recipe was recorded with.
    pub engine_version: String,
    /// Figure size in inches.
    pub size: [f64; 2],
    /// Resolution.
    pub dpi: f64,
    /// Number of panels with records.
    pub panel_count: usize,
    /// Every record in replay order.
    pub calls: Vec<CallSummary>,
}

/// Summarize `recipe`.
pub fn recipe_info(recipe: &Recipe) -> RecipeInfo {
    let calls = recipe
        .panels
        .iter()
        .flat_map(|(key, panel)| {
            let tag = |decoration: bool| {
                move |r: &crate::recipe::model::CallRecord| CallSummary {
                    panel: key.clone(),
                    id: r.id.clone(),
                    function: r.operation.clone(),
                    args: r.args.len(),
                    kwargs: r.kwargs.keys().cloned().collect(),
                    decoration,
                }
            };
            panel
                .calls
                .iter()
                .map(tag(false))
                .chain(panel.decorations.iter().map(tag(true)))
        })
        .collect();
    RecipeInfo {
        id: recipe.id.clone(),
        created: recipe.created.clone(),
        engine_version: recipe.engine_version.clone(),
        size: recipe.figure.size,
        dpi: recipe.figure.dpi,
        panel_count: recipe.panels.len(),
        calls,
    }
}

impl std::fmt::Display for RecipeInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "recipe   {}", self.id)?;
        writeln!(f, "created  {}", self.created)?;
        writeln!(f, "engine   {}", self.engine_version)?;
        writeln!(
            f,
            "figure   {}x{} in @ {} dpi, {} panel(s)",
            self.size[0], self.size[1], self.dpi, self.panel_count
        )?;
        for c in &self.calls {
            let kind = if c.decoration { "deco" } else { "call" };
            write!(f, "  {} {kind} {} = {}({} args", c.panel, c.id, c.function, c.args)?;
            if !c.kwargs.is_empty() {
                write!(f, "; {}", c.kwargs.join(", "))?;
            }
            writeln!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/recipe/io.rs"]
mod tests;
