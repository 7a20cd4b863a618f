use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::codec::csv::{Table, cells_to_array, read_matrix, read_table};
use crate::codec::npy::read_npy;
use crate::codec::spec::ExternalRef;
use crate::codec::value::{DType, NumArray};
use crate::foundation::core::PanelPos;
use crate::foundation::error::{RecipeError, RecipeResult};

/// Lowercase an id and reduce it to alphanumerics separated by single hyphens.
///
/// An id with no alphanumerics at all becomes `unnamed`.
pub fn sanitize_id(id: &str) -> String {
    let mut out = String::with_capacity(id.len());
    for ch in id.chars().flat_map(char::to_lowercase) {
        if ch.is_ascii_alphanumeric() {
            out.push(ch);
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    let trimmed = out.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_owned()
    } else {
        trimmed.to_owned()
    }
}

/// Short payload column key: `r{row}c{col}_{sanitized-call-id}_{variable}`.
pub fn column_key(panel: PanelPos, call_id: &str, variable: &str) -> String {
    format!(
        "r{}c{}_{}_{}",
        panel.row,
        panel.col,
        sanitize_id(call_id),
        variable.to_lowercase()
    )
}

/// Verbose column key written by older documents.
pub fn legacy_column_key(panel: PanelPos, call_id: &str, variable: &str) -> String {
    format!(
        "ax-row-{}-col-{}_trace-id-{}_variable-{}",
        panel.row, panel.col, call_id, variable
    )
}

/// Map a legacy column name onto the short key it corresponds to.
pub fn legacy_to_short(name: &str) -> Option<String> {
    let rest = name.strip_prefix("ax-row-")?;
    let (row, rest) = rest.split_once("-col-")?;
    let (col, rest) = rest.split_once("_trace-id-")?;
    let (call_id, variable) = rest.rsplit_once("_variable-")?;
    let panel = PanelPos::new(row.parse().ok()?, col.parse().ok()?);
    Some(column_key(panel, call_id, variable))
}

#[derive(Debug)]
enum PayloadFile {
    Table { table: Table, aliases: HashMap<String, String> },
    Array(NumArray),
}

impl PayloadFile {
    fn from_path(path: &Path) -> RecipeResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            RecipeError::missing_payload(format!("cannot read '{}': {e}", path.display()))
        })?;
        if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("npy")) {
            return Ok(Self::Array(read_npy(&bytes)?));
        }
        let text = String::from_utf8(bytes).map_err(|e| {
            RecipeError::serde(format!("payload '{}' is not utf-8: {e}", path.display()))
        })?;
        let table = read_table(&text)?;
        let aliases = table
            .column_names()
            .filter_map(|name| legacy_to_short(name).map(|short| (short, name.to_owned())))
            .collect();
        Ok(Self::Table { table, aliases })
    }
}

#[derive(Clone, Debug)]
struct Column {
    data: NumArray,
    owner: (String, String),
}

/// Numeric payloads backing a recipe's external references.
///
/// Columns recorded (or edited) in this process are held in memory by selector and take
/// precedence. Everything else is read lazily from files relative to `base_dir` and cached.
#[derive(Debug, Default)]
pub struct PayloadStore {
    base_dir: Option<PathBuf>,
    columns: HashMap<String, Column>,
    files: Mutex<HashMap<PathBuf, Arc<PayloadFile>>>,
}

impl Clone for PayloadStore {
    fn clone(&self) -> Self {
        let files = self.files.lock().unwrap_or_else(|p| p.into_inner()).clone();
        Self {
            base_dir: self.base_dir.clone(),
            columns: self.columns.clone(),
            files: Mutex::new(files),
        }
    }
}

impl PayloadStore {
    /// Store reading files relative to `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: Some(base_dir.into()),
            ..Self::default()
        }
    }

    /// Directory payload paths are resolved against.
    pub fn base_dir(&self) -> Option<&Path> {
        self.base_dir.as_deref()
    }

    pub(crate) fn set_base_dir(&mut self, dir: impl Into<PathBuf>) {
        self.base_dir = Some(dir.into());
        self.files.lock().unwrap_or_else(|p| p.into_inner()).clear();
    }

    /// Pick a selector for `(panel, call_id, variable)` that no other argument owns.
    ///
    /// Re-claiming for the same call and variable returns the same key, so edits overwrite.
    pub fn claim_selector(&self, panel: PanelPos, call_id: &str, variable: &str) -> String {
        let base = column_key(panel, call_id, variable);
        let owner = (format!("{panel}/{call_id}"), variable.to_owned());
        let mut key = base.clone();
        let mut n = 2;
        while let Some(col) = self.columns.get(&key) {
            if col.owner == owner {
                break;
            }
            key = format!(
                "r{}c{}_{}-{n}_{}",
                panel.row,
                panel.col,
                sanitize_id(call_id),
                variable.to_lowercase()
            );
            n += 1;
        }
        key
    }

    /// Hold a flat column in memory under `selector`.
    pub fn insert_column(
        &mut self,
        selector: String,
        panel: PanelPos,
        call_id: &str,
        variable: &str,
        data: NumArray,
    ) {
        let owner = (format!("{panel}/{call_id}"), variable.to_owned());
        self.columns.insert(selector, Column { data, owner });
    }

    /// Forget every in-memory column owned by `call_id` in `panel`.
    pub(crate) fn drop_owned_by(&mut self, panel: PanelPos, call_id: &str) {
        let owner = format!("{panel}/{call_id}");
        self.columns.retain(|_, col| col.owner.0 != owner);
    }

    /// `true` when `selector` is held in memory.
    pub fn holds(&self, selector: &str) -> bool {
        self.columns.contains_key(selector)
    }

    /// Resolve a reference to its array, shaped as recorded.
    ///
    /// Fails with [`RecipeError::MissingPayload`] when the file is absent and with
    /// [`RecipeError::SchemaMismatch`] when the file lacks the selector.
    pub fn resolve(&self, r: &ExternalRef) -> RecipeResult<NumArray> {
        if r.is_unresolved_file() {
            return Err(RecipeError::missing_payload(format!(
                "payload file '{}' has not been read; load the document from its file",
                r.path
            )));
        }
        let count = r.element_count();
        if let Some(col) = self.columns.get(&r.selector) {
            if col.data.len() != count {
                return Err(RecipeError::schema_mismatch(format!(
                    "column '{}' holds {} values, expected {count}",
                    r.selector,
                    col.data.len()
                )));
            }
            return col.data.clone().reshaped(r.shape.clone());
        }
        if r.path.is_empty() {
            return Err(RecipeError::missing_payload(format!(
                "column '{}' is not held in memory and has no payload file",
                r.selector
            )));
        }
        let file = self.file(&r.path)?;
        let flat = match file.as_ref() {
            PayloadFile::Array(arr) => {
                if arr.len() != count {
                    return Err(RecipeError::schema_mismatch(format!(
                        "payload '{}' holds {} values, expected {count}",
                        r.path,
                        arr.len()
                    )));
                }
                arr.flattened()
            }
            PayloadFile::Table { table, aliases } => {
                let name = if table.column(&r.selector).is_some() {
                    r.selector.as_str()
                } else {
                    aliases.get(&r.selector).map(String::as_str).ok_or_else(|| {
                        RecipeError::schema_mismatch(format!(
                            "payload '{}' has no column '{}' (columns: {})",
                            r.path,
                            r.selector,
                            table.column_names().collect::<Vec<_>>().join(", ")
                        ))
                    })?
                };
                let cells = table.column(name).unwrap_or_default();
                cells_to_array(cells, r.dtype, count, name)?
            }
        };
        if flat.dtype() != r.dtype {
            return Err(RecipeError::schema_mismatch(format!(
                "payload '{}' stores {}, reference expects {}",
                r.path,
                flat.dtype().name(),
                r.dtype.name()
            )));
        }
        flat.reshaped(r.shape.clone())
    }

    /// Load every referenced payload into memory so the files are no longer needed.
    ///
    /// References that fail to resolve are left alone; decoding reports them later.
    pub(crate) fn materialize<'a>(&mut self, refs: impl IntoIterator<Item = &'a ExternalRef>) {
        let mut loaded = Vec::new();
        for r in refs {
            match self.resolve(r) {
                Ok(arr) => loaded.push((r.selector.clone(), arr.flattened())),
                Err(e) => tracing::debug!(selector = %r.selector, "payload not materialized: {e}"),
            }
        }
        for (selector, data) in loaded {
            let owner = (String::new(), selector.clone());
            self.columns.insert(selector, Column { data, owner });
        }
    }

    /// Read the file behind an unresolved whole-file reference into memory and point `r` at
    /// the claimed column.
    ///
    /// With `merged` set the file is the figure's single table: the column is found by its
    /// short or legacy key and trailing padding is dropped. Otherwise the whole file is the
    /// array (`.npy`, or headerless csv).
    pub(crate) fn adopt_file(
        &mut self,
        r: &mut ExternalRef,
        panel: PanelPos,
        call_id: &str,
        variable: &str,
        merged: bool,
    ) -> RecipeResult<()> {
        let arr = if merged {
            self.merged_column(&r.path, panel, call_id, variable)?
        } else {
            self.whole_file(&r.path)?
        };
        let arr = arr.cast(r.dtype)?;
        let selector = self.claim_selector(panel, call_id, variable);
        tracing::debug!(path = %r.path, %selector, "adopted payload file");
        r.path.clear();
        r.selector = selector.clone();
        r.shape = arr.shape().to_vec();
        r.groups = None;
        self.insert_column(selector, panel, call_id, variable, arr.flattened());
        Ok(())
    }

    fn merged_column(
        &self,
        rel: &str,
        panel: PanelPos,
        call_id: &str,
        variable: &str,
    ) -> RecipeResult<NumArray> {
        let file = self.file(rel)?;
        let PayloadFile::Table { table, aliases } = file.as_ref() else {
            return Err(RecipeError::schema_mismatch(format!(
                "merged payload '{rel}' is not a table"
            )));
        };
        let key = column_key(panel, call_id, variable);
        let cells = table
            .column(&key)
            .or_else(|| aliases.get(&key).and_then(|name| table.column(name)))
            .ok_or_else(|| {
                RecipeError::schema_mismatch(format!("merged payload '{rel}' has no column '{key}'"))
            })?;
        let end = cells
            .iter()
            .rposition(|c| !(c.is_empty() || c.eq_ignore_ascii_case("nan")))
            .map_or(0, |i| i + 1);
        cells_to_array(&cells[..end], DType::Float64, end, &key)
    }

    fn whole_file(&self, rel: &str) -> RecipeResult<NumArray> {
        let path = self.locate(rel);
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ext == "npz" {
            return Err(RecipeError::schema_mismatch(format!(
                "payload '{rel}': .npz archives are not supported"
            )));
        }
        let bytes = std::fs::read(&path).map_err(|e| {
            RecipeError::missing_payload(format!("cannot read '{}': {e}", path.display()))
        })?;
        if ext == "npy" {
            return read_npy(&bytes);
        }
        let text = String::from_utf8(bytes).map_err(|e| {
            RecipeError::serde(format!("payload '{}' is not utf-8: {e}", path.display()))
        })?;
        read_matrix(&text, rel)
    }

    fn locate(&self, rel: &str) -> PathBuf {
        match &self.base_dir {
            Some(dir) => dir.join(rel),
            None => PathBuf::from(rel),
        }
    }

    fn file(&self, rel: &str) -> RecipeResult<Arc<PayloadFile>> {
        let path = self.locate(rel);
        let mut files = self.files.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(f) = files.get(&path) {
            return Ok(Arc::clone(f));
        }
        if !path.is_file() {
            return Err(RecipeError::missing_payload(format!(
                "payload file '{}' does not exist",
                path.display()
            )));
        }
        let f = Arc::new(PayloadFile::from_path(&path)?);
        files.insert(path, Arc::clone(&f));
        Ok(f)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/payload.rs"]
mod tests;
