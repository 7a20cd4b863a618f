//! Minimal delimited-text tables for numeric payloads.
//!
//! Cells are kept as raw strings and converted per column dtype on access, so integer columns
//! never pass through `f64` and float columns keep their shortest round-trip text form.

use indexmap::IndexMap;

use crate::codec::value::{DType, NumArray, NumData};
use crate::foundation::error::{RecipeError, RecipeResult};

/// Parsed comma-separated table: header row plus string cells per column.
#[derive(Clone, Debug, Default)]
pub(crate) struct Table {
    columns: IndexMap<String, Vec<String>>,
}

impl Table {
    pub(crate) fn column(&self, name: &str) -> Option<&[String]> {
        self.columns.get(name).map(Vec::as_slice)
    }

    pub(crate) fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub(crate) fn insert(&mut self, name: String, cells: Vec<String>) {
        self.columns.insert(name, cells);
    }
}

/// Parse a table. Lines starting with `#` (legacy dtype headers) are skipped.
pub(crate) fn read_table(text: &str) -> RecipeResult<Table> {
    let mut lines = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim_start().starts_with('#'));
    let header = lines
        .find(|l| !l.trim().is_empty())
        .ok_or_else(|| RecipeError::serde("payload table has no header row"))?;
    let names: Vec<String> = header.split(',').map(|h| h.trim().to_owned()).collect();
    let mut cols: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let mut cells = line.split(',');
        for col in cols.iter_mut() {
            col.push(cells.next().unwrap_or("").trim().to_owned());
        }
    }
    let mut table = Table::default();
    for (name, cells) in names.into_iter().zip(cols) {
        if table.columns.contains_key(&name) {
            return Err(RecipeError::serde(format!(
                "payload table repeats column '{name}'"
            )));
        }
        table.columns.insert(name, cells);
    }
    Ok(table)
}

/// Render columns as a table. Shorter columns are padded with empty cells.
pub(crate) fn write_table(table: &Table) -> String {
    let rows = table.columns.values().map(Vec::len).max().unwrap_or(0);
    let mut out = String::new();
    out.push_str(
        &table
            .columns
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(","),
    );
    out.push('\n');
    for r in 0..rows {
        let row: Vec<&str> = table
            .columns
            .values()
            .map(|c| c.get(r).map(String::as_str).unwrap_or(""))
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Format every element of a flat array as a cell.
pub(crate) fn array_cells(arr: &NumArray) -> Vec<String> {
    match arr.data() {
        NumData::Float(v) => v.iter().map(|x| format!("{x}")).collect(),
        NumData::Int(v) => v.iter().map(|x| x.to_string()).collect(),
    }
}

/// Parse the first `count` cells of a column as `dtype`.
pub(crate) fn cells_to_array(
    cells: &[String],
    dtype: DType,
    count: usize,
    column: &str,
) -> RecipeResult<NumArray> {
    if cells.len() < count {
        return Err(RecipeError::schema_mismatch(format!(
            "column '{column}' holds {} values, expected {count}",
            cells.len()
        )));
    }
    let cells = &cells[..count];
    let bad = |cell: &str| {
        RecipeError::serde(format!(
            "column '{column}': cannot parse '{cell}' as {}",
            dtype.name()
        ))
    };
    let data = if dtype.is_float() {
        NumData::Float(
            cells
                .iter()
                .map(|c| {
                    if c.is_empty() {
                        Ok(f64::NAN)
                    } else {
                        c.parse::<f64>().map_err(|_| bad(c))
                    }
                })
                .collect::<RecipeResult<_>>()?,
        )
    } else {
        NumData::Int(
            cells
                .iter()
                .map(|c| c.parse::<i64>().map_err(|_| bad(c)))
                .collect::<RecipeResult<_>>()?,
        )
    };
    NumArray::new(dtype, vec![count], data)
}

/// Parse a headerless numeric file: one value per row for a vector, otherwise one row per
/// matrix row. Lines starting with `#` are skipped.
pub(crate) fn read_matrix(text: &str, source: &str) -> RecipeResult<NumArray> {
    let rows: Vec<Vec<&str>> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(|l| l.split(',').map(str::trim).collect())
        .collect();
    let cols = rows.first().map_or(1, Vec::len);
    if rows.iter().any(|r| r.len() != cols) {
        return Err(RecipeError::schema_mismatch(format!(
            "payload '{source}' has rows of different lengths"
        )));
    }
    let cells: Vec<String> = rows.iter().flatten().map(|c| (*c).to_owned()).collect();
    let flat = cells_to_array(&cells, DType::Float64, cells.len(), source)?;
    if cols == 1 {
        Ok(flat)
    } else {
        flat.reshaped(vec![rows.len(), cols])
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/csv.rs"]
mod tests;
