use std::collections::BTreeMap;

use serde::ser::{SerializeMap, SerializeSeq};

use crate::foundation::error::{RecipeError, RecipeResult};
use crate::render::backend::Handle;

/// Element type of a numeric array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    /// 64-bit float.
    Float64,
    /// 32-bit float (values held widened to `f64`).
    Float32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit signed integer.
    Int32,
    /// Unsigned byte.
    Uint8,
}

impl DType {
    /// `true` for floating-point dtypes.
    pub fn is_float(self) -> bool {
        matches!(self, Self::Float64 | Self::Float32)
    }

    /// Name used in documents and payload headers.
    pub fn name(self) -> &'static str {
        match self {
            Self::Float64 => "float64",
            Self::Float32 => "float32",
            Self::Int64 => "int64",
            Self::Int32 => "int32",
            Self::Uint8 => "uint8",
        }
    }

    /// Parse a dtype name.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "float64" | "f8" | "<f8" => Some(Self::Float64),
            "float32" | "f4" | "<f4" => Some(Self::Float32),
            "int64" | "i8" | "<i8" => Some(Self::Int64),
            "int32" | "i4" | "<i4" => Some(Self::Int32),
            "uint8" | "u1" | "|u1" => Some(Self::Uint8),
            _ => None,
        }
    }
}

/// Flat element storage of a [`NumArray`].
#[derive(Clone, Debug, PartialEq)]
pub enum NumData {
    /// Float elements (used by float dtypes).
    Float(Vec<f64>),
    /// Integer elements (used by integer dtypes).
    Int(Vec<i64>),
}

impl NumData {
    fn len(&self) -> usize {
        match self {
            Self::Float(v) => v.len(),
            Self::Int(v) => v.len(),
        }
    }
}

/// A dense, row-major numeric array with an explicit dtype and shape.
#[derive(Clone, Debug, PartialEq)]
pub struct NumArray {
    dtype: DType,
    shape: Vec<usize>,
    data: NumData,
}

impl NumArray {
    /// Build an array, checking that dtype, shape and storage agree.
    pub fn new(dtype: DType, shape: Vec<usize>, data: NumData) -> RecipeResult<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(RecipeError::validation(format!(
                "array shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        let storage_ok = match &data {
            NumData::Float(_) => dtype.is_float(),
            NumData::Int(_) => !dtype.is_float(),
        };
        if !storage_ok {
            return Err(RecipeError::validation(format!(
                "dtype {} does not match element storage",
                dtype.name()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    /// 1-D float64 array.
    pub fn from_f64(values: Vec<f64>) -> Self {
        Self {
            dtype: DType::Float64,
            shape: vec![values.len()],
            data: NumData::Float(values),
        }
    }

    /// 1-D int64 array.
    pub fn from_i64(values: Vec<i64>) -> Self {
        Self {
            dtype: DType::Int64,
            shape: vec![values.len()],
            data: NumData::Int(values),
        }
    }

    /// 2-D float64 array from row-major data.
    pub fn matrix_f64(rows: usize, cols: usize, values: Vec<f64>) -> RecipeResult<Self> {
        Self::new(DType::Float64, vec![rows, cols], NumData::Float(values))
    }

    /// Element dtype.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Array shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Element storage.
    pub fn data(&self) -> &NumData {
        &self.data
    }

    /// Total element count.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` when the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Elements widened to `f64`.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        match &self.data {
            NumData::Float(v) => v.clone(),
            NumData::Int(v) => v.iter().map(|&x| x as f64).collect(),
        }
    }

    /// Same elements reshaped to 1-D.
    pub fn flattened(&self) -> Self {
        Self {
            dtype: self.dtype,
            shape: vec![self.len()],
            data: self.data.clone(),
        }
    }

    /// Reinterpret with a new shape of the same element count.
    pub fn reshaped(self, shape: Vec<usize>) -> RecipeResult<Self> {
        Self::new(self.dtype, shape, self.data)
    }

    /// Same elements converted to `dtype`. Floats only convert to integers when integral.
    pub(crate) fn cast(&self, dtype: DType) -> RecipeResult<Self> {
        if dtype == self.dtype {
            return Ok(self.clone());
        }
        let data = match (&self.data, dtype.is_float()) {
            (_, true) => NumData::Float(self.to_f64_vec()),
            (NumData::Int(v), false) => NumData::Int(v.clone()),
            (NumData::Float(v), false) => NumData::Int(
                v.iter()
                    .map(|&x| {
                        if x.is_finite() && x.fract() == 0.0 {
                            Ok(x as i64)
                        } else {
                            Err(RecipeError::validation(format!(
                                "{x} cannot be stored as {}",
                                dtype.name()
                            )))
                        }
                    })
                    .collect::<RecipeResult<_>>()?,
            ),
        };
        Self::new(dtype, self.shape.clone(), data)
    }

    /// Contiguous sub-range `[start, end)` of a 1-D view.
    pub(crate) fn slice(&self, start: usize, end: usize) -> Self {
        let data = match &self.data {
            NumData::Float(v) => NumData::Float(v[start..end].to_vec()),
            NumData::Int(v) => NumData::Int(v[start..end].to_vec()),
        };
        Self {
            dtype: self.dtype,
            shape: vec![end - start],
            data,
        }
    }

    /// Concatenate 1-D arrays of a common dtype.
    pub(crate) fn concat(dtype: DType, parts: &[NumArray]) -> RecipeResult<Self> {
        let total: usize = parts.iter().map(NumArray::len).sum();
        let data = if dtype.is_float() {
            let mut out = Vec::with_capacity(total);
            for p in parts {
                out.extend(p.to_f64_vec());
            }
            NumData::Float(out)
        } else {
            let mut out = Vec::with_capacity(total);
            for p in parts {
                match &p.data {
                    NumData::Int(v) => out.extend_from_slice(v),
                    NumData::Float(_) => {
                        return Err(RecipeError::validation(
                            "cannot concatenate float group into integer payload",
                        ));
                    }
                }
            }
            NumData::Int(out)
        };
        Self::new(dtype, vec![total], data)
    }

    /// `true` when this array serializes as a bare YAML sequence.
    ///
    /// A bare empty sequence reads back as `float64`, so empty arrays of other dtypes stay tagged.
    fn is_plain(&self) -> bool {
        self.shape.len() == 1
            && match self.dtype {
                DType::Float64 => true,
                DType::Int64 => !self.is_empty(),
                _ => false,
            }
    }
}

/// A recorded argument value.
///
/// The variants are explicit so that shape-dependent cases never rely on runtime inspection:
/// ragged grouped samples stay [`Value::Groups`], and a sequence of colors stays
/// [`Value::Colors`] even when it holds a single entry.
#[derive(Clone, Debug, PartialEq, Default)]
pub enum Value {
    /// Absent value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Float scalar.
    Float(f64),
    /// String scalar.
    Str(String),
    /// Dense numeric array.
    Array(NumArray),
    /// List of 1-D numeric sequences that may differ in length.
    Groups(Vec<NumArray>),
    /// Sequence of color values.
    Colors(Vec<String>),
    /// Heterogeneous list.
    List(Vec<Value>),
    /// String-keyed mapping.
    Map(BTreeMap<String, Value>),
    /// Result of an earlier call on the live canvas. Only exists at runtime.
    Handle(Handle),
}

impl Value {
    /// 1-D float64 array value.
    pub fn floats(values: impl Into<Vec<f64>>) -> Self {
        Self::Array(NumArray::from_f64(values.into()))
    }

    /// 1-D int64 array value.
    pub fn ints(values: impl Into<Vec<i64>>) -> Self {
        Self::Array(NumArray::from_i64(values.into()))
    }

    /// String value.
    pub fn str(s: impl Into<String>) -> Self {
        Self::Str(s.into())
    }

    /// Grouped float samples.
    pub fn groups(groups: Vec<Vec<f64>>) -> Self {
        Self::Groups(groups.into_iter().map(NumArray::from_f64).collect())
    }

    /// Sequence of colors.
    pub fn colors<S: Into<String>>(colors: impl IntoIterator<Item = S>) -> Self {
        Self::Colors(colors.into_iter().map(Into::into).collect())
    }

    /// Scalar as `f64`, if numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// String content, if a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean content, if a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric sequence widened to `f64` (arrays, numeric lists, or a lone scalar).
    pub fn to_f64_vec(&self) -> Option<Vec<f64>> {
        match self {
            Self::Array(a) => Some(a.to_f64_vec()),
            Self::List(items) => items.iter().map(Value::as_f64).collect(),
            Self::Int(_) | Self::Float(_) => self.as_f64().map(|v| vec![v]),
            _ => None,
        }
    }

    /// Number of numeric elements carried by this value (`0` for non-array values).
    pub fn element_count(&self) -> usize {
        match self {
            Self::Array(a) => a.len(),
            Self::Groups(g) => g.iter().map(NumArray::len).sum(),
            _ => 0,
        }
    }

    /// Short type tag used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Array(_) => "array",
            Self::Groups(_) => "groups",
            Self::Colors(_) => "colors",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Handle(_) => "handle",
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Self::floats(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Self::ints(v)
    }
}

impl From<NumArray> for Value {
    fn from(v: NumArray) -> Self {
        Self::Array(v)
    }
}

impl From<Handle> for Value {
    fn from(v: Handle) -> Self {
        Self::Handle(v)
    }
}

struct DataSeq<'a>(&'a NumData);

impl serde::Serialize for DataSeq<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            NumData::Float(v) => serializer.collect_seq(v),
            NumData::Int(v) => serializer.collect_seq(v),
        }
    }
}

impl serde::Serialize for NumArray {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_plain() {
            return DataSeq(&self.data).serialize(serializer);
        }
        let mut m = serializer.serialize_map(Some(3))?;
        m.serialize_entry("dtype", &self.dtype)?;
        m.serialize_entry("shape", &self.shape)?;
        m.serialize_entry("data", &DataSeq(&self.data))?;
        m.end()
    }
}

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(i) => serializer.serialize_i64(*i),
            Self::Float(f) => serializer.serialize_f64(*f),
            Self::Str(s) => serializer.serialize_str(s),
            Self::Array(a) => a.serialize(serializer),
            Self::Groups(groups) => {
                let mut seq = serializer.serialize_seq(Some(groups.len()))?;
                for g in groups {
                    seq.serialize_element(g)?;
                }
                seq.end()
            }
            Self::Colors(colors) => {
                let mut m = serializer.serialize_map(Some(1))?;
                m.serialize_entry("colors", colors)?;
                m.end()
            }
            Self::List(items) => serializer.collect_seq(items),
            Self::Map(map) => serializer.collect_map(map),
            Self::Handle(_) => Err(serde::ser::Error::custom(
                "runtime handles cannot be serialized; record them as call references",
            )),
        }
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ValueRepr {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<ValueRepr>),
    Map(BTreeMap<String, ValueRepr>),
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = ValueRepr::deserialize(deserializer)?;
        from_repr(repr).map_err(serde::de::Error::custom)
    }
}

fn from_repr(repr: ValueRepr) -> Result<Value, String> {
    Ok(match repr {
        ValueRepr::Null => Value::Null,
        ValueRepr::Bool(b) => Value::Bool(b),
        ValueRepr::Int(i) => Value::Int(i),
        ValueRepr::Float(f) => Value::Float(f),
        ValueRepr::Str(s) => Value::Str(s),
        ValueRepr::Seq(items) => seq_value(items)?,
        ValueRepr::Map(map) => map_value(map)?,
    })
}

/// Bare numeric sequence as an array: `int64` when every element is an integer, `float64`
/// otherwise and when empty.
fn numeric_seq(items: &[ValueRepr]) -> Option<NumArray> {
    let mut any_float = items.is_empty();
    for it in items {
        match it {
            ValueRepr::Int(_) => {}
            ValueRepr::Float(_) => any_float = true,
            _ => return None,
        }
    }
    if any_float {
        let v = items
            .iter()
            .map(|it| match it {
                ValueRepr::Int(i) => *i as f64,
                ValueRepr::Float(f) => *f,
                _ => f64::NAN,
            })
            .collect();
        Some(NumArray::from_f64(v))
    } else {
        let v = items
            .iter()
            .map(|it| match it {
                ValueRepr::Int(i) => *i,
                _ => 0,
            })
            .collect();
        Some(NumArray::from_i64(v))
    }
}

fn seq_value(items: Vec<ValueRepr>) -> Result<Value, String> {
    if let Some(arr) = numeric_seq(&items) {
        return Ok(Value::Array(arr));
    }
    let nested: Option<Vec<NumArray>> = items
        .iter()
        .map(|it| match it {
            ValueRepr::Seq(inner) => numeric_seq(inner),
            ValueRepr::Map(m) if is_array_map(m) => tagged_array(m).ok(),
            _ => None,
        })
        .collect();
    if let Some(groups) = nested {
        return Ok(Value::Groups(groups));
    }
    items
        .into_iter()
        .map(from_repr)
        .collect::<Result<Vec<_>, _>>()
        .map(Value::List)
}

fn is_array_map(m: &BTreeMap<String, ValueRepr>) -> bool {
    m.len() == 3 && m.contains_key("dtype") && m.contains_key("shape") && m.contains_key("data")
}

fn tagged_array(m: &BTreeMap<String, ValueRepr>) -> Result<NumArray, String> {
    let dtype = match m.get("dtype") {
        Some(ValueRepr::Str(s)) => DType::parse(s).ok_or_else(|| format!("unknown dtype '{s}'"))?,
        _ => return Err("array dtype must be a string".to_owned()),
    };
    let shape = match m.get("shape") {
        Some(ValueRepr::Seq(dims)) => dims
            .iter()
            .map(|d| match d {
                ValueRepr::Int(i) if *i >= 0 => Ok(*i as usize),
                _ => Err("array shape must hold non-negative integers".to_owned()),
            })
            .collect::<Result<Vec<_>, _>>()?,
        _ => return Err("array shape must be a sequence".to_owned()),
    };
    let items = match m.get("data") {
        Some(ValueRepr::Seq(items)) => items,
        _ => return Err("array data must be a sequence".to_owned()),
    };
    let data = if dtype.is_float() {
        NumData::Float(
            items
                .iter()
                .map(|it| match it {
                    ValueRepr::Int(i) => Ok(*i as f64),
                    ValueRepr::Float(f) => Ok(*f),
                    _ => Err("float array holds a non-numeric element".to_owned()),
                })
                .collect::<Result<_, _>>()?,
        )
    } else {
        NumData::Int(
            items
                .iter()
                .map(|it| match it {
                    ValueRepr::Int(i) => Ok(*i),
                    _ => Err("integer array holds a non-integer element".to_owned()),
                })
                .collect::<Result<_, _>>()?,
        )
    };
    NumArray::new(dtype, shape, data).map_err(|e| e.to_string())
}

fn map_value(map: BTreeMap<String, ValueRepr>) -> Result<Value, String> {
    if is_array_map(&map) {
        return tagged_array(&map).map(Value::Array);
    }
    if map.len() == 1 {
        if let Some(ValueRepr::Seq(items)) = map.get("colors") {
            let colors: Option<Vec<String>> = items
                .iter()
                .map(|it| match it {
                    ValueRepr::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect();
            if let Some(colors) = colors {
                return Ok(Value::Colors(colors));
            }
        }
    }
    map.into_iter()
        .map(|(k, v)| from_repr(v).map(|v| (k, v)))
        .collect::<Result<BTreeMap<_, _>, _>>()
        .map(Value::Map)
}

#[cfg(test)]
#[path = "../../tests/unit/codec/value.rs"]
mod tests;
