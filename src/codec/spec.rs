use serde::Deserialize;

use crate::codec::value::{DType, NumArray, Value};

/// Address of an externalized numeric payload.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExternalRef {
    /// Payload file, relative to the document directory. Empty while the payload lives only in
    /// memory (before the first save).
    #[serde(default)]
    pub path: String,
    /// Column (or variable) name inside the payload.
    pub selector: String,
    /// Element dtype at recording time.
    pub dtype: DType,
    /// Array shape at recording time.
    pub shape: Vec<usize>,
    /// Group lengths when the payload is a flattened list of ragged groups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<usize>>,
}

impl ExternalRef {
    /// Number of elements stored for this reference.
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// `true` for a whole-file reference of an older document that loading has not read yet.
    ///
    /// Such references name a payload file but no column, and their shape is unknown.
    pub fn is_unresolved_file(&self) -> bool {
        self.selector.is_empty() && !self.path.is_empty()
    }
}

/// Encoded form of one call argument.
///
/// Keyword arguments also read the untagged form of older documents: any value that is not a
/// tagged entry is taken as inline.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "KwargRepr", into = "ArgSpecRepr")]
pub enum ArgumentSpec {
    /// Value stored directly in the document.
    Inline(Value),
    /// Value stored in an auxiliary payload file.
    External(ExternalRef),
    /// Result of an earlier call in the same panel, by call id.
    CallRef(String),
}

impl ArgumentSpec {
    /// Inline value, if this spec is inline.
    pub fn as_inline(&self) -> Option<&Value> {
        match self {
            Self::Inline(v) => Some(v),
            _ => None,
        }
    }

    /// External reference, if this spec is externalized.
    pub fn as_external(&self) -> Option<&ExternalRef> {
        match self {
            Self::External(r) => Some(r),
            _ => None,
        }
    }
}

/// Positional argument: a variable name plus its encoded value.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "ArgSpecRepr", into = "ArgSpecRepr")]
pub struct PositionalArg {
    /// Variable name (`x`, `y`, `height`, ...). Used for payload naming and editor addressing.
    pub name: String,
    /// Encoded value.
    pub spec: ArgumentSpec,
}

const TAGS: [&str; 3] = ["inline", "external", "ref"];
const PAYLOAD_EXTENSIONS: [&str; 3] = [".csv", ".npy", ".npz"];

/// Deserialize a field that is present, keeping an explicit `null` as [`Value::Null`].
fn present<'de, D: serde::Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    Value::deserialize(d).map(Some)
}

/// On-disk shape shared by keyword and positional arguments: exactly one of `inline`,
/// `external` or `ref`, plus a `name` for positional entries.
///
/// Older positional entries carry `data` (a value, a payload file name, or `{__ref__: id}`)
/// with an optional numpy `dtype` instead; they are read but never written.
#[derive(Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
struct ArgSpecRepr {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    inline: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    external: Option<ExternalRef>,
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    call_ref: Option<String>,
    #[serde(deserialize_with = "present", skip_serializing)]
    data: Option<Value>,
    #[serde(skip_serializing)]
    dtype: Option<Value>,
    #[serde(rename = "_is_array_list", skip_serializing)]
    array_list: bool,
}

impl ArgSpecRepr {
    fn into_spec(self) -> Result<(Option<String>, ArgumentSpec), String> {
        let name = self.name;
        let label = name.as_deref().map(|n| format!(" '{n}'")).unwrap_or_default();
        let spec = match (self.inline, self.external, self.call_ref, self.data) {
            (Some(v), None, None, None) => ArgumentSpec::Inline(v),
            (None, Some(r), None, None) => ArgumentSpec::External(r),
            (None, None, Some(id), None) => ArgumentSpec::CallRef(id),
            (None, None, None, Some(data)) => {
                let dtype = match self.dtype {
                    Some(Value::Str(s)) => Some(
                        DType::parse(&s).ok_or_else(|| format!("argument{label}: unknown dtype '{s}'"))?,
                    ),
                    _ => None,
                };
                untagged_spec(data, dtype, self.array_list)
                    .map_err(|e| format!("argument{label}: {e}"))?
            }
            (None, None, None, None) => {
                return Err(format!(
                    "argument{label} has none of inline/external/ref/data"
                ));
            }
            _ => {
                return Err(format!(
                    "argument{label} sets more than one of inline/external/ref/data"
                ));
            }
        };
        Ok((name, spec))
    }

    fn from_spec(name: Option<String>, spec: ArgumentSpec) -> Self {
        let mut out = Self {
            name,
            ..Self::default()
        };
        match spec {
            ArgumentSpec::Inline(v) => out.inline = Some(v),
            ArgumentSpec::External(r) => out.external = Some(r),
            ArgumentSpec::CallRef(id) => out.call_ref = Some(id),
        }
        out
    }
}

/// Spec for an untagged `data` entry.
///
/// A string naming a `.csv`, `.npy` or `.npz` file becomes an unresolved whole-file reference
/// (see [`ExternalRef::is_unresolved_file`]). Numeric data is converted to `dtype`; nested
/// lists with a dtype form a matrix unless they were recorded as a list of arrays.
fn untagged_spec(data: Value, dtype: Option<DType>, array_list: bool) -> Result<ArgumentSpec, String> {
    let value = match data {
        Value::Str(s) if s == "__FILE__" => {
            return Err("payload was never written".to_owned());
        }
        Value::Str(s) if PAYLOAD_EXTENSIONS.iter().any(|ext| s.ends_with(ext)) => {
            return Ok(ArgumentSpec::External(ExternalRef {
                path: s,
                selector: String::new(),
                dtype: dtype.unwrap_or(DType::Float64),
                shape: Vec::new(),
                groups: None,
            }));
        }
        Value::Map(m) if m.len() == 1 && m.contains_key("__ref__") => {
            return match m.get("__ref__") {
                Some(Value::Str(id)) => Ok(ArgumentSpec::CallRef(id.clone())),
                _ => Err("call reference must be a string".to_owned()),
            };
        }
        v => v,
    };
    let Some(dtype) = dtype else {
        return Ok(ArgumentSpec::Inline(value));
    };
    let cast = |a: &NumArray| a.cast(dtype).map_err(|e| e.to_string());
    let value = match value {
        Value::Array(a) => Value::Array(cast(&a)?),
        Value::Groups(groups) if !array_list && is_rectangular(&groups) => {
            let cols = groups[0].len();
            let flat = NumArray::concat(DType::Float64, &groups).map_err(|e| e.to_string())?;
            let matrix = flat
                .reshaped(vec![groups.len(), cols])
                .map_err(|e| e.to_string())?;
            Value::Array(cast(&matrix)?)
        }
        Value::Groups(groups) => Value::Groups(groups.iter().map(cast).collect::<Result<_, _>>()?),
        v => v,
    };
    Ok(ArgumentSpec::Inline(value))
}

fn is_rectangular(groups: &[NumArray]) -> bool {
    groups
        .first()
        .is_some_and(|g| !g.is_empty() && groups.iter().all(|o| o.len() == g.len()))
}

/// Keys of a tagged keyword entry.
#[derive(serde::Deserialize)]
#[serde(deny_unknown_fields)]
struct TaggedFields {
    #[serde(default, deserialize_with = "present")]
    inline: Option<Value>,
    #[serde(default)]
    external: Option<ExternalRef>,
    #[serde(default, rename = "ref")]
    call_ref: Option<String>,
}

/// Tagged keyword entry. Only mappings qualify; unknown keys make the entry a raw value.
struct TaggedKwarg(TaggedFields);

impl<'de> serde::Deserialize<'de> for TaggedKwarg {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        struct MapOnly;

        impl<'de> serde::de::Visitor<'de> for MapOnly {
            type Value = TaggedKwarg;

            fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str("a tagged argument mapping")
            }

            fn visit_map<A: serde::de::MapAccess<'de>>(self, map: A) -> Result<TaggedKwarg, A::Error> {
                TaggedFields::deserialize(serde::de::value::MapAccessDeserializer::new(map))
                    .map(TaggedKwarg)
            }
        }

        d.deserialize_map(MapOnly)
    }
}

#[derive(serde::Deserialize)]
#[serde(untagged)]
enum KwargRepr {
    Tagged(TaggedKwarg),
    Raw(Value),
}

impl TryFrom<KwargRepr> for ArgumentSpec {
    type Error = String;

    fn try_from(repr: KwargRepr) -> Result<Self, Self::Error> {
        match repr {
            // `{}` carries no tag and is the raw empty mapping.
            KwargRepr::Tagged(TaggedKwarg(TaggedFields {
                inline: None,
                external: None,
                call_ref: None,
            })) => Ok(Self::Inline(Value::Map(Default::default()))),
            KwargRepr::Tagged(TaggedKwarg(t)) => ArgSpecRepr {
                inline: t.inline,
                external: t.external,
                call_ref: t.call_ref,
                ..ArgSpecRepr::default()
            }
            .into_spec()
            .map(|(_, spec)| spec),
            KwargRepr::Raw(Value::Map(m)) if TAGS.iter().any(|t| m.contains_key(*t)) => Err(format!(
                "malformed argument entry with keys {}",
                m.keys().cloned().collect::<Vec<_>>().join(", ")
            )),
            KwargRepr::Raw(v) => Ok(Self::Inline(v)),
        }
    }
}

impl From<ArgumentSpec> for ArgSpecRepr {
    fn from(spec: ArgumentSpec) -> Self {
        Self::from_spec(None, spec)
    }
}

impl TryFrom<ArgSpecRepr> for PositionalArg {
    type Error = String;

    fn try_from(repr: ArgSpecRepr) -> Result<Self, Self::Error> {
        let (name, spec) = repr.into_spec()?;
        let name = name.ok_or_else(|| "positional argument is missing 'name'".to_owned())?;
        Ok(Self { name, spec })
    }
}

impl From<PositionalArg> for ArgSpecRepr {
    fn from(arg: PositionalArg) -> Self {
        Self::from_spec(Some(arg.name), arg.spec)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/spec.rs"]
mod tests;
