use crate::codec::payload::PayloadStore;
use crate::codec::spec::{ArgumentSpec, ExternalRef};
use crate::codec::value::{NumArray, Value};
use crate::foundation::core::PanelPos;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::live::CallIndex;

/// Keywords whose value is always a sequence of colors, never a single color.
pub const COLOR_LIST_KEYWORDS: &[&str] = &["colors"];

/// Default element count above which arrays are stored outside the document.
pub const DEFAULT_INLINE_THRESHOLD: usize = 100;

/// Encoding policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CodecOpts {
    /// Arrays with more elements than this are externalized.
    pub inline_threshold: usize,
}

impl Default for CodecOpts {
    fn default() -> Self {
        Self {
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }
}

/// Everything needed to encode the arguments of one call.
pub struct Encoder<'a> {
    /// Policy.
    pub opts: CodecOpts,
    /// Panel the call belongs to.
    pub panel: PanelPos,
    /// Id of the call being encoded.
    pub call_id: &'a str,
    /// Destination for externalized payloads.
    pub payloads: &'a mut PayloadStore,
    /// Handle lookup for cross-call references.
    pub index: &'a CallIndex,
}

impl Encoder<'_> {
    /// Encode one argument named `name`.
    pub fn encode(&mut self, name: &str, value: Value) -> RecipeResult<ArgumentSpec> {
        let value = if COLOR_LIST_KEYWORDS.contains(&name) {
            as_color_list(value)?
        } else {
            value
        };
        match value {
            Value::Handle(h) => {
                let origin = self.index.origin(h).ok_or_else(|| {
                    RecipeError::validation(format!(
                        "argument '{name}' of '{}' is a handle from an untracked call",
                        self.call_id
                    ))
                })?;
                if origin.panel != self.panel {
                    return Err(RecipeError::validation(format!(
                        "argument '{name}' of '{}' references call '{}' in another panel",
                        self.call_id, origin.call_id
                    )));
                }
                Ok(ArgumentSpec::CallRef(origin.call_id.clone()))
            }
            Value::Array(arr) if arr.len() > self.opts.inline_threshold => {
                let shape = arr.shape().to_vec();
                let dtype = arr.dtype();
                let selector = self.store(name, arr.flattened());
                Ok(ArgumentSpec::External(ExternalRef {
                    path: String::new(),
                    selector,
                    dtype,
                    shape,
                    groups: None,
                }))
            }
            Value::Groups(groups) if total_len(&groups) > self.opts.inline_threshold => {
                let dtype = common_dtype(&groups);
                let lengths = groups.iter().map(NumArray::len).collect();
                let flat = NumArray::concat(dtype, &groups)?;
                let shape = vec![flat.len()];
                let selector = self.store(name, flat);
                Ok(ArgumentSpec::External(ExternalRef {
                    path: String::new(),
                    selector,
                    dtype,
                    shape,
                    groups: Some(lengths),
                }))
            }
            v if contains_handle(&v) => Err(RecipeError::validation(format!(
                "argument '{name}' of '{}' nests a handle; pass handles directly",
                self.call_id
            ))),
            v => Ok(ArgumentSpec::Inline(v)),
        }
    }

    fn store(&mut self, name: &str, flat: NumArray) -> String {
        let selector = self.payloads.claim_selector(self.panel, self.call_id, name);
        tracing::debug!(
            call_id = self.call_id,
            arg = name,
            len = flat.len(),
            selector = %selector,
            "externalizing argument"
        );
        self.payloads
            .insert_column(selector.clone(), self.panel, self.call_id, name, flat);
        selector
    }
}

fn total_len(groups: &[NumArray]) -> usize {
    groups.iter().map(NumArray::len).sum()
}

fn common_dtype(groups: &[NumArray]) -> crate::codec::value::DType {
    use crate::codec::value::DType;
    let first = groups.first().map(NumArray::dtype).unwrap_or(DType::Float64);
    if groups.iter().all(|g| g.dtype() == first) {
        first
    } else {
        DType::Float64
    }
}

fn contains_handle(v: &Value) -> bool {
    match v {
        Value::Handle(_) => true,
        Value::List(items) => items.iter().any(contains_handle),
        Value::Map(m) => m.values().any(contains_handle),
        _ => false,
    }
}

/// Coerce a color-list keyword into [`Value::Colors`].
fn as_color_list(value: Value) -> RecipeResult<Value> {
    match value {
        Value::Colors(c) => Ok(Value::Colors(c)),
        Value::Str(s) => Ok(Value::Colors(vec![s])),
        Value::List(items) => items
            .into_iter()
            .map(|it| match it {
                Value::Str(s) => Ok(s),
                other => Err(RecipeError::validation(format!(
                    "color list holds a {} instead of a color string",
                    other.kind()
                ))),
            })
            .collect::<RecipeResult<Vec<_>>>()
            .map(Value::Colors),
        Value::Null => Ok(Value::Null),
        other => Err(RecipeError::validation(format!(
            "expected a sequence of colors, got {}",
            other.kind()
        ))),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/encode.rs"]
mod tests;
