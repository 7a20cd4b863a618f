use std::collections::HashMap;

use crate::codec::payload::PayloadStore;
use crate::codec::spec::ArgumentSpec;
use crate::codec::value::Value;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::render::backend::Handle;

/// Results of calls already executed in the current panel, keyed by call id.
pub type CrossCallResults = HashMap<String, Handle>;

/// Inputs for decoding argument specs.
#[derive(Clone, Copy)]
pub struct DecodeCtx<'a> {
    /// Results available to cross-call references.
    pub results: &'a CrossCallResults,
    /// Payload source for external references.
    pub payloads: &'a PayloadStore,
}

/// Rebuild the runtime value of an argument spec.
pub fn decode(spec: &ArgumentSpec, ctx: DecodeCtx<'_>) -> RecipeResult<Value> {
    match spec {
        ArgumentSpec::Inline(v) => Ok(v.clone()),
        ArgumentSpec::CallRef(id) => ctx
            .results
            .get(id)
            .map(|h| Value::Handle(*h))
            .ok_or_else(|| RecipeError::UnresolvedReference(id.clone())),
        ArgumentSpec::External(r) => {
            let arr = ctx.payloads.resolve(r)?;
            let Some(lengths) = &r.groups else {
                return Ok(Value::Array(arr));
            };
            if lengths.iter().sum::<usize>() != arr.len() {
                return Err(RecipeError::schema_mismatch(format!(
                    "column '{}' holds {} values but its groups sum to {}",
                    r.selector,
                    arr.len(),
                    lengths.iter().sum::<usize>()
                )));
            }
            let mut start = 0;
            let groups = lengths
                .iter()
                .map(|&n| {
                    let g = arr.slice(start, start + n);
                    start += n;
                    g
                })
                .collect();
            Ok(Value::Groups(groups))
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/codec/decode.rs"]
mod tests;
