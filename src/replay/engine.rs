use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::codec::decode::{CrossCallResults, DecodeCtx, decode};
use crate::codec::value::Value;
use crate::foundation::core::PanelPos;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::live::{CallIndex, LiveFigure};
use crate::recipe::model::{CallRecord, Panel, Recipe};
use crate::render::backend::{Handle, RenderEngine};
use crate::replay::postprocess;

/// How serious a replay issue is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Replay went on; output may differ from the original.
    Warning,
    /// A panel was abandoned.
    Error,
}

/// One problem found while reconstructing a recipe.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReplayIssue {
    /// Severity.
    pub severity: Severity,
    /// Panel key, when the issue belongs to one panel.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub panel: Option<String>,
    /// Call id, when the issue belongs to one call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    /// Human-readable description.
    pub message: String,
}

impl ReplayIssue {
    fn warning(message: String) -> Self {
        Self {
            severity: Severity::Warning,
            panel: None,
            call_id: None,
            message,
        }
    }

    fn error(panel: Option<String>, call_id: Option<String>, err: &RecipeError) -> Self {
        Self {
            severity: Severity::Error,
            panel,
            call_id,
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for ReplayIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        write!(f, "{level}")?;
        if let Some(panel) = &self.panel {
            write!(f, " [{panel}")?;
            if let Some(id) = &self.call_id {
                write!(f, "/{id}")?;
            }
            write!(f, "]")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Replay policy.
#[derive(Clone, Debug, Default)]
pub struct ReplayOpts {
    /// Keep going after a panel fails and return what was drawn, with the issues.
    pub partial: bool,
    /// Replay only these call ids (decorations included).
    pub only_calls: Option<BTreeSet<String>>,
    /// Skip every decoration record.
    pub skip_decorations: bool,
}

/// Outcome of a reconstruction.
#[derive(Debug)]
pub struct Reconstruction {
    /// Reconstructed live figure.
    pub figure: LiveFigure,
    /// Everything that went wrong, in panel order.
    pub issues: Vec<ReplayIssue>,
}

impl Reconstruction {
    /// `true` when replay produced no issue at all.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Issues of severity [`Severity::Error`].
    pub fn errors(&self) -> impl Iterator<Item = &ReplayIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }
}

/// Reconstruct `recipe` on a fresh canvas of `engine`, failing on any fatal issue.
pub fn reconstruct(recipe: &Recipe, engine: &dyn RenderEngine) -> RecipeResult<LiveFigure> {
    reconstruct_with(recipe, engine, &ReplayOpts::default()).map(|r| r.figure)
}

/// Reconstruct `recipe` under `opts`.
///
/// Panels replay in document order; within a panel, calls replay before decorations, each list
/// in stored order. A failing panel is abandoned and reported; the remaining panels still run so
/// that every failure is collected in one pass. Without `opts.partial`, any fatal issue turns
/// the result into [`RecipeError::Reconstruction`].
#[tracing::instrument(skip_all, fields(recipe = %recipe.id, panels = recipe.panels.len()))]
pub fn reconstruct_with(
    recipe: &Recipe,
    engine: &dyn RenderEngine,
    opts: &ReplayOpts,
) -> RecipeResult<Reconstruction> {
    let mut figure = LiveFigure::new(engine.new_canvas(&recipe.figure)?, CallIndex::default());
    let mut issues = Vec::new();

    if engine.engine_version() != recipe.engine_version {
        tracing::warn!(
            recorded = %recipe.engine_version,
            current = engine.engine_version(),
            "engine version mismatch"
        );
        issues.push(ReplayIssue::warning(format!(
            "engine version mismatch: recorded with '{}', replaying with '{}'; pixel identity is not guaranteed",
            recipe.engine_version,
            engine.engine_version()
        )));
    }

    for (key, panel) in &recipe.panels {
        if let Err((call_id, err)) = replay_panel(&mut figure, recipe, panel, opts) {
            tracing::warn!(panel = %key, call_id = %call_id, error = %err, "panel replay aborted");
            issues.push(ReplayIssue::error(Some(key.clone()), Some(call_id), &err));
        }
    }

    if let Err(err) = figure.canvas_mut().finalize(&recipe.figure.finalize) {
        issues.push(ReplayIssue::error(None, None, &err));
    }

    let fatal = issues.iter().any(|i| i.severity == Severity::Error);
    if fatal && !opts.partial {
        return Err(RecipeError::Reconstruction(issues));
    }
    Ok(Reconstruction { figure, issues })
}

fn replay_panel(
    figure: &mut LiveFigure,
    recipe: &Recipe,
    panel: &Panel,
    opts: &ReplayOpts,
) -> Result<(), (String, RecipeError)> {
    let mut results = CrossCallResults::new();
    let decorations: &[CallRecord] = if opts.skip_decorations {
        &[]
    } else {
        &panel.decorations
    };
    for record in panel.calls.iter().chain(decorations) {
        if opts
            .only_calls
            .as_ref()
            .is_some_and(|only| !only.contains(&record.id))
        {
            continue;
        }
        let ctx = DecodeCtx {
            results: &results,
            payloads: &recipe.payloads,
        };
        let handle = replay_call(figure, panel.pos, record, ctx).map_err(|e| (record.id.clone(), e))?;
        results.insert(record.id.clone(), handle);
    }
    Ok(())
}

/// Decode one record and execute it on `figure`, registering the produced handle.
pub(crate) fn replay_call(
    figure: &mut LiveFigure,
    panel: PanelPos,
    record: &CallRecord,
    ctx: DecodeCtx<'_>,
) -> RecipeResult<Handle> {
    let op = record.op()?;
    let (args, kwargs) = decode_record(record, panel, ctx)?;
    let (canvas, index) = figure.parts_mut();
    let handle = postprocess::invoke(canvas, op, panel, &args, kwargs)?;
    index.insert(handle, panel, &record.id, op);
    Ok(handle)
}

/// Decode every argument of `record`, attaching call context to failures.
pub fn decode_record(
    record: &CallRecord,
    panel: PanelPos,
    ctx: DecodeCtx<'_>,
) -> RecipeResult<(Vec<Value>, BTreeMap<String, Value>)> {
    let locate = |name: &str, e: RecipeError| e.in_argument(panel.key(), record.id.as_str(), name);
    let args = record
        .args
        .iter()
        .map(|a| decode(&a.spec, ctx).map_err(|e| locate(&a.name, e)))
        .collect::<RecipeResult<Vec<_>>>()?;
    let kwargs = record
        .kwargs
        .iter()
        .map(|(k, spec)| Ok((k.clone(), decode(spec, ctx).map_err(|e| locate(k, e))?)))
        .collect::<RecipeResult<BTreeMap<_, _>>>()?;
    Ok((args, kwargs))
}

#[cfg(test)]
#[path = "../../tests/unit/replay/engine.rs"]
mod tests;
