use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::codec::encode::{CodecOpts, Encoder};
use crate::codec::payload::PayloadStore;
use crate::codec::value::Value;
use crate::foundation::core::{PanelPos, RasterSize};
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::geometry::bbox::{BBoxRecord, bbox_map};
use crate::identity::hitmap::{HitmapOpts, IdentityMap, assign_identities};
use crate::live::LiveFigure;
use crate::recipe::io::{SaveOpts, save_recipe};
use crate::recipe::model::{CallRecord, Recipe};
use crate::render::backend::{Raster, RenderEngine};
use crate::replay::engine::{ReplayIssue, ReplayOpts, Severity, reconstruct_with};

/// An open recipe being edited interactively.
///
/// Holds the document and its reconstruction; every edit changes the document in place and
/// rebuilds the live figure from it. Call ids and list positions never change.
pub struct EditSession {
    recipe: Recipe,
    engine: Box<dyn RenderEngine>,
    codec: CodecOpts,
    figure: LiveFigure,
    issues: Vec<ReplayIssue>,
}

impl EditSession {
    /// Reconstruct `recipe` on `engine` and start editing it.
    ///
    /// Replay is partial: failing panels are reported through [`EditSession::issues`] instead
    /// of refusing to open.
    pub fn open(recipe: Recipe, engine: Box<dyn RenderEngine>) -> RecipeResult<Self> {
        let rebuilt = rebuild(&recipe, engine.as_ref())?;
        Ok(Self {
            recipe,
            engine,
            codec: CodecOpts::default(),
            figure: rebuilt.0,
            issues: rebuilt.1,
        })
    }

    /// Document being edited.
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Current reconstruction.
    pub fn figure(&self) -> &LiveFigure {
        &self.figure
    }

    /// Issues reported by the last reconstruction.
    pub fn issues(&self) -> &[ReplayIssue] {
        &self.issues
    }

    /// Native raster size of the current reconstruction.
    pub fn size(&self) -> RasterSize {
        self.figure.canvas().native_size()
    }

    /// Render the current reconstruction.
    pub fn render(&mut self) -> RecipeResult<Raster> {
        self.figure.render()
    }

    /// Identity map of every selectable element at the native size.
    pub fn get_identity_map(&mut self) -> RecipeResult<IdentityMap> {
        self.hitmap(&HitmapOpts::default()).map(|(map, _)| map)
    }

    /// Identity map together with the hitmap raster.
    pub fn hitmap(&mut self, opts: &HitmapOpts) -> RecipeResult<(IdentityMap, Raster)> {
        let size = self.size();
        assign_identities(&mut self.figure, size, opts)
    }

    /// Pixel boxes of every selectable element at the native size.
    pub fn get_bbox_map(&self) -> IndexMap<String, BBoxRecord> {
        bbox_map(&self.figure, self.size())
    }

    /// Replace argument `name` of call `call_id`, wherever it is.
    ///
    /// Fails when the id is absent or used in more than one panel; see
    /// [`EditSession::update_call_argument_in`].
    pub fn update_call_argument(
        &mut self,
        call_id: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> RecipeResult<()> {
        let panel = self.locate(call_id)?;
        self.update_call_argument_in(panel, call_id, name, value)
    }

    /// Replace argument `name` of call `call_id` in `panel` and reconstruct.
    ///
    /// `name` is a positional variable name (`x`, `height`, ...) or a keyword; unknown names
    /// become new keywords. An edit whose reconstruction fails on this call is rolled back and
    /// the failure returned.
    #[tracing::instrument(skip(self, value), fields(panel = %panel))]
    pub fn update_call_argument_in(
        &mut self,
        panel: PanelPos,
        call_id: &str,
        name: &str,
        value: impl Into<Value>,
    ) -> RecipeResult<()> {
        let before = self.record(panel, call_id)?.clone();
        let payloads = self.recipe.payloads.clone();
        let spec = Encoder {
            opts: self.codec,
            panel,
            call_id,
            payloads: &mut self.recipe.payloads,
            index: self.figure.index(),
        }
        .encode(name, value.into())?;

        let record = self.record_mut(panel, call_id)?;
        match record.args.iter_mut().find(|a| a.name == name) {
            Some(arg) => arg.spec = spec,
            None => {
                record.kwargs.insert(name.to_owned(), spec);
            }
        }
        self.commit(panel, before, Some(payloads))
    }

    /// Drop keyword `name` of call `call_id` and reconstruct.
    pub fn remove_call_argument(&mut self, call_id: &str, name: &str) -> RecipeResult<()> {
        let panel = self.locate(call_id)?;
        let before = self.record(panel, call_id)?.clone();
        if before.args.iter().any(|a| a.name == name) {
            return Err(RecipeError::validation(format!(
                "'{name}' is a positional argument of '{call_id}' and cannot be removed"
            )));
        }
        if self.record_mut(panel, call_id)?.kwargs.remove(name).is_none() {
            return Err(RecipeError::validation(format!(
                "call '{call_id}' has no keyword '{name}'"
            )));
        }
        self.commit(panel, before, None)
    }

    /// Save the edited document.
    pub fn save(&self, path: &Path, opts: &SaveOpts) -> RecipeResult<PathBuf> {
        save_recipe(&self.recipe, path, opts)
    }

    /// Stop editing.
    pub fn into_recipe(self) -> Recipe {
        self.recipe
    }

    fn locate(&self, call_id: &str) -> RecipeResult<PanelPos> {
        match self.recipe.find_calls(call_id).as_slice() {
            [] => Err(RecipeError::validation(format!("no call '{call_id}'"))),
            [(key, _)] => PanelPos::parse_key(key),
            many => Err(RecipeError::validation(format!(
                "call id '{call_id}' is used in {} panels; name the panel",
                many.len()
            ))),
        }
    }

    fn record(&self, panel: PanelPos, call_id: &str) -> RecipeResult<&CallRecord> {
        self.recipe
            .panel(panel)
            .and_then(|p| p.record(call_id))
            .ok_or_else(|| RecipeError::validation(format!("no call '{call_id}' in panel {panel}")))
    }

    fn record_mut(&mut self, panel: PanelPos, call_id: &str) -> RecipeResult<&mut CallRecord> {
        self.recipe
            .panel_mut(panel)
            .and_then(|p| p.record_mut(call_id))
            .ok_or_else(|| RecipeError::validation(format!("no call '{call_id}' in panel {panel}")))
    }

    /// Rebuild after an edit of `before.id`; restore `before` when the edited call no longer
    /// replays or another call of its panel starts failing.
    fn commit(
        &mut self,
        panel: PanelPos,
        before: CallRecord,
        payloads: Option<PayloadStore>,
    ) -> RecipeResult<()> {
        let (figure, issues) = rebuild(&self.recipe, self.engine.as_ref())?;
        let key = panel.key();
        let failed_before = |call_id: Option<&str>| {
            self.issues.iter().any(|p| {
                p.severity == Severity::Error
                    && p.panel.as_deref() == Some(key.as_str())
                    && p.call_id.as_deref() == call_id
            })
        };
        let broken = issues.iter().find(|i| {
            i.severity == Severity::Error
                && i.panel.as_deref() == Some(key.as_str())
                && (i.call_id.as_deref() == Some(before.id.as_str())
                    || !failed_before(i.call_id.as_deref()))
        });
        if let Some(issue) = broken {
            let message = match issue.call_id.as_deref() {
                Some(other) if other != before.id => {
                    format!("edit of '{}' breaks '{other}': {}", before.id, issue.message)
                }
                _ => issue.message.clone(),
            };
            tracing::warn!(call_id = %before.id, "edit rolled back: {message}");
            let id = before.id.clone();
            *self.record_mut(panel, &id)? = before;
            if let Some(payloads) = payloads {
                self.recipe.payloads = payloads;
            }
            return Err(RecipeError::engine(message));
        }
        self.figure = figure;
        self.issues = issues;
        Ok(())
    }
}

fn rebuild(recipe: &Recipe, engine: &dyn RenderEngine) -> RecipeResult<(LiveFigure, Vec<ReplayIssue>)> {
    let opts = ReplayOpts {
        partial: true,
        ..ReplayOpts::default()
    };
    let r = reconstruct_with(recipe, engine, &opts)?;
    Ok((r.figure, r.issues))
}

impl std::fmt::Debug for EditSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("recipe", &self.recipe.id)
            .field("engine", &self.engine.engine_version())
            .field("issues", &self.issues.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/edit/session.rs"]
mod tests;
