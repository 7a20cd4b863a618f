use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use crate::codec::encode::{CodecOpts, Encoder};
use crate::codec::spec::PositionalArg;
use crate::codec::value::Value;
use crate::foundation::core::PanelPos;
use crate::foundation::error::{RecipeError, RecipeResult};
use crate::live::{CallIndex, LiveFigure};
use crate::recipe::io::{SaveOpts, save_recipe};
use crate::recipe::model::{CallRecord, FigureConfig, FigureMetadata, Recipe, now_rfc3339};
use crate::recipe::ops::Operation;
use crate::render::backend::{Handle, Raster, RenderEngine};
use crate::replay::postprocess;

/// Per-call recording options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOpts {
    /// Explicit call id, used verbatim. Must be unique within the panel.
    pub id: Option<String>,
    /// When `false` the operation is drawn but not recorded.
    pub track: bool,
}

impl Default for CallOpts {
    fn default() -> Self {
        Self {
            id: None,
            track: true,
        }
    }
}

impl CallOpts {
    /// Record under an explicit id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            track: true,
        }
    }

    /// Draw without recording.
    pub fn untracked() -> Self {
        Self {
            id: None,
            track: false,
        }
    }
}

/// What a call produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recorded {
    /// Handle returned by the canvas.
    pub handle: Handle,
    /// Id of the new record, `None` for untracked calls.
    pub call_id: Option<String>,
}

/// A live figure whose drawing calls are captured into a [`Recipe`].
///
/// Every call is encoded, forwarded unchanged to the canvas, and appended to its panel's call
/// or decoration list. Records are never reordered.
#[derive(Debug)]
pub struct RecordingFigure {
    recipe: Recipe,
    figure: LiveFigure,
    codec: CodecOpts,
    counters: HashMap<Operation, usize>,
}

impl RecordingFigure {
    /// Start recording a new figure on `engine`.
    pub fn new(engine: &dyn RenderEngine, config: FigureConfig) -> RecipeResult<Self> {
        let canvas = engine.new_canvas(&config)?;
        Ok(Self {
            recipe: Recipe::new(engine.engine_version(), config),
            figure: LiveFigure::new(canvas, CallIndex::default()),
            codec: CodecOpts::default(),
            counters: HashMap::new(),
        })
    }

    /// Use `codec` for subsequent calls.
    pub fn with_codec(mut self, codec: CodecOpts) -> Self {
        self.codec = codec;
        self
    }

    /// Document recorded so far.
    pub fn recipe(&self) -> &Recipe {
        &self.recipe
    }

    /// Live figure being drawn.
    pub fn figure(&self) -> &LiveFigure {
        &self.figure
    }

    /// Mutable live figure (for identity assignment or bbox mapping while recording).
    pub fn figure_mut(&mut self) -> &mut LiveFigure {
        &mut self.figure
    }

    /// Figure-level metadata.
    pub fn metadata_mut(&mut self) -> &mut FigureMetadata {
        &mut self.recipe.metadata
    }

    /// Set the caption of a panel.
    pub fn set_panel_caption(&mut self, panel: PanelPos, caption: impl Into<String>) -> RecipeResult<()> {
        self.check_panel(panel)?;
        self.recipe.panel_entry(panel).caption = Some(caption.into());
        Ok(())
    }

    /// Attach statistics to a recorded call.
    pub fn set_call_stats(
        &mut self,
        panel: PanelPos,
        call_id: &str,
        stats: serde_json::Value,
    ) -> RecipeResult<()> {
        let record = self
            .recipe
            .panel_mut(panel)
            .and_then(|p| p.record_mut(call_id))
            .ok_or_else(|| RecipeError::validation(format!("no call '{call_id}' in panel {panel}")))?;
        record.stats = Some(stats);
        Ok(())
    }

    /// Start building a call of `op` on `panel`.
    pub fn call(&mut self, panel: PanelPos, op: Operation) -> CallBuilder<'_> {
        CallBuilder {
            fig: self,
            panel,
            op,
            args: Vec::new(),
            kwargs: BTreeMap::new(),
            opts: CallOpts::default(),
        }
    }

    /// Record one call and draw it.
    #[tracing::instrument(level = "debug", skip(self, args, kwargs), fields(op = %op, panel = %panel))]
    pub fn record(
        &mut self,
        panel: PanelPos,
        op: Operation,
        args: Vec<Value>,
        kwargs: BTreeMap<String, Value>,
        opts: CallOpts,
    ) -> RecipeResult<Recorded> {
        self.check_panel(panel)?;
        if !opts.track {
            let (canvas, _) = self.figure.parts_mut();
            let handle = postprocess::invoke(canvas, op, panel, &args, kwargs)?;
            return Ok(Recorded {
                handle,
                call_id: None,
            });
        }

        let (id, next_counter) = self.assign_id(panel, op, opts.id)?;
        let record = match self.encode(panel, op, &id, &args, &kwargs) {
            Ok(r) => r,
            Err(e) => {
                self.recipe.payloads.drop_owned_by(panel, &id);
                return Err(e);
            }
        };
        let (canvas, index) = self.figure.parts_mut();
        let handle = match postprocess::invoke(canvas, op, panel, &args, kwargs) {
            Ok(h) => h,
            Err(e) => {
                self.recipe.payloads.drop_owned_by(panel, &id);
                return Err(e);
            }
        };
        index.insert(handle, panel, &id, op);
        if let Some(next) = next_counter {
            self.counters.insert(op, next);
        }

        let target = self.recipe.panel_entry(panel);
        if op.is_decoration() {
            target.decorations.push(record);
        } else {
            target.calls.push(record);
        }
        tracing::debug!(call_id = %id, "recorded call");
        Ok(Recorded {
            handle,
            call_id: Some(id),
        })
    }

    /// Render the live figure at its native size.
    pub fn render(&mut self) -> RecipeResult<Raster> {
        self.figure.render()
    }

    /// Save the recorded document next to its payloads.
    pub fn save(&self, path: &Path, opts: &SaveOpts) -> RecipeResult<PathBuf> {
        save_recipe(&self.recipe, path, opts)
    }

    /// Finish recording, keeping the live figure.
    pub fn into_parts(self) -> (Recipe, LiveFigure) {
        (self.recipe, self.figure)
    }

    /// Finish recording.
    pub fn into_recipe(self) -> Recipe {
        self.recipe
    }

    fn check_panel(&self, panel: PanelPos) -> RecipeResult<()> {
        let grid = self.recipe.figure.grid;
        if panel.row >= grid.rows || panel.col >= grid.cols {
            return Err(RecipeError::validation(format!(
                "panel {panel} is outside the {}x{} grid",
                grid.rows, grid.cols
            )));
        }
        Ok(())
    }

    /// Id for a new record, plus the counter value to store once the record is committed.
    fn assign_id(
        &self,
        panel: PanelPos,
        op: Operation,
        explicit: Option<String>,
    ) -> RecipeResult<(String, Option<usize>)> {
        let taken = |id: &str| {
            self.recipe
                .panel(panel)
                .is_some_and(|p| p.contains_id(id))
        };
        if let Some(id) = explicit {
            if id.trim().is_empty() {
                return Err(RecipeError::validation("call id must not be empty"));
            }
            if taken(&id) {
                return Err(RecipeError::DuplicateId {
                    id,
                    panel: panel.key(),
                });
            }
            return Ok((id, None));
        }
        let mut counter = self.counters.get(&op).copied().unwrap_or(0);
        loop {
            let id = format!("{}_{:03}", op.name(), counter);
            counter += 1;
            if !taken(&id) {
                return Ok((id, Some(counter)));
            }
        }
    }

    fn encode(
        &mut self,
        panel: PanelPos,
        op: Operation,
        id: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> RecipeResult<CallRecord> {
        let mut enc = Encoder {
            opts: self.codec,
            panel,
            call_id: id,
            payloads: &mut self.recipe.payloads,
            index: self.figure.index(),
        };
        let args = args
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let name = op.positional_name(i);
                let spec = enc.encode(&name, v.clone())?;
                Ok(PositionalArg { name, spec })
            })
            .collect::<RecipeResult<Vec<_>>>()?;
        let kwargs = kwargs
            .iter()
            .map(|(k, v)| Ok((k.clone(), enc.encode(k, v.clone())?)))
            .collect::<RecipeResult<BTreeMap<_, _>>>()?;
        Ok(CallRecord {
            id: id.to_owned(),
            operation: op.name().to_owned(),
            args,
            kwargs,
            stats: None,
            timestamp: Some(now_rfc3339()),
        })
    }
}

/// Fluent builder for one recorded call.
pub struct CallBuilder<'a> {
    fig: &'a mut RecordingFigure,
    panel: PanelPos,
    op: Operation,
    args: Vec<Value>,
    kwargs: BTreeMap<String, Value>,
    opts: CallOpts,
}

impl CallBuilder<'_> {
    /// Append a positional argument.
    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Set a keyword argument.
    pub fn kw(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.kwargs.insert(name.into(), value.into());
        self
    }

    /// Record under an explicit id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.opts.id = Some(id.into());
        self
    }

    /// Draw without recording.
    pub fn untracked(mut self) -> Self {
        self.opts.track = false;
        self
    }

    /// Execute and return the canvas handle.
    pub fn run(self) -> RecipeResult<Handle> {
        self.run_recorded().map(|r| r.handle)
    }

    /// Execute and return the handle together with the record id.
    pub fn run_recorded(self) -> RecipeResult<Recorded> {
        self.fig
            .record(self.panel, self.op, self.args, self.kwargs, self.opts)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/record/recorder.rs"]
mod tests;
