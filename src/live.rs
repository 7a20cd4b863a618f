use std::collections::HashMap;

use crate::foundation::core::{PanelPos, RasterSize};
use crate::foundation::error::RecipeResult;
use crate::recipe::ops::Operation;
use crate::render::backend::{Handle, LiveCanvas, Raster};

/// Which recorded call produced a handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallOrigin {
    /// Owning panel.
    pub panel: PanelPos,
    /// Call id within the panel.
    pub call_id: String,
    /// Operation that produced the handle.
    pub op: Operation,
    /// Ordinal of this call among calls of the same operation in its panel.
    pub ordinal: usize,
}

/// Map from canvas handles back to the calls that produced them.
#[derive(Clone, Debug, Default)]
pub struct CallIndex {
    origins: HashMap<Handle, CallOrigin>,
    ordinals: HashMap<(PanelPos, Operation), usize>,
}

impl CallIndex {
    /// Register the result of a call.
    pub fn insert(&mut self, handle: Handle, panel: PanelPos, call_id: &str, op: Operation) {
        let next = self.ordinals.entry((panel, op)).or_insert(0);
        let ordinal = *next;
        *next += 1;
        self.origins.insert(
            handle,
            CallOrigin {
                panel,
                call_id: call_id.to_owned(),
                op,
                ordinal,
            },
        );
    }

    /// Origin of a handle.
    pub fn origin(&self, handle: Handle) -> Option<&CallOrigin> {
        self.origins.get(&handle)
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// `true` when no handle is registered.
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// A live canvas together with the index of recorded calls drawn on it.
///
/// Exclusively owned: all mutation goes through `&mut self`, so at most one operation can be in
/// flight per canvas.
pub struct LiveFigure {
    canvas: Box<dyn LiveCanvas>,
    index: CallIndex,
}

impl LiveFigure {
    pub(crate) fn new(canvas: Box<dyn LiveCanvas>, index: CallIndex) -> Self {
        Self { canvas, index }
    }

    /// Underlying canvas.
    pub fn canvas(&self) -> &dyn LiveCanvas {
        self.canvas.as_ref()
    }

    /// Mutable canvas.
    pub fn canvas_mut(&mut self) -> &mut dyn LiveCanvas {
        self.canvas.as_mut()
    }

    /// Call index.
    pub fn index(&self) -> &CallIndex {
        &self.index
    }

    pub(crate) fn parts_mut(&mut self) -> (&mut dyn LiveCanvas, &mut CallIndex) {
        (self.canvas.as_mut(), &mut self.index)
    }

    /// Render at the figure's native resolution.
    pub fn render(&mut self) -> RecipeResult<Raster> {
        let size = self.canvas.native_size();
        self.canvas.render(size)
    }

    /// Render at an explicit raster size.
    pub fn render_at(&mut self, size: RasterSize) -> RecipeResult<Raster> {
        self.canvas.render(size)
    }
}

impl std::fmt::Debug for LiveFigure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveFigure")
            .field("engine_version", &self.canvas.engine_version())
            .field("index", &self.index)
            .finish()
    }
}
