//! figrecipe records plotting calls into versioned, replayable figure recipes.
//!
//! A [`RecordingFigure`] forwards every drawing call to a live canvas and captures it as a
//! [`CallRecord`] with its arguments encoded for storage. Recipes are saved as YAML with large
//! numeric payloads beside them, and [`reconstruct`] replays them into a canvas that renders
//! pixel-identically to the original.
//!
//! On top of a reconstruction:
//!
//! - [`assign_identities`] renders a hitmap with one unique color per selectable element
//! - [`bbox_map`] maps element extents into output pixel space
//! - [`EditSession`] edits call arguments in place and re-renders
#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Argument encoding and decoding.
pub mod codec;
/// Interactive editing.
pub mod edit;
/// Core value types, errors and math helpers.
pub mod foundation;
/// Pixel-space geometry of elements.
pub mod geometry;
/// Hitmap identities.
pub mod identity;
/// Live canvases paired with their call index.
pub mod live;
/// Recipe documents and persistence.
pub mod recipe;
/// Call recording.
pub mod record;
/// Rendering collaborator.
pub mod render;
/// Reconstruction.
pub mod replay;
/// Raster comparison.
pub mod verify;

pub use crate::codec::encode::CodecOpts;
pub use crate::codec::spec::{ArgumentSpec, ExternalRef, PositionalArg};
pub use crate::codec::value::{DType, NumArray, Value};
pub use crate::edit::session::EditSession;
pub use crate::foundation::core::{PanelPos, RasterSize, Rgb8, Rgba8};
pub use crate::foundation::error::{RecipeError, RecipeResult};
pub use crate::geometry::bbox::{BBoxRecord, bbox_map, map_to_pixel_space};
pub use crate::identity::hitmap::{HitmapOpts, IdentityMap, IdentityRecord, assign_identities};
pub use crate::live::LiveFigure;
pub use crate::recipe::bundle::{load_bundle, load_preview, save_bundle};
pub use crate::recipe::io::{
    PayloadFormat, PayloadLayout, SaveOpts, load_recipe, recipe_info, save_recipe,
};
pub use crate::recipe::model::{CallRecord, FigureConfig, Recipe};
pub use crate::recipe::ops::Operation;
pub use crate::record::recorder::{CallOpts, RecordingFigure};
pub use crate::render::backend::{Handle, LiveCanvas, Raster, RenderEngine};
pub use crate::render::cpu::CpuEngine;
pub use crate::replay::engine::{ReplayIssue, ReplayOpts, reconstruct, reconstruct_with};
pub use crate::verify::diff::{DiffStats, compare_rasters};
pub use crate::verify::validate::{DEFAULT_MSE_THRESHOLD, ValidationResult, validate_recipe};
