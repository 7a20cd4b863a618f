//! Recipe documents: model, operation set, persistence and bundles.

pub mod bundle;
/// Saving, loading and inspecting documents.
pub mod io;
/// Document model.
pub mod model;
/// Closed operation set.
pub mod ops;
