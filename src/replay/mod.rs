//! Reconstruction of live figures from recipe documents.

/// Replay of recipes onto fresh canvases.
pub mod engine;
pub mod postprocess;
