//! Capturing drawing calls into recipes.

/// Recording figure and call builder.
pub mod recorder;
