//! Raster comparison for reproduction checks.

/// Pixel statistics and diff visualization.
pub mod diff;
/// Recipe-against-original validation.
pub mod validate;
