//! Mapping element extents from device units to output pixels.

/// Pixel transform and bounding-box records.
pub mod bbox;
