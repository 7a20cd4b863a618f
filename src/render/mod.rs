//! Rendering collaborator: canvas traits and the CPU implementation.

/// Canvas traits, handles and raster type.
pub mod backend;
/// Color parsing and the default color cycle.
pub mod color;
/// CPU canvas built on `vello_cpu`.
pub mod cpu;
mod draw;
