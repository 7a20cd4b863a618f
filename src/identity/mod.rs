//! Element identities: unique hitmap colors for every selectable element.

/// Identity assignment and hitmap rendering.
pub mod hitmap;
pub mod palette;
