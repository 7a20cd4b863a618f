//! Interactive editing of recorded figures.

/// Edit sessions over a reconstructed recipe.
pub mod session;
