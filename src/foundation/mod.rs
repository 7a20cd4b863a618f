/// Small value types shared across the crate.
pub mod core;
/// Crate error type.
pub mod error;
pub(crate) mod math;
