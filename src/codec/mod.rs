//! Argument codec: runtime values to and from document argument specs.

pub(crate) mod csv;
/// Argument specs back to runtime values.
pub mod decode;
/// Runtime values to argument specs, externalizing large arrays.
pub mod encode;
pub(crate) mod npy;
/// External payload storage and column naming.
pub mod payload;
/// Document form of arguments.
pub mod spec;
/// Runtime argument values and numeric arrays.
pub mod value;
