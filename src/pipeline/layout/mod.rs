//! Layout classification: quick detection and deep analysis of a
//! transcript image into a `LayoutDescriptor`.

pub mod classify;
pub mod parser;
pub mod types;

pub use classify::*;
pub use parser::*;
pub use types::*;
