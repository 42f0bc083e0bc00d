pub mod canonical;
pub mod types;
pub mod validation;

pub use canonical::*;
pub use types::*;
pub use validation::*;
