pub mod mock;
pub mod ollama;
pub mod types;

pub use mock::*;
pub use ollama::*;
pub use types::*;

use thiserror::Error;

/// Failures of the external inference capability. None of these are retried
/// by the pipeline; they surface as `ExtractionError::InvokeFailed`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
    #[error("Inference server is not reachable at {0}")]
    Unreachable(String),

    #[error("Inference timed out after {0}s")]
    Timeout(u64),

    #[error("Inference server returned error (status {status}): {body}")]
    Status { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Malformed inference response: {0}")]
    ResponseParsing(String),
}
