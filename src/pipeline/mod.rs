pub mod batch;
pub mod cancel;
pub mod document;
pub mod inference;
pub mod layout;
pub mod orchestrator;
pub mod prompt;
pub mod sanitize;
pub mod schema;
pub mod templates;

pub use batch::*;
pub use cancel::*;
pub use document::*;
pub use orchestrator::*;

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use inference::InferenceError;

/// Maximum characters of a raw model response carried in a fatal error.
const EXCERPT_CHARS: usize = 200;

/// Stages a document moves through inside the extraction pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    QuickDetect,
    CacheLookup,
    DeepAnalyze,
    Compose,
    Invoke,
    Validate,
    Store,
    Done,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::QuickDetect => "quick_detect",
            Self::CacheLookup => "cache_lookup",
            Self::DeepAnalyze => "deep_analyze",
            Self::Compose => "compose",
            Self::Invoke => "invoke",
            Self::Validate => "validate",
            Self::Store => "store",
            Self::Done => "done",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal, per-document failures. Leaf-level schema problems never end up
/// here; they are recorded on the `ExtractionResult` instead.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Classification failed at {stage}: {reason} (response: {excerpt:?})")]
    ClassificationFailure {
        stage: PipelineStage,
        reason: String,
        excerpt: String,
    },

    #[error("Extraction output unparseable after {attempts} attempt(s): {reason} (response: {excerpt:?})")]
    ParseFailure {
        reason: String,
        excerpt: String,
        attempts: u32,
    },

    #[error("Inference failed at {stage}: {source}")]
    InvokeFailed {
        stage: PipelineStage,
        #[source]
        source: InferenceError,
    },

    #[error("Extraction cancelled before {stage}")]
    Cancelled { stage: PipelineStage },

    #[error("Extraction worker failed: {0}")]
    Worker(String),
}

impl ExtractionError {
    /// Stage the document was in when it failed.
    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::ClassificationFailure { stage, .. }
            | Self::InvokeFailed { stage, .. }
            | Self::Cancelled { stage } => *stage,
            Self::ParseFailure { .. } => PipelineStage::Validate,
            Self::Worker(_) => PipelineStage::Done,
        }
    }
}

/// Truncate a raw model response for diagnostics.
pub fn excerpt(raw: &str) -> String {
    let trimmed = raw.trim();
    let mut out: String = trimmed.chars().take(EXCERPT_CHARS).collect();
    if trimmed.chars().count() > EXCERPT_CHARS {
        out.push('…');
    }
    out
}
