use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{ExtractionError, PipelineStage};

/// Per-document cancellation flag. Cloning shares the same flag, so a
/// handle can be kept by the caller while the pipeline polls it between
/// stages. Flags are never shared across documents.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with `Cancelled` if the flag is set before entering `stage`.
    pub fn checkpoint(&self, stage: PipelineStage) -> Result<(), ExtractionError> {
        if self.is_cancelled() {
            tracing::info!(stage = %stage, "Document cancelled");
            return Err(ExtractionError::Cancelled { stage });
        }
        Ok(())
    }
}
