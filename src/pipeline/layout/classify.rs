use std::sync::Arc;

use super::parser::{parse_layout_analysis, parse_quick_detection};
use super::types::{LayoutDescriptor, QuickDetection};
use crate::pipeline::inference::InferenceClient;
use crate::pipeline::prompt::{build_deep_analysis_prompt, build_quick_detect_prompt};
use crate::pipeline::{excerpt, Document, ExtractionError, PipelineStage};
use crate::pipeline_config::PipelineConfig;

/// Turns a document image into a layout classification.
///
/// Each method makes one inference call. The only internal retry is the
/// bounded re-ask after a malformed quick-detect answer.
pub struct LayoutClassifier {
    client: Arc<dyn InferenceClient>,
    config: PipelineConfig,
}

impl LayoutClassifier {
    pub fn new(client: Arc<dyn InferenceClient>, config: PipelineConfig) -> Self {
        Self { client, config }
    }

    /// Cheap first pass: source name, layout type and country.
    pub fn quick_detect(
        &self,
        document: &Document,
        source_hint: Option<&str>,
    ) -> Result<QuickDetection, ExtractionError> {
        let stage = PipelineStage::QuickDetect;
        let prompt = build_quick_detect_prompt(source_hint);
        let params = self.config.params_for(stage);
        let max_attempts = self.config.quick_detect_retries + 1;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let raw = self
                .client
                .infer(&prompt, &document.image, &params)
                .map_err(|source| ExtractionError::InvokeFailed { stage, source })?;

            match parse_quick_detection(&raw) {
                Ok(quick) => {
                    tracing::debug!(
                        doc_id = %document.id,
                        attempt,
                        university = quick.university.as_deref().unwrap_or("unknown"),
                        layout = quick.layout_type.as_str(),
                        "Quick detection complete"
                    );
                    return Ok(quick);
                }
                Err(reason) if attempt < max_attempts => {
                    tracing::warn!(
                        doc_id = %document.id,
                        attempt,
                        reason = %reason,
                        "Malformed quick-detect response, retrying"
                    );
                }
                Err(reason) => {
                    return Err(ExtractionError::ClassificationFailure {
                        stage,
                        reason,
                        excerpt: excerpt(&raw),
                    });
                }
            }
        }
    }

    /// Full layout analysis. No retry: a malformed answer is fatal.
    pub fn deep_analyze(
        &self,
        document: &Document,
        quick: &QuickDetection,
    ) -> Result<LayoutDescriptor, ExtractionError> {
        let stage = PipelineStage::DeepAnalyze;
        let prompt = build_deep_analysis_prompt(quick);
        let raw = self
            .client
            .infer(&prompt, &document.image, &self.config.params_for(stage))
            .map_err(|source| ExtractionError::InvokeFailed { stage, source })?;

        let descriptor = parse_layout_analysis(&raw, quick).map_err(|reason| {
            ExtractionError::ClassificationFailure {
                stage,
                reason,
                excerpt: excerpt(&raw),
            }
        })?;

        tracing::debug!(
            doc_id = %document.id,
            structure = descriptor.structure.as_str(),
            grade_format = descriptor.grade_format.as_str(),
            columns = descriptor.columns.len(),
            "Layout analysis complete"
        );
        Ok(descriptor)
    }
}
