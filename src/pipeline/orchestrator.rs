//! The extraction state machine.
//!
//! quick detect → cache lookup → (deep analysis on miss) → compose →
//! invoke → validate → store. Store writes happen only after validation
//! succeeds, so a failed or cancelled document never changes what other
//! documents see.

use std::sync::Arc;

use super::cancel::CancelFlag;
use super::document::Document;
use super::inference::InferenceClient;
use super::layout::{LayoutClassifier, QuickDetection};
use super::prompt::{apply_variant, compose_extraction_prompt, PromptVariant};
use super::schema::{ExtractionResult, SchemaRegistry};
use super::templates::{
    fingerprint_of, normalize_university, provisional_fingerprint, ExtractionTemplate,
    TemplateStore,
};
use super::{ExtractionError, PipelineStage};
use crate::pipeline_config::PipelineConfig;

/// Store mutation deferred until the document validates.
enum PendingWrite {
    None,
    /// Reused a template found through its advisory key.
    RecordHit { fingerprint: String },
    /// Deep analysis landed on a template learned under another advisory key.
    Link { alias: String, fingerprint: String },
    /// New template from this document's analysis.
    Learn {
        alias: String,
        template: ExtractionTemplate,
    },
}

struct PreparedPrompt {
    body: String,
    fingerprint: Option<String>,
    cache_hit: bool,
    pending: PendingWrite,
}

/// Orchestrates classification, template reuse, extraction and repair.
///
/// Stateless across documents apart from the shared template store, so one
/// pipeline can serve many concurrent workers.
pub struct ExtractionPipeline {
    client: Arc<dyn InferenceClient>,
    store: Arc<dyn TemplateStore>,
    schema: Arc<SchemaRegistry>,
    classifier: LayoutClassifier,
    config: PipelineConfig,
}

impl ExtractionPipeline {
    pub fn new(
        client: Arc<dyn InferenceClient>,
        store: Arc<dyn TemplateStore>,
        config: PipelineConfig,
    ) -> Self {
        Self::with_schema(client, store, Arc::new(SchemaRegistry::canonical()), config)
    }

    pub fn with_schema(
        client: Arc<dyn InferenceClient>,
        store: Arc<dyn TemplateStore>,
        schema: Arc<SchemaRegistry>,
        config: PipelineConfig,
    ) -> Self {
        let classifier = LayoutClassifier::new(client.clone(), config.clone());
        Self {
            client,
            store,
            schema,
            classifier,
            config,
        }
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.schema
    }

    pub fn store(&self) -> &Arc<dyn TemplateStore> {
        &self.store
    }

    /// Extract one document.
    pub fn extract(
        &self,
        document: &Document,
        source_hint: Option<&str>,
    ) -> Result<ExtractionResult, ExtractionError> {
        self.extract_with_cancel(document, source_hint, &CancelFlag::new())
    }

    /// Extract one document, checking `cancel` between stages.
    pub fn extract_with_cancel(
        &self,
        document: &Document,
        source_hint: Option<&str>,
        cancel: &CancelFlag,
    ) -> Result<ExtractionResult, ExtractionError> {
        let _span = tracing::info_span!(
            "extract",
            doc_id = %document.id,
            source = document.source_name.as_deref().unwrap_or("-"),
        )
        .entered();

        cancel.checkpoint(PipelineStage::QuickDetect)?;
        let quick = self.classifier.quick_detect(document, source_hint)?;
        let quick = with_hint_fallback(quick, source_hint);

        cancel.checkpoint(PipelineStage::CacheLookup)?;
        let prepared = self.prepare_prompt(document, &quick, cancel)?;

        cancel.checkpoint(PipelineStage::Invoke)?;
        let mut result = self.invoke_and_validate(document, &prepared.body, cancel)?;

        cancel.checkpoint(PipelineStage::Store)?;
        self.apply_pending(prepared.pending);

        result.fingerprint = prepared.fingerprint;
        result.cache_hit = prepared.cache_hit;

        tracing::info!(
            cache_hit = result.cache_hit,
            attempts = result.attempts,
            field_errors = result.errors.len(),
            "Extraction complete"
        );
        Ok(result)
    }

    /// Resolve the prompt body: cached template or fresh analysis.
    fn prepare_prompt(
        &self,
        document: &Document,
        quick: &QuickDetection,
        cancel: &CancelFlag,
    ) -> Result<PreparedPrompt, ExtractionError> {
        let provisional = quick
            .university
            .as_deref()
            .map(|u| provisional_fingerprint(u, quick.layout_type));

        if let (Some(university), Some(alias)) = (quick.university.as_deref(), &provisional) {
            if let Some(template) = self.lookup_cached(alias, university) {
                tracing::info!(fingerprint = %template.fingerprint, "Template cache hit");
                return Ok(PreparedPrompt {
                    body: template.rendered_prompt_body,
                    fingerprint: Some(template.fingerprint.clone()),
                    cache_hit: true,
                    pending: PendingWrite::RecordHit {
                        fingerprint: template.fingerprint,
                    },
                });
            }
        }

        cancel.checkpoint(PipelineStage::DeepAnalyze)?;
        let descriptor = self.classifier.deep_analyze(document, quick)?;

        cancel.checkpoint(PipelineStage::Compose)?;
        let (Some(university), Some(alias)) = (quick.university.as_deref(), provisional) else {
            tracing::info!("Source not identified, template will not be cached");
            return Ok(PreparedPrompt {
                body: compose_extraction_prompt(&descriptor, &self.schema),
                fingerprint: None,
                cache_hit: false,
                pending: PendingWrite::None,
            });
        };

        let fingerprint = fingerprint_of(university, &descriptor);
        if let Some(existing) = self.lookup_current(&fingerprint) {
            tracing::info!(fingerprint = %fingerprint, "Analysis matched an existing template");
            return Ok(PreparedPrompt {
                body: existing.rendered_prompt_body,
                fingerprint: Some(fingerprint.clone()),
                cache_hit: false,
                pending: PendingWrite::Link { alias, fingerprint },
            });
        }

        let body = compose_extraction_prompt(&descriptor, &self.schema);
        let template = ExtractionTemplate::new(
            fingerprint.clone(),
            descriptor,
            body.clone(),
            self.schema.version(),
        );
        tracing::debug!(fingerprint = %fingerprint, "Template cache miss");
        Ok(PreparedPrompt {
            body,
            fingerprint: Some(fingerprint),
            cache_hit: false,
            pending: PendingWrite::Learn { alias, template },
        })
    }

    /// Follow an advisory key to a usable template.
    ///
    /// The layout type is already part of the key, and a linked key may
    /// legitimately point at a template first learned under another layout
    /// type. Only the source is re-checked.
    fn lookup_cached(&self, alias: &str, university: &str) -> Option<ExtractionTemplate> {
        let fingerprint = match self.store.resolve_alias(alias) {
            Ok(Some(fp)) => fp,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Template alias lookup failed, treating as miss");
                return None;
            }
        };
        let template = self.lookup_current(&fingerprint)?;

        if normalize_university(&template.descriptor.university) != normalize_university(university) {
            tracing::warn!(
                fingerprint = %fingerprint,
                "Advisory key resolved to a template from another source, ignoring"
            );
            return None;
        }
        Some(template)
    }

    /// Look up a template rendered against the current schema version.
    fn lookup_current(&self, fingerprint: &str) -> Option<ExtractionTemplate> {
        match self.store.lookup(fingerprint) {
            Ok(Some(t)) if t.schema_version == self.schema.version() => Some(t),
            Ok(Some(t)) => {
                tracing::debug!(
                    fingerprint = %fingerprint,
                    stored_version = %t.schema_version,
                    "Stale template ignored"
                );
                None
            }
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Template lookup failed, treating as miss");
                None
            }
        }
    }

    /// Invoke extraction and validate, re-asking with the strict variant
    /// while the output is unparseable and retries remain.
    fn invoke_and_validate(
        &self,
        document: &Document,
        body: &str,
        cancel: &CancelFlag,
    ) -> Result<ExtractionResult, ExtractionError> {
        let stage = PipelineStage::Invoke;
        let params = self.config.params_for(stage);
        let max_attempts = self.config.parse_retries + 1;

        let mut attempt = 0;
        loop {
            attempt += 1;
            let variant = if attempt == 1 {
                PromptVariant::Standard
            } else {
                PromptVariant::Strict
            };
            let prompt = apply_variant(body, variant);

            let raw = self
                .client
                .infer(&prompt, &document.image, &params)
                .map_err(|source| ExtractionError::InvokeFailed { stage, source })?;

            cancel.checkpoint(PipelineStage::Validate)?;
            match self.schema.validate(&raw) {
                Ok(mut result) => {
                    result.attempts = attempt;
                    return Ok(result);
                }
                Err(failure) if attempt < max_attempts => {
                    tracing::warn!(
                        attempt,
                        reason = %failure.reason,
                        "Extraction output unparseable, retrying with strict prompt"
                    );
                    cancel.checkpoint(stage)?;
                }
                Err(failure) => {
                    return Err(ExtractionError::ParseFailure {
                        reason: failure.reason,
                        excerpt: failure.excerpt,
                        attempts: attempt,
                    });
                }
            }
        }
    }

    /// Store errors here are logged; the extraction itself already succeeded.
    fn apply_pending(&self, pending: PendingWrite) {
        let outcome = match pending {
            PendingWrite::None => Ok(()),
            PendingWrite::RecordHit { fingerprint } => self.store.record_hit(&fingerprint),
            PendingWrite::Link { alias, fingerprint } => self
                .store
                .link_alias(&alias, &fingerprint)
                .and_then(|()| self.store.record_hit(&fingerprint)),
            PendingWrite::Learn { alias, template } => {
                let fingerprint = template.fingerprint.clone();
                self.store
                    .put(&fingerprint, template)
                    .and_then(|()| self.store.link_alias(&alias, &fingerprint))
            }
        };
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "Template store update failed");
        }
    }
}

/// Use the caller's hint as the source name when detection found none.
fn with_hint_fallback(mut quick: QuickDetection, source_hint: Option<&str>) -> QuickDetection {
    if quick.university.is_none() {
        quick.university = source_hint
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .map(str::to_string);
    }
    quick
}
