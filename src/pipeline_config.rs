//! Pipeline configuration: per-stage sampling parameters, the inference
//! deadline and the bounded retry counts.
//!
//! The configuration is built once (defaults, optionally overlaid by a JSON
//! file) and handed to the pipeline by value. Nothing mutates it afterwards.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::inference::InferenceParams;
use crate::pipeline::PipelineStage;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Sampling parameters for one model call site.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StageParams {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
        }
    }
}

/// Immutable pipeline configuration.
///
/// Defaults follow the tuned values of the transcript prompts: detection is
/// factual (0.1, 500 tokens), layout analysis slightly looser (0.2, 2000),
/// extraction precise with room for multi-semester output (0.1, 4000).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Quick university/layout detection.
    pub detection: StageParams,
    /// Deep layout analysis.
    pub analysis: StageParams,
    /// Final structured extraction.
    pub extraction: StageParams,
    /// Deadline for every inference call, in seconds.
    pub invoke_timeout_secs: u64,
    /// Re-invocations with the strict prompt after unparseable extraction output.
    pub parse_retries: u32,
    /// Re-invocations after a malformed quick-detect answer.
    pub quick_detect_retries: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            detection: StageParams::new(0.1, 500),
            analysis: StageParams::new(0.2, 2000),
            extraction: StageParams::new(0.1, 4000),
            invoke_timeout_secs: 300,
            parse_retries: 1,
            quick_detect_retries: 1,
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Derivation
// ═══════════════════════════════════════════════════════════

impl PipelineConfig {
    pub fn invoke_timeout(&self) -> Duration {
        Duration::from_secs(self.invoke_timeout_secs)
    }

    /// Inference parameters for the model call made at `stage`.
    ///
    /// Stages without a model call of their own fall back to extraction.
    pub fn params_for(&self, stage: PipelineStage) -> InferenceParams {
        let stage_params = match stage {
            PipelineStage::QuickDetect => self.detection,
            PipelineStage::DeepAnalyze => self.analysis,
            _ => self.extraction,
        };
        InferenceParams {
            temperature: stage_params.temperature,
            max_tokens: stage_params.max_tokens,
            timeout: self.invoke_timeout(),
        }
    }

    /// Load a config file. Missing keys take their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Load `path` when it exists, defaults otherwise.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, params) in [
            ("detection", self.detection),
            ("analysis", self.analysis),
            ("extraction", self.extraction),
        ] {
            if !(0.0..=2.0).contains(&params.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "{name}.temperature must be within 0.0..=2.0, got {}",
                    params.temperature
                )));
            }
            if params.max_tokens == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{name}.max_tokens must be positive"
                )));
            }
        }
        if self.invoke_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "invoke_timeout_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
