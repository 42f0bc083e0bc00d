use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{Cli, CommandError};
use crate::config;
use crate::pipeline::inference::OllamaVisionClient;
use crate::pipeline::templates::{InMemoryTemplateStore, SqliteTemplateStore, TemplateStore};
use crate::pipeline::{extract_batch, BatchJob, BatchOutcome, Document, ExtractionPipeline};
use crate::pipeline_config::PipelineConfig;

pub struct ExtractArgs {
    pub images: Vec<PathBuf>,
    pub hint: Option<String>,
    pub jobs: usize,
    pub no_cache: bool,
    pub out_dir: Option<PathBuf>,
}

pub fn handle_extract(cli: &Cli, args: ExtractArgs) -> Result<(), CommandError> {
    let pipeline_config = PipelineConfig::load_or_default(&cli.config_path())?;

    let store: Arc<dyn TemplateStore> = if args.no_cache {
        Arc::new(InMemoryTemplateStore::new())
    } else {
        let path = cli.store_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Arc::new(SqliteTemplateStore::open(&path)?)
    };

    let base_url = config::ollama_base_url();
    let model = config::vision_model();
    let client = Arc::new(OllamaVisionClient::new(&base_url, &model)?);
    tracing::info!(url = %base_url, model = %model, "Using Ollama vision model");

    let pipeline = Arc::new(ExtractionPipeline::new(client, store, pipeline_config));

    let mut jobs = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let mut job = BatchJob::new(Document::from_path(path)?);
        if let Some(hint) = &args.hint {
            job = job.with_hint(hint);
        }
        jobs.push(job);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| CommandError::Runtime(e.to_string()))?;
    // The blocking HTTP client must not be dropped inside the runtime, so the
    // last pipeline handle stays out here.
    let outcomes = runtime.block_on(extract_batch(pipeline.clone(), jobs, args.jobs));
    drop(runtime);
    drop(pipeline);

    if let Some(dir) = &args.out_dir {
        std::fs::create_dir_all(dir)?;
    }

    let total = outcomes.len();
    let mut failed = 0;
    for (outcome, path) in outcomes.iter().zip(&args.images) {
        if !report_outcome(outcome, path, args.out_dir.as_deref())? {
            failed += 1;
        }
    }

    if failed > 0 {
        return Err(CommandError::DocumentsFailed { failed, total });
    }
    Ok(())
}

/// Print or write one outcome. Returns whether the document succeeded.
fn report_outcome(
    outcome: &BatchOutcome,
    path: &Path,
    out_dir: Option<&Path>,
) -> Result<bool, CommandError> {
    let result = match &outcome.result {
        Ok(result) => result,
        Err(e) => {
            eprintln!("{}: failed at {}: {e}", path.display(), e.stage());
            return Ok(false);
        }
    };

    let json = serde_json::to_string_pretty(&result.to_output_json())?;
    match out_dir {
        Some(dir) => {
            let target = output_path(dir, path);
            std::fs::write(&target, json)?;
            eprintln!(
                "{} -> {} ({} field issue(s), {} ms{})",
                path.display(),
                target.display(),
                result.errors.len(),
                outcome.duration_ms,
                if result.cache_hit { ", cached template" } else { "" }
            );
        }
        None => println!("{json}"),
    }
    Ok(true)
}

fn output_path(dir: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    dir.join(format!("{stem}.json"))
}
