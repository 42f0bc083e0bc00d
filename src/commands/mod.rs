//! Command-line surface: argument definitions and handlers.

pub mod extract;
pub mod schema;
pub mod templates;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::pipeline::inference::InferenceError;
use crate::pipeline::templates::StoreError;
use crate::pipeline_config::ConfigError;

#[derive(Error, Debug)]
pub enum CommandError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Template store error: {0}")]
    Store(#[from] StoreError),

    #[error("Inference client error: {0}")]
    Inference(#[from] InferenceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("{failed} of {total} document(s) failed")]
    DocumentsFailed { failed: usize, total: usize },
}

#[derive(Parser, Debug)]
#[command(name = "transcript-parser")]
#[command(version, about = "Template-driven structured extraction for student transcript images")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Pipeline config file (JSON). Defaults to the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Template store database. Defaults to the app data directory.
    #[arg(long, global = true, value_name = "FILE")]
    pub store: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract structured data from transcript images
    Extract {
        /// Image files (PNG or JPEG)
        #[arg(required = true, value_name = "IMAGE")]
        images: Vec<PathBuf>,

        /// Expected source institution, used when detection cannot name it
        #[arg(long)]
        hint: Option<String>,

        /// Documents processed in parallel
        #[arg(long, short = 'j', default_value_t = 2)]
        jobs: usize,

        /// Keep templates in memory only for this run
        #[arg(long)]
        no_cache: bool,

        /// Write each result to this directory as <image>.json instead of stdout
        #[arg(long, value_name = "DIR")]
        out_dir: Option<PathBuf>,
    },

    /// Print the canonical schema
    Schema {
        /// Print the full schema tree instead of the example payload
        #[arg(long)]
        tree: bool,
    },

    /// Inspect or clear learned templates
    Templates {
        #[command(subcommand)]
        action: TemplatesAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum TemplatesAction {
    /// List learned templates
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show one template's prompt body
    Show {
        /// Full fingerprint
        fingerprint: String,
    },

    /// Remove one template
    Remove {
        fingerprint: String,
    },

    /// Remove every template
    Clear,
}

impl Cli {
    pub fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .unwrap_or_else(crate::config::config_file_path)
    }

    pub fn store_path(&self) -> PathBuf {
        self.store
            .clone()
            .unwrap_or_else(crate::config::templates_db_path)
    }
}

/// Dispatch a parsed command line.
pub fn run(cli: Cli) -> Result<(), CommandError> {
    match &cli.command {
        Commands::Extract {
            images,
            hint,
            jobs,
            no_cache,
            out_dir,
        } => extract::handle_extract(
            &cli,
            extract::ExtractArgs {
                images: images.clone(),
                hint: hint.clone(),
                jobs: *jobs,
                no_cache: *no_cache,
                out_dir: out_dir.clone(),
            },
        ),
        Commands::Schema { tree } => schema::handle_schema(*tree),
        Commands::Templates { action } => templates::handle_templates(&cli.store_path(), action),
    }
}
