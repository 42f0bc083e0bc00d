use std::path::PathBuf;

/// Application-level constants
pub const APP_NAME: &str = "transcript-parser";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Ollama defaults, overridable through the environment.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_VISION_MODEL: &str = "llama3.2-vision";
pub const OLLAMA_URL_ENV: &str = "TRANSCRIPT_OLLAMA_URL";
pub const MODEL_ENV: &str = "TRANSCRIPT_MODEL";

/// Get the application data directory
/// `<data dir>/transcript-parser/`, falling back to the working directory
/// when the platform reports no data directory.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

/// Durable template store location
pub fn templates_db_path() -> PathBuf {
    app_data_dir().join("templates.db")
}

/// Optional pipeline config file
pub fn config_file_path() -> PathBuf {
    app_data_dir().join("config.json")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> String {
    format!("{}=info,warn", env!("CARGO_CRATE_NAME"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn ollama_base_url() -> String {
    env_or(OLLAMA_URL_ENV, DEFAULT_OLLAMA_URL)
}

pub fn vision_model() -> String {
    env_or(MODEL_ENV, DEFAULT_VISION_MODEL)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with(APP_NAME));
    }

    #[test]
    fn store_and_config_under_app_data() {
        let app = app_data_dir();
        assert!(templates_db_path().starts_with(&app));
        assert!(templates_db_path().ends_with("templates.db"));
        assert!(config_file_path().starts_with(&app));
    }

    #[test]
    fn default_filter_targets_crate() {
        assert_eq!(default_log_filter(), "transcript_parser=info,warn");
    }

    #[test]
    fn env_or_falls_back_on_unset() {
        assert_eq!(
            env_or("TRANSCRIPT_PARSER_TEST_UNSET_VARIABLE", "fallback"),
            "fallback"
        );
    }

    #[test]
    fn app_version_matches_cargo() {
        assert_eq!(APP_VERSION, "0.1.0");
    }
}
