//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use std::str::FromStr;

use study_assistant_core::{PipelineSettings, RetrievalSettings};
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    /// When absent the server keeps documents and counters in memory.
    pub database_url: Option<String>,
    pub log_level: Level,
    pub openai_api_key: Option<String>,
    pub generation_model: String,
    pub max_upload_bytes: usize,
    pub cors_origin: String,
    pub pipeline: PipelineSettings,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Load Generation Settings ---
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok();
        let generation_model =
            std::env::var("GENERATION_MODEL").unwrap_or_else(|_| "gpt-3.5-turbo".to_string());

        // --- Load Pipeline Tunables ---
        let defaults = PipelineSettings::default();
        let pipeline = PipelineSettings {
            chunk_size: positive("NOTES_CHUNK_SIZE", defaults.chunk_size)?,
            max_chunks: positive("NOTES_MAX_CHUNKS", defaults.max_chunks)?,
            retrieval: RetrievalSettings {
                window_words: positive("RETRIEVAL_WINDOW_WORDS", defaults.retrieval.window_words)?,
                overlap_words: parse_var("RETRIEVAL_OVERLAP_WORDS", defaults.retrieval.overlap_words)?,
                top_k: positive("RETRIEVAL_TOP_K", defaults.retrieval.top_k)?,
                ..defaults.retrieval
            },
            ..defaults
        };

        let max_upload_bytes = positive("MAX_UPLOAD_BYTES", 10 * 1024 * 1024)?;
        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            openai_api_key,
            generation_model,
            max_upload_bytes,
            cors_origin,
            pipeline,
        })
    }
}

/// Reads `name`, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string())),
        Err(_) => Ok(default),
    }
}

fn positive(name: &str, default: usize) -> Result<usize, ConfigError> {
    let value = parse_var(name, default)?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            name.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_values_are_validated() {
        std::env::set_var("CONFIG_TEST_NUMBER", "abc");
        assert!(matches!(
            parse_var::<usize>("CONFIG_TEST_NUMBER", 1),
            Err(ConfigError::InvalidValue(name, _)) if name == "CONFIG_TEST_NUMBER"
        ));

        std::env::set_var("CONFIG_TEST_ZERO", "0");
        assert!(positive("CONFIG_TEST_ZERO", 5).is_err());

        assert_eq!(positive("CONFIG_TEST_UNSET_VALUE", 5).unwrap(), 5);
    }
}
