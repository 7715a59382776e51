//! Static indexing configuration, loaded once and passed by value.

use crate::chunking::DEFAULT_CHUNK_SIZE;
use crate::embeddings::{RetryPolicy, DEFAULT_MAX_ATTEMPTS};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub max_concurrent_requests: Option<usize>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_requests: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexConfig {
    pub directories: Vec<PathBuf>,
    pub extensions: Vec<String>,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub prune_missing: bool,
    #[serde(default)]
    pub follow_symlinks: bool,
}

impl IndexConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|source| ConfigError::Malformed {
            path: path.display().to_string(),
            source,
        })?;
        config.validated()
    }

    /// Checks invariants and canonicalizes extensions to lowercase without a
    /// leading dot.
    pub fn validated(mut self) -> Result<Self, ConfigError> {
        if self.directories.is_empty() {
            return Err(ConfigError::Invalid("directories must not be empty".to_string()));
        }

        self.extensions = self
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self.extensions.sort();
        self.extensions.dedup();
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("extensions must not be empty".to_string()));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be greater than zero".to_string()));
        }
        if self.embedding.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "embedding.max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.embedding.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "embedding.request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.embedding.max_concurrent_requests == Some(0) {
            return Err(ConfigError::Invalid(
                "embedding.max_concurrent_requests must be greater than zero".to_string(),
            ));
        }
        if self.embedding.model.trim().is_empty() {
            return Err(ConfigError::Invalid("embedding.model must not be empty".to_string()));
        }

        Url::parse(&self.embedding.endpoint)?;
        Ok(self)
    }

    pub fn allows_extension(&self, extension: &str) -> bool {
        self.extensions
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(extension))
    }
}

fn default_endpoint() -> String {
    "http://localhost:11434/api/embeddings".to_string()
}

fn default_model() -> String {
    "nomic-embed-text".to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_database_path() -> PathBuf {
    PathBuf::from("index.sqlite")
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}
