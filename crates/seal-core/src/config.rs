use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{SealError, SealResult};

/// Default plaintext bytes per chunk (1 MiB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Smallest chunk size accepted for encryption
pub const MIN_CHUNK_SIZE: usize = 1024;

/// Largest chunk size accepted for encryption (and for decoded records)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Top-level configuration (loaded from seal.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SealConfig {
    pub logging: LoggingConfig,
    pub stream: StreamConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter (default: warn)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

/// Streaming orchestrator tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Plaintext bytes per chunk when encrypting (default: 1 MiB).
    /// Decryption ignores this and follows the per-record lengths.
    pub chunk_size: usize,
    /// Capacity of the bounded queue between chunk reader and chunk cipher
    pub queue_depth: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Extension appended to encrypted file names (default: enc)
    pub encrypted_suffix: String,
    /// Extension recorded when the input has none (default: bin)
    pub default_extension: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".into(),
            format: "text".into(),
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_depth: 4,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            encrypted_suffix: "enc".into(),
            default_extension: "bin".into(),
        }
    }
}

impl SealConfig {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(s: &str) -> SealResult<Self> {
        let config: SealConfig =
            toml::from_str(s).map_err(|e| SealError::Config(format!("parsing config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path`, falling back to defaults if the file does not exist.
    pub fn load(path: &Path) -> SealResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| SealError::Config(format!("reading config {}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> SealResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SealError::Config(format!("serializing config: {e}")))
    }

    pub fn validate(&self) -> SealResult<()> {
        self.stream.validate()?;
        if !matches!(self.logging.format.as_str(), "json" | "text") {
            return Err(SealError::Config(format!(
                "logging.format must be \"json\" or \"text\", got {:?}",
                self.logging.format
            )));
        }
        if self.output.default_extension.len() > 255 {
            return Err(SealError::Config("output.default_extension exceeds 255 bytes".into()));
        }
        Ok(())
    }
}

impl StreamConfig {
    pub fn validate(&self) -> SealResult<()> {
        if !(MIN_CHUNK_SIZE..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(SealError::Config(format!(
                "stream.chunk_size must be within {MIN_CHUNK_SIZE}..={MAX_CHUNK_SIZE}, got {}",
                self.chunk_size
            )));
        }
        if self.queue_depth == 0 {
            return Err(SealError::Config("stream.queue_depth must be at least 1".into()));
        }
        Ok(())
    }
}
