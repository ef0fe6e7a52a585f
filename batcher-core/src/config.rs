// batcher-core/src/config.rs

//! Configuration management for the batching pipeline.
//!
//! This module provides configuration parsing from TOML files, environment
//! variable overrides, and validation of configuration values. One
//! `BatcherConfig` is built at startup and shared read-only (behind an `Arc`)
//! by every pipeline component.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{BatcherError, Result};

// Top-level pipeline configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BatcherConfig {
    pub data: DataConfig,
    pub batching: BatchingConfig,
    pub pipeline: PipelineConfig,
    pub storage: StorageConfig,
}

/// Input data locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// File pattern for record files, e.g. `chunked/train_*.bin`.
    /// Wildcards (`*`, `?`) are allowed in the file-name component only.
    pub data_path: String,
    /// Path to the `word frequency` vocabulary file.
    pub vocab_path: PathBuf,
    /// Maximum vocabulary size including reserved tokens (0 = unbounded).
    pub vocab_size: usize,
}

/// Shape of the examples and batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Rows per batch.
    pub batch_size: usize,
    /// Maximum encoder (article) length in tokens.
    pub max_enc_len: usize,
    /// Maximum decoder (abstract) length in tokens.
    pub max_dec_len: usize,
    /// Track in-article OOVs for a copy mechanism.
    pub pointer_gen: bool,
    /// Number of batches worth of examples sorted together per bucket.
    pub max_batch_bucket_len: usize,
}

/// Threading, buffering and stream-termination options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // Read the data once in sorted order; no supervisor.
    pub singlepass: bool,
    // Inference mode: every batch is one example replicated batch_size times.
    pub decode: bool,
    // No more data will arrive; the stream ends once drained.
    pub finished: bool,
    // Capacity of the examples queue.
    pub examples_max_buffer_len: usize,
    // Capacity of the batch queue.
    pub batch_max_buffer_len: usize,
    // Encoder worker threads (forced to 1 in single-pass mode).
    pub encoder_workers: usize,
    // Collator worker threads (forced to 1 in single-pass mode).
    pub collator_workers: usize,
    // Seconds between supervisor health checks.
    pub supervise_interval_secs: u64,
    // Optional seed for reproducible file and batch shuffling.
    pub seed: Option<u64>,
}

// Storage configuration options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    // Base path that relative data paths are resolved against.
    pub base_path: PathBuf,
    // Buffer size in bytes for I/O operations.
    pub buffer_size: usize,
    // Whether to use memory-mapped I/O.
    pub use_mmap: bool,
    // File size threshold (bytes) above which to use mmap.
    pub mmap_threshold: u64,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            data_path: String::new(),
            vocab_path: PathBuf::from("vocab"),
            vocab_size: 50_000,
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            batch_size: 16,
            max_enc_len: 400,
            max_dec_len: 100,
            pointer_gen: true,
            max_batch_bucket_len: 30,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            singlepass: false,
            decode: false,
            finished: false,
            examples_max_buffer_len: 40,
            batch_max_buffer_len: 10,
            encoder_workers: 4,
            collator_workers: 4,
            supervise_interval_secs: 60,
            seed: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("."),
            buffer_size: 64 * 1024, // 64 KB
            use_mmap: true,
            mmap_threshold: 1024 * 1024, // 1 MB
        }
    }
}

impl PipelineConfig {
    /// Encoder pool size actually used; single-pass runs one worker so the
    /// record order stays deterministic.
    pub fn effective_encoder_workers(&self) -> usize {
        if self.singlepass {
            1
        } else {
            self.encoder_workers
        }
    }

    /// Collator pool size actually used; single-pass runs one worker so at
    /// most one partial bucket is flushed at end of stream.
    pub fn effective_collator_workers(&self) -> usize {
        if self.singlepass {
            1
        } else {
            self.collator_workers
        }
    }
}

impl FromStr for BatcherConfig {
    type Err = BatcherError;

    /// Parse configuration from a TOML string.
    fn from_str(s: &str) -> Result<Self> {
        toml::from_str(s)
            .map_err(|e| BatcherError::config_with_source("failed to parse TOML config", e))
    }
}

impl BatcherConfig {
    // Load configuration from a TOML file.
    //
    // # Errors
    //
    // Returns an error if the file cannot be read, parsed, or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            BatcherError::storage_with_source(path, "failed to read config file", e)
        })?;
        let config: Self = content.parse()?;
        config.validate()?;
        Ok(config)
    }

    // Apply environment variable overrides.
    //
    // Environment variables are prefixed with `BATCHER_` and use underscores
    // to separate nested fields. For example:
    // - `BATCHER_DATA_DATA_PATH` overrides `data.data_path`
    // - `BATCHER_BATCHING_BATCH_SIZE` overrides `batching.batch_size`
    // - `BATCHER_PIPELINE_SINGLEPASS` overrides `pipeline.singlepass`
    // Values that fail to parse are ignored.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        // Data overrides
        if let Ok(val) = std::env::var("BATCHER_DATA_DATA_PATH") {
            self.data.data_path = val;
        }
        if let Ok(val) = std::env::var("BATCHER_DATA_VOCAB_PATH") {
            self.data.vocab_path = PathBuf::from(val);
        }
        override_parsed("BATCHER_DATA_VOCAB_SIZE", &mut self.data.vocab_size);

        // Batching overrides
        override_parsed("BATCHER_BATCHING_BATCH_SIZE", &mut self.batching.batch_size);
        override_parsed("BATCHER_BATCHING_MAX_ENC_LEN", &mut self.batching.max_enc_len);
        override_parsed("BATCHER_BATCHING_MAX_DEC_LEN", &mut self.batching.max_dec_len);
        override_parsed("BATCHER_BATCHING_POINTER_GEN", &mut self.batching.pointer_gen);
        override_parsed(
            "BATCHER_BATCHING_MAX_BATCH_BUCKET_LEN",
            &mut self.batching.max_batch_bucket_len,
        );

        // Pipeline overrides
        override_parsed("BATCHER_PIPELINE_SINGLEPASS", &mut self.pipeline.singlepass);
        override_parsed("BATCHER_PIPELINE_DECODE", &mut self.pipeline.decode);
        override_parsed("BATCHER_PIPELINE_FINISHED", &mut self.pipeline.finished);
        override_parsed(
            "BATCHER_PIPELINE_EXAMPLES_MAX_BUFFER_LEN",
            &mut self.pipeline.examples_max_buffer_len,
        );
        override_parsed(
            "BATCHER_PIPELINE_BATCH_MAX_BUFFER_LEN",
            &mut self.pipeline.batch_max_buffer_len,
        );
        override_parsed(
            "BATCHER_PIPELINE_ENCODER_WORKERS",
            &mut self.pipeline.encoder_workers,
        );
        override_parsed(
            "BATCHER_PIPELINE_COLLATOR_WORKERS",
            &mut self.pipeline.collator_workers,
        );
        override_parsed(
            "BATCHER_PIPELINE_SUPERVISE_INTERVAL_SECS",
            &mut self.pipeline.supervise_interval_secs,
        );
        if let Ok(val) = std::env::var("BATCHER_PIPELINE_SEED") {
            if let Ok(v) = val.parse() {
                self.pipeline.seed = Some(v);
            }
        }

        // Storage overrides
        if let Ok(val) = std::env::var("BATCHER_STORAGE_BASE_PATH") {
            self.storage.base_path = PathBuf::from(val);
        }
        override_parsed("BATCHER_STORAGE_BUFFER_SIZE", &mut self.storage.buffer_size);
        override_parsed("BATCHER_STORAGE_USE_MMAP", &mut self.storage.use_mmap);
        override_parsed(
            "BATCHER_STORAGE_MMAP_THRESHOLD",
            &mut self.storage.mmap_threshold,
        );

        self
    }

    // Validate all configuration values.
    //
    // # Errors
    //
    // Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.data.data_path.is_empty() {
            return Err(BatcherError::config("data.data_path must not be empty"));
        }

        let positive = [
            ("batching.batch_size", self.batching.batch_size),
            ("batching.max_enc_len", self.batching.max_enc_len),
            ("batching.max_dec_len", self.batching.max_dec_len),
            ("batching.max_batch_bucket_len", self.batching.max_batch_bucket_len),
            ("pipeline.examples_max_buffer_len", self.pipeline.examples_max_buffer_len),
            ("pipeline.batch_max_buffer_len", self.pipeline.batch_max_buffer_len),
            ("pipeline.encoder_workers", self.pipeline.encoder_workers),
            ("pipeline.collator_workers", self.pipeline.collator_workers),
            ("storage.buffer_size", self.storage.buffer_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(BatcherError::config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.pipeline.supervise_interval_secs == 0 {
            return Err(BatcherError::config(
                "pipeline.supervise_interval_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn override_parsed<T: FromStr>(key: &str, target: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *target = v;
        }
    }
}
