// batcher-core/src/lib.rs

//! Seq2seq Batcher - Core Library
//!
//! Turns a stream of article/abstract records on disk into fixed-shape,
//! length-bucketed minibatches for a pointer-generator summarization model.
//! Records are encoded into examples and collated into batches by two pools
//! of worker threads connected through bounded queues.

pub mod config;
pub mod error;
pub mod storage;

// Re-export commonly used types for convenience
pub use config::BatcherConfig;
pub use error::{BatcherError, Result};
pub use storage::{LocalStorage, ObjectMeta, StorageBackend, StorageReader};

pub mod dataset;
pub use dataset::{PassMode, RawRecord, RecordSource};

pub mod vocab;
pub use vocab::{output_to_words, Vocab};

pub mod example;
pub use example::{Example, OovInputs};

pub mod batch;
pub use batch::{Batch, PointerBatch};

pub mod pipeline;
pub use pipeline::{Batcher, PipelineStats, RestartPolicy};

#[cfg(test)]
pub(crate) mod testing;
