// batcher-core/src/dataset/mod.rs

//! Raw record input: framing, record decoding and the record source.
//!
//! # Example
//!
//! ```no_run
//! use batcher_core::config::StorageConfig;
//! use batcher_core::dataset::{PassMode, RecordSource};
//! use batcher_core::storage::{LocalStorage, StorageBackend};
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! let storage: Arc<dyn StorageBackend> =
//!     Arc::new(LocalStorage::new(&StorageConfig::default()).unwrap());
//! let source = RecordSource::new(
//!     storage,
//!     "chunked/val_*.bin",
//!     PassMode::SinglePass,
//!     Arc::new(AtomicBool::new(false)),
//!     None,
//! )
//! .unwrap();
//!
//! for record in source {
//!     let record = record.unwrap();
//!     println!("{} sentences", record.abstract_sentences().len());
//! }
//! ```

mod framing;
mod record;
mod source;

pub use framing::{FrameReader, LengthPrefixedFormat};
pub use record::{split_sentences, RawRecord, SENTENCE_END, SENTENCE_START};
pub use source::{FilePattern, PassMode, RecordSource};
