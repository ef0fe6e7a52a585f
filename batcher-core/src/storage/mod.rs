// batcher-core/src/storage/mod.rs

//! Storage abstraction for the record source.
//!
//! The record source never opens files directly; it goes through a
//! `StorageBackend`, which resolves paths against a configured base and
//! hands back sequential readers.
//!
//! # Example
//!
//! ```no_run
//! use batcher_core::config::StorageConfig;
//! use batcher_core::storage::{LocalStorage, StorageBackend};
//! use std::io::Read;
//! use std::path::Path;
//!
//! let storage = LocalStorage::new(&StorageConfig::default()).unwrap();
//! for name in storage.list(Path::new("chunked")).unwrap() {
//!     println!("{name}");
//! }
//!
//! let mut reader = storage.open_read(Path::new("chunked/train_000.bin")).unwrap();
//! let mut prefix = [0u8; 8];
//! reader.read_exact(&mut prefix).unwrap();
//! ```

mod local;
mod traits;

pub use local::LocalStorage;
pub use traits::{ObjectMeta, StorageBackend, StorageReader};
