// batcher-core/src/storage/traits.rs

//! Storage abstraction traits for the record source.
//!
//! The record source only ever reads: it enumerates data files and streams
//! their frames. Keeping that behind a trait lets tests and alternative
//! backends feed the pipeline without touching the local filesystem layout.

use std::io::Read;
use std::path::Path;

use crate::error::Result;

/// Metadata about a stored object.
#[derive(Debug, Clone)]
pub struct ObjectMeta {
    /// Whether this object is a directory.
    pub is_dir: bool,
}

/// A handle for reading from storage, front to back.
pub trait StorageReader: Read + Send {}

impl<R: Read + Send> StorageReader for R {}

/// Read-only storage backend.
///
/// This trait is object-safe and is shared as `Arc<dyn StorageBackend>`
/// between the record source and whoever resolves file patterns.
pub trait StorageBackend: Send + Sync {
    /// Checks if an object exists at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the existence check fails (e.g., permission denied).
    fn exists(&self, path: &Path) -> Result<bool>;

    /// Retrieves metadata for an object.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or metadata cannot be read.
    fn metadata(&self, path: &Path) -> Result<ObjectMeta>;

    /// Opens an object for reading.
    ///
    /// # Errors
    ///
    /// Returns an error if the object doesn't exist or cannot be opened.
    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>>;

    /// Lists the entries of a directory, sorted by name.
    ///
    /// Returns names relative to `prefix`. A missing directory lists as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the listing fails.
    fn list(&self, prefix: &Path) -> Result<Vec<String>>;
}
