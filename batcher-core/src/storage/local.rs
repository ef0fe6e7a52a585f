// batcher-core/src/storage/local.rs

//! Local filesystem storage backend.
//!
//! Record files are read front to back, so small files go through a
//! `BufReader` and large ones are memory-mapped once and copied out of the
//! mapping frame by frame.

use std::fs::{self, File};
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::traits::{ObjectMeta, StorageBackend, StorageReader};
use crate::config::StorageConfig;
use crate::error::{BatcherError, Result};

/// Local filesystem storage backend.
pub struct LocalStorage {
    /// Base path that relative paths are resolved against.
    base_path: PathBuf,
    /// Buffer size for buffered I/O operations.
    buffer_size: usize,
    /// Whether to use memory-mapped I/O.
    use_mmap: bool,
    /// File size threshold above which to use mmap.
    mmap_threshold: u64,
}

impl LocalStorage {
    /// Creates a new `LocalStorage` instance from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the base path does not exist or is not a directory.
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let base_path = config.base_path.clone();

        if !base_path.is_dir() {
            return Err(BatcherError::storage(
                &base_path,
                "base path does not exist or is not a directory",
            ));
        }

        Ok(Self {
            base_path,
            buffer_size: config.buffer_size,
            use_mmap: config.use_mmap,
            mmap_threshold: config.mmap_threshold,
        })
    }

    /// Resolves a path relative to the base path.
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_path.join(path)
        }
    }
}

impl StorageBackend for LocalStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.resolve_path(path).exists())
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        let full_path = self.resolve_path(path);
        let meta = fs::metadata(&full_path).map_err(|e| {
            BatcherError::storage_with_source(&full_path, "failed to read metadata", e)
        })?;

        Ok(ObjectMeta {
            is_dir: meta.is_dir(),
        })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        let full_path = self.resolve_path(path);
        let file = File::open(&full_path)
            .map_err(|e| BatcherError::storage_with_source(&full_path, "failed to open file", e))?;

        let size = file
            .metadata()
            .map_err(|e| {
                BatcherError::storage_with_source(&full_path, "failed to read file metadata", e)
            })?
            .len();

        // An empty file cannot be mapped on every platform
        if self.use_mmap && size > 0 && size >= self.mmap_threshold {
            // SAFETY: The file is opened read-only and the Mmap lives as long
            // as the reader that owns it.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| {
                BatcherError::storage_with_source(&full_path, "failed to memory-map file", e)
            })?;

            Ok(Box::new(MmapReader { mmap, pos: 0 }))
        } else {
            Ok(Box::new(BufReader::with_capacity(self.buffer_size, file)))
        }
    }

    fn list(&self, prefix: &Path) -> Result<Vec<String>> {
        let full_path = self.resolve_path(prefix);

        if !full_path.exists() {
            return Ok(Vec::new());
        }

        if !full_path.is_dir() {
            return Err(BatcherError::storage(&full_path, "path is not a directory"));
        }

        let mut entries = Vec::new();

        for entry in fs::read_dir(&full_path).map_err(|e| {
            BatcherError::storage_with_source(&full_path, "failed to read directory", e)
        })? {
            let entry = entry.map_err(|e| {
                BatcherError::storage_with_source(&full_path, "failed to read directory entry", e)
            })?;

            if let Some(name) = entry.file_name().to_str() {
                entries.push(name.to_string());
            }
        }

        entries.sort();
        Ok(entries)
    }
}

/// Memory-mapped file reader for local storage.
struct MmapReader {
    mmap: Mmap,
    pos: usize,
}

impl Read for MmapReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = &self.mmap[self.pos.min(self.mmap.len())..];
        let to_read = buf.len().min(remaining.len());

        buf[..to_read].copy_from_slice(&remaining[..to_read]);
        self.pos += to_read;
        Ok(to_read)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn create_test_storage() -> (LocalStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().to_path_buf(),
            buffer_size: 4096,
            use_mmap: true,
            mmap_threshold: 1024, // Low threshold for testing
        };
        let storage = LocalStorage::new(&config).unwrap();
        (storage, temp_dir)
    }

    #[test]
    fn test_new_requires_existing_base_dir() {
        let temp_dir = TempDir::new().unwrap();
        let config = StorageConfig {
            base_path: temp_dir.path().join("missing"),
            ..Default::default()
        };
        assert!(LocalStorage::new(&config).is_err());
    }

    #[test]
    fn test_exists_and_metadata() {
        let (storage, temp_dir) = create_test_storage();
        fs::write(temp_dir.path().join("a.bin"), b"hello").unwrap();

        assert!(storage.exists(Path::new("a.bin")).unwrap());
        assert!(!storage.exists(Path::new("b.bin")).unwrap());

        let meta = storage.metadata(Path::new("a.bin")).unwrap();
        assert!(!meta.is_dir);
        assert!(storage.metadata(Path::new("")).unwrap().is_dir);

        assert!(storage.metadata(Path::new("b.bin")).is_err());
    }

    #[test]
    fn test_read_small_file_buffered() {
        let (storage, temp_dir) = create_test_storage();
        fs::write(temp_dir.path().join("small.bin"), b"small data").unwrap();

        let mut reader = storage.open_read(Path::new("small.bin")).unwrap();

        let mut content = Vec::new();
        reader.read_to_end(&mut content).unwrap();
        assert_eq!(content, b"small data");
    }

    #[test]
    fn test_read_large_file_mmap() {
        let (storage, temp_dir) = create_test_storage();
        let data: Vec<u8> = (0..4096u32).map(|i| (i % 251) as u8).collect();
        fs::write(temp_dir.path().join("large.bin"), &data).unwrap();

        let mut reader = storage.open_read(Path::new("large.bin")).unwrap();

        let mut head = [0u8; 8];
        reader.read_exact(&mut head).unwrap();
        assert_eq!(&head, &data[..8]);

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, &data[8..]);
        assert_eq!(reader.read(&mut head).unwrap(), 0);
    }

    #[test]
    fn test_open_missing_file() {
        let (storage, _temp_dir) = create_test_storage();
        let err = match storage.open_read(Path::new("nope.bin")) {
            Ok(_) => panic!("expected an error"),
            Err(e) => e,
        };
        assert!(err.to_string().contains("failed to open file"));
    }

    #[test]
    fn test_list_sorted_and_missing() {
        let (storage, temp_dir) = create_test_storage();
        fs::write(temp_dir.path().join("train_002.bin"), b"").unwrap();
        fs::write(temp_dir.path().join("train_001.bin"), b"").unwrap();

        let entries = storage.list(Path::new("")).unwrap();
        assert_eq!(entries, vec!["train_001.bin", "train_002.bin"]);

        assert!(storage.list(Path::new("missing")).unwrap().is_empty());
        assert!(storage.list(Path::new("train_001.bin")).is_err());
    }

    #[test]
    fn test_object_safety() {
        let (storage, _temp_dir) = create_test_storage();
        let shared: Arc<dyn StorageBackend> = Arc::new(storage);
        assert!(shared.exists(Path::new("")).unwrap());
    }
}
