// batcher-core/src/testing.rs

//! Shared fixtures for unit tests.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::dataset::RawRecord;
use crate::error::{BatcherError, Result};
use crate::storage::{ObjectMeta, StorageBackend, StorageReader};
use crate::vocab::Vocab;

/// Builds a vocabulary whose learned words get ids 4, 5, ... in order.
pub(crate) fn vocab_from_words(words: &[&str]) -> Vocab {
    let text: String = words.iter().map(|w| format!("{w} 1\n")).collect();
    Vocab::from_reader(Cursor::new(text.into_bytes()), 0).unwrap()
}

pub(crate) fn write_vocab_file(dir: &Path, words: &[&str]) -> PathBuf {
    let path = dir.join("vocab");
    let text: String = words
        .iter()
        .enumerate()
        .map(|(i, w)| format!("{w} {}\n", 1000 - i))
        .collect();
    fs::write(&path, text).unwrap();
    path
}

/// Records `article {i}` / `<s> summary {i} . </s>` for `i` in
/// `start..start + count`.
pub(crate) fn numbered_records(start: usize, count: usize) -> Vec<RawRecord> {
    (start..start + count)
        .map(|i| RawRecord {
            article: format!("article {i}"),
            abstract_text: format!("<s> summary {i} . </s>"),
        })
        .collect()
}

pub(crate) fn framed_records(records: &[RawRecord]) -> Vec<u8> {
    let mut out = Vec::new();
    for record in records {
        record.write_framed(&mut out).unwrap();
    }
    out
}

pub(crate) fn write_record_file(dir: &Path, name: &str, records: &[RawRecord]) -> PathBuf {
    let path = dir.join(name);
    let mut writer = BufWriter::new(File::create(&path).unwrap());
    writer.write_all(&framed_records(records)).unwrap();
    writer.flush().unwrap();
    path
}

/// In-memory storage backend. Can be told to fail a number of opens.
pub(crate) struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    failing_opens: AtomicUsize,
    opens: AtomicUsize,
}

impl MemoryStorage {
    pub(crate) fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            failing_opens: AtomicUsize::new(0),
            opens: AtomicUsize::new(0),
        }
    }

    pub(crate) fn add_file(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files.lock().unwrap().insert(path.into(), data);
    }

    pub(crate) fn add_records(&self, path: impl Into<PathBuf>, records: &[RawRecord]) {
        self.add_file(path, framed_records(records));
    }

    /// Makes the next `n` calls to `open_read` fail.
    pub(crate) fn fail_next_opens(&self, n: usize) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    pub(crate) fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

impl StorageBackend for MemoryStorage {
    fn exists(&self, path: &Path) -> Result<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    fn metadata(&self, path: &Path) -> Result<ObjectMeta> {
        if !self.files.lock().unwrap().contains_key(path) {
            return Err(BatcherError::storage(path, "not found"));
        }
        Ok(ObjectMeta { is_dir: false })
    }

    fn open_read(&self, path: &Path) -> Result<Box<dyn StorageReader>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_opens
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(BatcherError::storage(path, "injected open failure"));
        }

        let files = self.files.lock().unwrap();
        let data = files
            .get(path)
            .ok_or_else(|| BatcherError::storage(path, "not found"))?
            .clone();

        Ok(Box::new(Cursor::new(data)))
    }

    fn list(&self, prefix: &Path) -> Result<Vec<String>> {
        let files = self.files.lock().unwrap();
        let mut names: Vec<String> = files
            .keys()
            .filter(|path| path.parent().unwrap_or(Path::new("")) == prefix)
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}
