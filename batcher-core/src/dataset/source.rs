// batcher-core/src/dataset/source.rs

//! Lazy, possibly endless stream of raw records read from a set of files.
//!
//! The files are selected by a pattern such as `chunked/train_*.bin`. In
//! continuous mode the pattern is re-resolved and the file list reshuffled at
//! the start of every pass, forever. In single-pass mode the files are read
//! once in sorted order.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::framing::{FrameReader, LengthPrefixedFormat};
use super::record::RawRecord;
use crate::config::PipelineConfig;
use crate::error::{BatcherError, Result};
use crate::storage::{StorageBackend, StorageReader};

const WILDCARDS: &[char] = &['*', '?'];

/// How many times the file set is traversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Shuffle and re-read all files forever (until marked finished).
    Continuous,
    /// Read all files once in sorted order.
    SinglePass,
}

impl PassMode {
    pub fn from_config(config: &PipelineConfig) -> Self {
        if config.singlepass {
            Self::SinglePass
        } else {
            Self::Continuous
        }
    }
}

/// A file pattern with `*` and `?` wildcards in its last component.
#[derive(Debug, Clone)]
pub struct FilePattern {
    raw: String,
    dir: PathBuf,
    name: String,
}

impl FilePattern {
    /// Parses a pattern.
    ///
    /// # Errors
    ///
    /// Returns a `Config` error if the pattern is empty, has no file-name
    /// component, or uses wildcards in a directory component.
    pub fn parse(pattern: &str) -> Result<Self> {
        let path = Path::new(pattern);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BatcherError::config(format!("invalid data pattern '{pattern}'")))?
            .to_string();
        let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        if dir.to_string_lossy().contains(WILDCARDS) {
            return Err(BatcherError::config(format!(
                "data pattern '{pattern}' may only use wildcards in the file name"
            )));
        }

        Ok(Self {
            raw: pattern.to_string(),
            dir,
            name,
        })
    }

    /// Lists matching files, sorted by name.
    pub fn resolve(&self, storage: &dyn StorageBackend) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        if !self.name.contains(WILDCARDS) {
            let path = self.dir.join(&self.name);
            if storage.exists(&path)? && !storage.metadata(&path)?.is_dir {
                files.push(path);
            }
            return Ok(files);
        }

        for entry in storage.list(&self.dir)? {
            if !wildcard_match(&self.name, &entry) {
                continue;
            }
            let path = self.dir.join(&entry);
            if !storage.metadata(&path)?.is_dir {
                files.push(path);
            }
        }

        Ok(files)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

/// Matches `text` against a pattern where `*` is any run and `?` any char.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|&c| c == '*')
}

struct OpenFile {
    path: PathBuf,
    frames: FrameReader<Box<dyn StorageReader>>,
}

/// Cursor over the records of every matching file.
///
/// Not thread-safe on its own; the pipeline shares one instance behind a
/// mutex so that concurrent workers neither duplicate nor drop records.
pub struct RecordSource {
    storage: Arc<dyn StorageBackend>,
    pattern: FilePattern,
    mode: PassMode,
    finished: Arc<AtomicBool>,
    format: LengthPrefixedFormat,
    rng: StdRng,
    pending: VecDeque<PathBuf>,
    current: Option<OpenFile>,
    passes: u64,
    records_this_pass: u64,
    exhausted: bool,
}

impl RecordSource {
    /// Creates a source and resolves the first pass's file list.
    ///
    /// # Errors
    ///
    /// Fails if the pattern is invalid or matches no files.
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        pattern: &str,
        mode: PassMode,
        finished: Arc<AtomicBool>,
        seed: Option<u64>,
    ) -> Result<Self> {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut source = Self {
            storage,
            pattern: FilePattern::parse(pattern)?,
            mode,
            finished,
            format: LengthPrefixedFormat::new(),
            rng,
            pending: VecDeque::new(),
            current: None,
            passes: 0,
            records_this_pass: 0,
            exhausted: false,
        };
        source.start_pass()?;
        Ok(source)
    }

    fn start_pass(&mut self) -> Result<()> {
        let mut files = self.pattern.resolve(self.storage.as_ref())?;
        if files.is_empty() {
            return Err(BatcherError::dataset(
                self.pattern.as_str(),
                "no files match the data pattern",
            ));
        }

        if self.mode == PassMode::Continuous {
            files.shuffle(&mut self.rng);
        }

        tracing::debug!(
            pattern = self.pattern.as_str(),
            files = files.len(),
            pass = self.passes,
            "starting pass over data files"
        );

        self.pending = files.into();
        self.records_this_pass = 0;
        Ok(())
    }

    /// Returns the next valid record, `Ok(None)` once the stream has ended.
    ///
    /// Undecodable and empty-article records are logged and skipped, as is
    /// the remainder of a file whose framing is corrupt.
    ///
    /// # Errors
    ///
    /// Storage failures are returned after the cursor has moved past the
    /// offending file, so the next call continues with the following file.
    pub fn next_record(&mut self) -> Result<Option<RawRecord>> {
        loop {
            if self.exhausted {
                return Ok(None);
            }

            if let Some(open) = self.current.as_mut() {
                match open.frames.next_frame() {
                    Ok(Some(payload)) => match RawRecord::decode(&payload) {
                        Ok(record) if record.article.is_empty() => {
                            tracing::warn!(
                                file = %open.path.display(),
                                "found a record with empty article text, skipping it"
                            );
                        }
                        Ok(record) => {
                            self.records_this_pass += 1;
                            return Ok(Some(record));
                        }
                        Err(e) => {
                            tracing::warn!(
                                file = %open.path.display(),
                                error = %e,
                                "failed to get article or abstract from record, skipping it"
                            );
                        }
                    },
                    Ok(None) => self.current = None,
                    Err(e @ BatcherError::Record { .. }) => {
                        tracing::warn!(
                            file = %open.path.display(),
                            error = %e,
                            "corrupt framing, skipping the rest of the file"
                        );
                        self.current = None;
                    }
                    Err(e) => {
                        self.current = None;
                        return Err(e);
                    }
                }
                continue;
            }

            if let Some(path) = self.pending.pop_front() {
                let reader = self.storage.open_read(&path)?;
                self.current = Some(OpenFile {
                    path,
                    frames: FrameReader::new(reader, self.format.clone()),
                });
                continue;
            }

            self.passes += 1;
            if self.mode == PassMode::SinglePass || self.finished.load(Ordering::SeqCst) {
                tracing::info!(
                    pattern = self.pattern.as_str(),
                    passes = self.passes,
                    "completed reading all data files, no more data"
                );
                self.exhausted = true;
                return Ok(None);
            }

            if self.records_this_pass == 0 {
                return Err(BatcherError::dataset(
                    self.pattern.as_str(),
                    "a full pass over the data files produced no records",
                ));
            }

            self.start_pass()?;
        }
    }

    /// Number of completed passes over the file set.
    pub fn passes(&self) -> u64 {
        self.passes
    }

    pub fn mode(&self) -> PassMode {
        self.mode
    }
}

impl Iterator for RecordSource {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}
