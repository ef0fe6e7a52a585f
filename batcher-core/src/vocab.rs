// batcher-core/src/vocab.rs

//! Word/id vocabulary.
//!
//! Ids 0..4 are reserved for the special tokens below; learned words get
//! dense ids from 4 in file order. A vocabulary is built once at startup and
//! then shared read-only by every pipeline thread.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::dataset::{SENTENCE_END, SENTENCE_START};
use crate::error::{BatcherError, Result};

/// Token for out-of-vocabulary words.
pub const UNKNOWN_TOKEN: &str = "[UNK]";
/// Token used to pad encoder and decoder rows.
pub const PAD_TOKEN: &str = "[PAD]";
/// First token of every decoder input.
pub const START_DECODING: &str = "[START]";
/// Last token of every untruncated decoder target.
pub const STOP_DECODING: &str = "[STOP]";

pub const UNKNOWN_ID: u32 = 0;
pub const PAD_ID: u32 = 1;
pub const START_ID: u32 = 2;
pub const STOP_ID: u32 = 3;

const SPECIAL_TOKENS: [&str; 4] = [UNKNOWN_TOKEN, PAD_TOKEN, START_DECODING, STOP_DECODING];

#[derive(Debug, Clone)]
pub struct Vocab {
    word_to_id: HashMap<String, u32>,
    id_to_word: Vec<String>,
}

impl Vocab {
    /// Loads a `word frequency` file.
    ///
    /// `max_size` caps the total size, reserved tokens included; 0 means no
    /// cap.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, or if it lists a reserved token or
    /// the same word twice.
    pub fn load(path: impl AsRef<Path>, max_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            BatcherError::storage_with_source(path, "failed to open vocabulary file", e)
        })?;

        let vocab = Self::from_reader(BufReader::new(file), max_size)?;
        tracing::info!(
            path = %path.display(),
            size = vocab.size(),
            "loaded vocabulary"
        );
        Ok(vocab)
    }

    /// Reads vocabulary lines from any buffered reader.
    ///
    /// Lines that do not have exactly two whitespace-separated fields are
    /// logged and skipped.
    pub fn from_reader<R: BufRead>(reader: R, max_size: usize) -> Result<Self> {
        let mut vocab = Self::with_special_tokens();

        for (index, line) in reader.lines().enumerate() {
            if max_size != 0 && vocab.size() >= max_size {
                tracing::info!(
                    max_size,
                    size = vocab.size(),
                    "vocabulary size limit reached, stopping reading"
                );
                break;
            }

            let line = line.map_err(|e| {
                BatcherError::storage_with_source(
                    "<vocabulary>",
                    format!("failed to read line {}", index + 1),
                    e,
                )
            })?;

            let pieces: Vec<&str> = line.split_whitespace().collect();
            if pieces.len() != 2 {
                tracing::warn!(
                    line = index + 1,
                    content = %line,
                    "incorrectly formatted line in vocabulary file, skipping"
                );
                continue;
            }

            let word = pieces[0];
            if is_reserved(word) {
                return Err(BatcherError::vocab(format!(
                    "<s>, </s>, [UNK], [PAD], [START] and [STOP] must not be in the \
                     vocabulary file, but '{word}' is (line {})",
                    index + 1
                )));
            }
            if vocab.word_to_id.contains_key(word) {
                return Err(BatcherError::vocab(format!(
                    "duplicated word in vocabulary file: '{word}' (line {})",
                    index + 1
                )));
            }

            vocab.push(word.to_string());
        }

        tracing::debug!(
            size = vocab.size(),
            last_word = vocab.id_to_word.last().map(String::as_str).unwrap_or_default(),
            "finished constructing vocabulary"
        );
        Ok(vocab)
    }

    fn with_special_tokens() -> Self {
        let mut vocab = Self {
            word_to_id: HashMap::new(),
            id_to_word: Vec::new(),
        };
        for token in SPECIAL_TOKENS {
            vocab.push(token.to_string());
        }
        vocab
    }

    fn push(&mut self, word: String) {
        let id = self.id_to_word.len() as u32;
        self.word_to_id.insert(word.clone(), id);
        self.id_to_word.push(word);
    }

    /// Id of `word`, or [`UNKNOWN_ID`] if it is not in the vocabulary.
    pub fn id_of(&self, word: &str) -> u32 {
        self.word_to_id.get(word).copied().unwrap_or(UNKNOWN_ID)
    }

    /// Word for `id`.
    ///
    /// Article-OOV ids (`>= size()`) are not known here; see
    /// [`output_to_words`].
    pub fn word_of(&self, id: u32) -> Result<&str> {
        self.id_to_word
            .get(id as usize)
            .map(String::as_str)
            .ok_or_else(|| BatcherError::id_out_of_range(id, self.size()))
    }

    /// Total number of ids, reserved tokens included.
    pub fn size(&self) -> usize {
        self.id_to_word.len()
    }

    pub fn contains(&self, word: &str) -> bool {
        self.word_to_id.contains_key(word)
    }
}

fn is_reserved(word: &str) -> bool {
    word == SENTENCE_START || word == SENTENCE_END || SPECIAL_TOKENS.contains(&word)
}

/// Maps model output ids back to words.
///
/// Ids past the vocabulary resolve through the example's article OOVs. In
/// baseline mode there is no OOV list, so any such id is an error.
pub fn output_to_words(
    ids: &[u32],
    vocab: &Vocab,
    article_oovs: Option<&[String]>,
) -> Result<Vec<String>> {
    let mut words = Vec::with_capacity(ids.len());

    for &id in ids {
        if let Ok(word) = vocab.word_of(id) {
            words.push(word.to_string());
            continue;
        }

        let oovs = article_oovs.ok_or_else(|| BatcherError::id_out_of_range(id, vocab.size()))?;
        let oov_index = id as usize - vocab.size();
        let word = oovs
            .get(oov_index)
            .ok_or_else(|| BatcherError::oov_out_of_range(id, oov_index, oovs.len()))?;
        words.push(word.clone());
    }

    Ok(words)
}
