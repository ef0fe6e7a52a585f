// batcher-core/src/batch.rs

//! Fixed-shape, padded minibatches.
//!
//! Every array has `batch_size` rows. The encoder dimension is as wide as the
//! longest article in the batch; the decoder dimension is always
//! `max_dec_len`. Masks are 1.0 exactly where a row holds a real token.

use ndarray::{s, Array1, Array2, ArrayView1};

use crate::config::BatchingConfig;
use crate::error::{BatcherError, Result};
use crate::example::Example;
use crate::vocab::{Vocab, PAD_TOKEN};

/// Copies `values` into the start of row `row`; values past the width are dropped.
fn fill_row(array: &mut Array2<u32>, row: usize, values: &[u32]) {
    let n = values.len().min(array.ncols());
    array
        .row_mut(row)
        .slice_mut(s![..n])
        .assign(&ArrayView1::from(&values[..n]));
}

fn fill_mask(mask: &mut Array2<f32>, row: usize, len: usize) {
    let n = len.min(mask.ncols());
    mask.row_mut(row).slice_mut(s![..n]).fill(1.0);
}

/// Copy-mechanism data for a pointer-generator batch.
#[derive(Debug, Clone)]
pub struct PointerBatch {
    /// Encoder ids with article OOVs mapped to temporary ids.
    pub enc_batch_extend_vocab: Array2<u32>,
    /// Article OOV words of each real example, for decoding model output.
    pub art_oovs: Vec<Vec<String>>,
    /// Largest OOV list in the batch.
    pub max_art_oovs: usize,
}

#[derive(Debug, Clone)]
pub struct Batch {
    pub enc_batch: Array2<u32>,
    pub enc_lens: Array1<usize>,
    pub enc_padding_mask: Array2<f32>,
    pub dec_batch: Array2<u32>,
    pub target_batch: Array2<u32>,
    pub dec_padding_mask: Array2<f32>,
    pub pointer: Option<PointerBatch>,
    pub original_articles: Vec<String>,
    pub original_abstracts: Vec<String>,
    pub original_abstracts_sents: Vec<Vec<String>>,
    size: usize,
}

impl Batch {
    /// Pads and packs up to `batch_size` examples into one batch.
    ///
    /// Fewer examples than `batch_size` give a short batch whose trailing
    /// rows are all padding with zero masks and zero lengths.
    ///
    /// # Errors
    ///
    /// Fails on an empty list, on more than `batch_size` examples, or when
    /// pointer-generator mode is on and an example has no OOV data.
    pub fn collate(
        mut examples: Vec<Example>,
        config: &BatchingConfig,
        vocab: &Vocab,
    ) -> Result<Self> {
        let batch_size = config.batch_size;
        if examples.is_empty() {
            return Err(BatcherError::pipeline("cannot collate an empty example list"));
        }
        if examples.len() > batch_size {
            return Err(BatcherError::pipeline(format!(
                "cannot collate {} examples into a batch of {batch_size}",
                examples.len()
            )));
        }
        if config.pointer_gen && examples.iter().any(|ex| ex.pointer.is_none()) {
            return Err(BatcherError::pipeline(
                "pointer-generator batch given an example without OOV data",
            ));
        }

        let pad_id = vocab.id_of(PAD_TOKEN);
        let max_enc_len = examples.iter().map(|ex| ex.enc_len).max().unwrap_or(0);
        let max_dec_len = config.max_dec_len;

        for ex in &mut examples {
            ex.pad_encoder(max_enc_len, pad_id);
            ex.pad_decoder(max_dec_len, pad_id);
        }

        let mut enc_batch = Array2::from_elem((batch_size, max_enc_len), pad_id);
        let mut enc_lens = Array1::zeros(batch_size);
        let mut enc_padding_mask = Array2::zeros((batch_size, max_enc_len));
        let mut dec_batch = Array2::from_elem((batch_size, max_dec_len), pad_id);
        let mut target_batch = Array2::from_elem((batch_size, max_dec_len), pad_id);
        let mut dec_padding_mask = Array2::zeros((batch_size, max_dec_len));

        for (i, ex) in examples.iter().enumerate() {
            fill_row(&mut enc_batch, i, &ex.enc_input);
            enc_lens[i] = ex.enc_len;
            fill_mask(&mut enc_padding_mask, i, ex.enc_len);
            fill_row(&mut dec_batch, i, &ex.dec_input);
            fill_row(&mut target_batch, i, &ex.target);
            fill_mask(&mut dec_padding_mask, i, ex.dec_len);
        }

        let pointer = if config.pointer_gen {
            let mut enc_batch_extend_vocab = Array2::from_elem((batch_size, max_enc_len), pad_id);
            let mut art_oovs = Vec::with_capacity(examples.len());
            for (i, ex) in examples.iter().enumerate() {
                if let Some(p) = &ex.pointer {
                    fill_row(&mut enc_batch_extend_vocab, i, &p.enc_input_extend_vocab);
                    art_oovs.push(p.article_oovs.clone());
                }
            }
            let max_art_oovs = art_oovs.iter().map(Vec::len).max().unwrap_or(0);

            Some(PointerBatch {
                enc_batch_extend_vocab,
                art_oovs,
                max_art_oovs,
            })
        } else {
            None
        };

        let size = examples.len();
        let mut original_articles = Vec::with_capacity(size);
        let mut original_abstracts = Vec::with_capacity(size);
        let mut original_abstracts_sents = Vec::with_capacity(size);
        for ex in examples {
            original_articles.push(ex.original_article);
            original_abstracts.push(ex.original_abstract);
            original_abstracts_sents.push(ex.original_abstract_sents);
        }

        Ok(Self {
            enc_batch,
            enc_lens,
            enc_padding_mask,
            dec_batch,
            target_batch,
            dec_padding_mask,
            pointer,
            original_articles,
            original_abstracts,
            original_abstracts_sents,
            size,
        })
    }

    /// Number of real (non-padding) rows.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Row count of every array, real or not.
    pub fn batch_size(&self) -> usize {
        self.enc_batch.nrows()
    }

    /// Encoder width, the longest encoder length in this batch.
    pub fn enc_width(&self) -> usize {
        self.enc_batch.ncols()
    }

    /// Article OOVs of row `row`, if this is a pointer-generator batch.
    pub fn art_oovs(&self, row: usize) -> Option<&[String]> {
        self.pointer
            .as_ref()
            .and_then(|p| p.art_oovs.get(row))
            .map(Vec::as_slice)
    }

    /// Share of the real rows' encoder cells that hold padding.
    pub fn enc_padding_fraction(&self) -> f64 {
        let cells = self.size * self.enc_width();
        if cells == 0 {
            return 0.0;
        }
        let real = self.enc_lens.slice(s![..self.size]).sum();
        1.0 - real as f64 / cells as f64
    }
}
