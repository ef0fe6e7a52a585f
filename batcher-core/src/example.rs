// batcher-core/src/example.rs

//! One training example: an encoded article/abstract pair.

use crate::config::BatchingConfig;
use crate::dataset::RawRecord;
use crate::vocab::{Vocab, START_ID, STOP_ID, UNKNOWN_ID};

/// Pointer-generator extras for one example.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OovInputs {
    /// Encoder ids where in-article OOVs get temporary ids from `vocab.size()`.
    pub enc_input_extend_vocab: Vec<u32>,
    /// Distinct in-article OOV words in first-seen order. Word `i` has id
    /// `vocab.size() + i`.
    pub article_oovs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Example {
    pub enc_input: Vec<u32>,
    /// Encoder length before padding.
    pub enc_len: usize,
    pub dec_input: Vec<u32>,
    pub target: Vec<u32>,
    /// Decoder length before padding.
    pub dec_len: usize,
    /// Present only in pointer-generator mode.
    pub pointer: Option<OovInputs>,
    pub original_article: String,
    pub original_abstract: String,
    pub original_abstract_sents: Vec<String>,
}

impl Example {
    /// Encodes an article and its abstract sentences.
    pub fn build(
        article: &str,
        abstract_sentences: &[String],
        vocab: &Vocab,
        config: &BatchingConfig,
    ) -> Self {
        let mut article_words: Vec<&str> = article.split_whitespace().collect();
        article_words.truncate(config.max_enc_len);
        let enc_input: Vec<u32> = article_words.iter().map(|w| vocab.id_of(w)).collect();

        let original_abstract = abstract_sentences.join(" ");
        let abstract_words: Vec<&str> = original_abstract.split_whitespace().collect();
        let abstract_ids: Vec<u32> = abstract_words.iter().map(|w| vocab.id_of(w)).collect();

        let (dec_input, mut target) = decoder_sequences(&abstract_ids, config.max_dec_len);

        let pointer = if config.pointer_gen {
            let (enc_input_extend_vocab, article_oovs) = article_to_ids(&article_words, vocab);
            let abstract_ids_extend_vocab = abstract_to_ids(&abstract_words, vocab, &article_oovs);
            target = decoder_sequences(&abstract_ids_extend_vocab, config.max_dec_len).1;

            Some(OovInputs {
                enc_input_extend_vocab,
                article_oovs,
            })
        } else {
            None
        };

        Self {
            enc_len: enc_input.len(),
            enc_input,
            dec_len: dec_input.len(),
            dec_input,
            target,
            pointer,
            original_article: article.to_string(),
            original_abstract,
            original_abstract_sents: abstract_sentences.to_vec(),
        }
    }

    /// Encodes a decoded record.
    pub fn from_record(record: &RawRecord, vocab: &Vocab, config: &BatchingConfig) -> Self {
        Self::build(&record.article, &record.abstract_sentences(), vocab, config)
    }

    /// Pads the encoder sequences up to `max_len`; longer sequences are left
    /// untouched.
    pub fn pad_encoder(&mut self, max_len: usize, pad_id: u32) {
        pad_to(&mut self.enc_input, max_len, pad_id);
        if let Some(pointer) = self.pointer.as_mut() {
            pad_to(&mut pointer.enc_input_extend_vocab, max_len, pad_id);
        }
    }

    /// Pads the decoder input and target up to `max_len`.
    pub fn pad_decoder(&mut self, max_len: usize, pad_id: u32) {
        pad_to(&mut self.dec_input, max_len, pad_id);
        pad_to(&mut self.target, max_len, pad_id);
    }

    pub fn article_oovs(&self) -> Option<&[String]> {
        self.pointer.as_ref().map(|p| p.article_oovs.as_slice())
    }
}

fn pad_to(seq: &mut Vec<u32>, max_len: usize, pad_id: u32) {
    if seq.len() < max_len {
        seq.resize(max_len, pad_id);
    }
}

/// Builds `[START] + ids` and `ids + [STOP]`, both cut to `max_len`.
///
/// When the input has to be cut, the target is cut too and never gets the
/// STOP id.
fn decoder_sequences(ids: &[u32], max_len: usize) -> (Vec<u32>, Vec<u32>) {
    let mut input = Vec::with_capacity(ids.len() + 1);
    input.push(START_ID);
    input.extend_from_slice(ids);

    let mut target = ids.to_vec();
    if input.len() > max_len {
        input.truncate(max_len);
        target.truncate(max_len);
    } else {
        target.push(STOP_ID);
    }

    (input, target)
}

/// Encodes article words, giving each distinct OOV a temporary id.
fn article_to_ids(words: &[&str], vocab: &Vocab) -> (Vec<u32>, Vec<String>) {
    let mut ids = Vec::with_capacity(words.len());
    let mut oovs: Vec<String> = Vec::new();

    for word in words {
        let id = vocab.id_of(word);
        if id != UNKNOWN_ID {
            ids.push(id);
            continue;
        }

        let index = match oovs.iter().position(|o| o == word) {
            Some(index) => index,
            None => {
                oovs.push(word.to_string());
                oovs.len() - 1
            }
        };
        ids.push((vocab.size() + index) as u32);
    }

    (ids, oovs)
}

/// Encodes abstract words; OOVs seen in the article reuse the article's
/// temporary ids, other OOVs map to UNKNOWN.
fn abstract_to_ids(words: &[&str], vocab: &Vocab, article_oovs: &[String]) -> Vec<u32> {
    words
        .iter()
        .map(|word| match vocab.id_of(word) {
            UNKNOWN_ID => article_oovs
                .iter()
                .position(|o| o == word)
                .map(|index| (vocab.size() + index) as u32)
                .unwrap_or(UNKNOWN_ID),
            id => id,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::vocab_from_words;
    use crate::vocab::PAD_ID;
    use proptest::prelude::*;

    fn config(max_enc_len: usize, max_dec_len: usize, pointer_gen: bool) -> BatchingConfig {
        BatchingConfig {
            max_enc_len,
            max_dec_len,
            pointer_gen,
            ..Default::default()
        }
    }

    fn sents(text: &[&str]) -> Vec<String> {
        text.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_build_baseline() {
        let vocab = vocab_from_words(&["the", "cat"]);
        let ex = Example::build(
            "the cat sat",
            &sents(&["the dog ran"]),
            &vocab,
            &config(10, 10, false),
        );

        assert_eq!(ex.enc_input, vec![4, 5, 0]);
        assert_eq!(ex.enc_len, 3);
        assert_eq!(ex.dec_input, vec![START_ID, 4, 0, 0]);
        assert_eq!(ex.target, vec![4, 0, 0, STOP_ID]);
        assert_eq!(ex.dec_len, 4);
        assert!(ex.pointer.is_none());
        assert_eq!(ex.original_abstract, "the dog ran");
    }

    #[test]
    fn test_article_oovs_in_first_seen_order() {
        let vocab = vocab_from_words(&["the", "cat"]);
        let ex = Example::build(
            "the cat sat",
            &sents(&["the dog ran"]),
            &vocab,
            &config(10, 10, true),
        );

        // "dog" is absent from the vocabulary but not from the article
        let pointer = ex.pointer.as_ref().unwrap();
        assert_eq!(pointer.article_oovs, vec!["sat"]);
        assert_eq!(pointer.enc_input_extend_vocab, vec![4, 5, 6]);
        assert_eq!(ex.target, vec![4, 0, 0, STOP_ID]);
    }

    #[test]
    fn test_in_article_oovs_copied_into_target() {
        let vocab = vocab_from_words(&["the", "cat"]);
        let ex = Example::build(
            "the sat dog sat",
            &sents(&["dog sat", "cat"]),
            &vocab,
            &config(10, 10, true),
        );

        let pointer = ex.pointer.as_ref().unwrap();
        assert_eq!(pointer.article_oovs, vec!["sat", "dog"]);
        assert_eq!(pointer.enc_input_extend_vocab, vec![4, 6, 7, 6]);
        assert_eq!(ex.target, vec![7, 6, 5, STOP_ID]);
        // decoder input keeps vocabulary-only ids
        assert_eq!(ex.dec_input, vec![START_ID, 0, 0, 5]);
    }

    #[test]
    fn test_truncation_drops_stop() {
        let vocab = vocab_from_words(&["a", "b", "c", "d"]);
        let ex = Example::build("a b c d e f", &sents(&["a b c"]), &vocab, &config(4, 3, false));

        assert_eq!(ex.enc_input, vec![4, 5, 6, 7]);
        assert_eq!(ex.enc_len, 4);
        assert_eq!(ex.dec_input, vec![START_ID, 4, 5]);
        assert_eq!(ex.target, vec![4, 5, 6]);
    }

    #[test]
    fn test_oovs_only_from_truncated_article() {
        let vocab = vocab_from_words(&["a"]);
        let ex = Example::build("a x y", &sents(&["y"]), &vocab, &config(2, 5, true));

        let pointer = ex.pointer.unwrap();
        assert_eq!(pointer.article_oovs, vec!["x"]);
        assert_eq!(ex.target, vec![UNKNOWN_ID, STOP_ID]);
    }

    #[test]
    fn test_empty_abstract() {
        let vocab = vocab_from_words(&["a"]);
        let ex = Example::build("a", &[], &vocab, &config(5, 5, false));
        assert_eq!(ex.dec_input, vec![START_ID]);
        assert_eq!(ex.target, vec![STOP_ID]);
    }

    #[test]
    fn test_padding() {
        let vocab = vocab_from_words(&["a"]);
        let mut ex = Example::build("a zz", &sents(&["a"]), &vocab, &config(5, 5, true));

        ex.pad_encoder(4, PAD_ID);
        ex.pad_decoder(5, PAD_ID);

        assert_eq!(ex.enc_input, vec![4, 0, PAD_ID, PAD_ID]);
        assert_eq!(
            ex.pointer.as_ref().unwrap().enc_input_extend_vocab,
            vec![4, 5, PAD_ID, PAD_ID]
        );
        assert_eq!(ex.dec_input, vec![START_ID, 4, PAD_ID, PAD_ID, PAD_ID]);
        assert_eq!(ex.target, vec![4, STOP_ID, PAD_ID, PAD_ID, PAD_ID]);
        assert_eq!(ex.enc_len, 2);
        assert_eq!(ex.dec_len, 2);
    }

    #[test]
    fn test_from_record_splits_sentences() {
        let vocab = vocab_from_words(&["a", "b"]);
        let record = RawRecord {
            article: "a b".to_string(),
            abstract_text: "<s> a . </s> <s> b </s>".to_string(),
        };
        let ex = Example::from_record(&record, &vocab, &config(5, 10, false));

        assert_eq!(ex.original_abstract_sents, vec!["a .", "b"]);
        assert_eq!(ex.original_abstract, "a . b");
    }

    fn words(max: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec("[a-h]", 0..max)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_example_invariants(
            article in words(30),
            abstract_words in words(20),
            max_enc_len in 1usize..25,
            max_dec_len in 1usize..15,
            pointer_gen in any::<bool>(),
        ) {
            let vocab = vocab_from_words(&["a", "b", "c"]);
            let cfg = config(max_enc_len, max_dec_len, pointer_gen);
            let ex = Example::build(&article.join(" "), &[abstract_words.join(" ")], &vocab, &cfg);

            prop_assert_eq!(ex.dec_input.len(), ex.target.len());
            prop_assert!(ex.dec_input.len() <= max_dec_len);
            prop_assert_eq!(ex.dec_input[0], START_ID);
            prop_assert!(ex.enc_len <= max_enc_len);

            let truncated = abstract_words.len() + 1 > max_dec_len;
            prop_assert_eq!(ex.target.last() == Some(&STOP_ID), !truncated);

            if let Some(pointer) = &ex.pointer {
                let size = vocab.size() as u32;
                let limit = size + pointer.article_oovs.len() as u32;
                for &id in &pointer.enc_input_extend_vocab {
                    prop_assert!(id < limit);
                    prop_assert!(id >= size || id != UNKNOWN_ID);
                }

                let mut expected: Vec<String> = Vec::new();
                for w in article.iter().take(max_enc_len) {
                    if !vocab.contains(w) && !expected.contains(w) {
                        expected.push(w.clone());
                    }
                }
                prop_assert_eq!(&pointer.article_oovs, &expected);
            }
        }

        #[test]
        fn prop_padding_is_idempotent(article in words(20), width in 0usize..30) {
            let vocab = vocab_from_words(&["a", "b"]);
            let mut ex = Example::build(&article.join(" "), &[], &vocab, &config(20, 10, true));

            ex.pad_encoder(width, PAD_ID);
            ex.pad_decoder(10, PAD_ID);
            let once = ex.clone();
            ex.pad_encoder(width, PAD_ID);
            ex.pad_decoder(10, PAD_ID);

            prop_assert_eq!(&ex.enc_input, &once.enc_input);
            prop_assert_eq!(&ex.dec_input, &once.dec_input);
            prop_assert_eq!(&ex.target, &once.target);
            prop_assert_eq!(&ex.pointer, &once.pointer);
        }
    }
}
