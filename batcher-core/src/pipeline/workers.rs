// batcher-core/src/pipeline/workers.rs

//! Work functions run by the encoder and collator pools.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::queue::BoundedQueue;
use crate::batch::Batch;
use crate::config::BatcherConfig;
use crate::dataset::RecordSource;
use crate::error::Result;
use crate::example::Example;
use crate::vocab::Vocab;

/// Everything an encoder worker needs.
pub(crate) struct EncoderContext {
    pub source: Arc<Mutex<RecordSource>>,
    pub examples: Arc<BoundedQueue<Example>>,
    pub vocab: Arc<Vocab>,
    pub config: Arc<BatcherConfig>,
}

/// Everything a collator worker needs.
pub(crate) struct CollatorContext {
    pub examples: Arc<BoundedQueue<Example>>,
    pub batches: Arc<BoundedQueue<Batch>>,
    pub vocab: Arc<Vocab>,
    pub config: Arc<BatcherConfig>,
}

/// Turns records into examples until the source ends or the queue closes.
pub(crate) fn encode_examples(ctx: &EncoderContext, worker: usize) -> Result<()> {
    let mut encoded = 0u64;

    loop {
        // the lock is held for the fetch only
        let record = {
            let mut source = ctx.source.lock().unwrap_or_else(PoisonError::into_inner);
            source.next_record()?
        };

        let Some(record) = record else {
            tracing::debug!(worker, encoded, "record source exhausted");
            return Ok(());
        };

        let example = Example::from_record(&record, &ctx.vocab, &ctx.config.batching);
        if ctx.examples.push(example).is_err() {
            tracing::debug!(worker, encoded, "examples queue closed");
            return Ok(());
        }
        encoded += 1;
    }
}

/// Drains the examples queue into batches.
pub(crate) fn collate_batches(ctx: &CollatorContext, worker: usize) -> Result<()> {
    if ctx.config.pipeline.decode {
        replicate_examples(ctx)
    } else {
        bucket_examples(ctx, worker)
    }
}

/// Training mode: sort a bucket of examples by length, cut it into batches
/// and push the batches, shuffled unless in single-pass mode.
fn bucket_examples(ctx: &CollatorContext, worker: usize) -> Result<()> {
    let batch_size = ctx.config.batching.batch_size;
    let bucket_len = batch_size * ctx.config.batching.max_batch_bucket_len;
    let shuffle = !ctx.config.pipeline.singlepass;
    let mut rng = match ctx.config.pipeline.seed {
        Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(worker as u64)),
        None => StdRng::from_entropy(),
    };

    loop {
        let mut bucket = Vec::with_capacity(bucket_len);
        let mut drained = false;
        while bucket.len() < bucket_len {
            match ctx.examples.pop() {
                Some(example) => bucket.push(example),
                None => {
                    drained = true;
                    break;
                }
            }
        }

        if bucket.is_empty() {
            return Ok(());
        }

        // stable, so equal lengths keep arrival order
        bucket.sort_by_key(|ex| ex.enc_len);

        let mut chunks: Vec<Vec<Example>> = Vec::with_capacity(bucket.len().div_ceil(batch_size));
        let mut examples = bucket.into_iter().peekable();
        while examples.peek().is_some() {
            chunks.push(examples.by_ref().take(batch_size).collect());
        }

        if shuffle {
            chunks.shuffle(&mut rng);
        }

        for chunk in chunks {
            let batch = Batch::collate(chunk, &ctx.config.batching, &ctx.vocab)?;
            if ctx.batches.push(batch).is_err() {
                return Ok(());
            }
        }

        if drained {
            tracing::debug!(worker, "examples queue exhausted, flushed last bucket");
            return Ok(());
        }
    }
}

/// Decode mode: every batch is one example repeated `batch_size` times.
fn replicate_examples(ctx: &CollatorContext) -> Result<()> {
    let batch_size = ctx.config.batching.batch_size;

    while let Some(example) = ctx.examples.pop() {
        let batch = Batch::collate(vec![example; batch_size], &ctx.config.batching, &ctx.vocab)?;
        if ctx.batches.push(batch).is_err() {
            break;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{PassMode, RawRecord};
    use crate::testing::{numbered_records, vocab_from_words, MemoryStorage};
    use std::sync::atomic::AtomicBool;

    fn config(batch_size: usize, bucket: usize, singlepass: bool, decode: bool) -> Arc<BatcherConfig> {
        let mut config = BatcherConfig::default();
        config.data.data_path = "data.bin".to_string();
        config.batching.batch_size = batch_size;
        config.batching.max_batch_bucket_len = bucket;
        config.batching.max_dec_len = 8;
        config.pipeline.singlepass = singlepass;
        config.pipeline.decode = decode;
        config.pipeline.seed = Some(11);
        Arc::new(config)
    }

    fn example(words: usize, vocab: &Vocab, config: &BatcherConfig) -> Example {
        let article = vec!["w"; words].join(" ");
        Example::build(&article, &["w".to_string()], vocab, &config.batching)
    }

    fn collator(config: Arc<BatcherConfig>) -> CollatorContext {
        CollatorContext {
            examples: Arc::new(BoundedQueue::new("examples", 64, 1)),
            batches: Arc::new(BoundedQueue::new("batches", 64, 1)),
            vocab: Arc::new(vocab_from_words(&["w"])),
            config,
        }
    }

    fn drain(queue: &BoundedQueue<Batch>) -> Vec<Batch> {
        std::iter::from_fn(|| queue.try_pop()).collect()
    }

    #[test]
    fn test_encoder_pushes_every_record() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_records("data.bin", &numbered_records(0, 7));
        let cfg = config(2, 2, true, false);
        let source = RecordSource::new(
            storage,
            "data.bin",
            PassMode::SinglePass,
            Arc::new(AtomicBool::new(false)),
            None,
        )
        .unwrap();

        let ctx = EncoderContext {
            source: Arc::new(Mutex::new(source)),
            examples: Arc::new(BoundedQueue::new("examples", 16, 1)),
            vocab: Arc::new(vocab_from_words(&["article"])),
            config: cfg,
        };

        encode_examples(&ctx, 0).unwrap();

        let articles: Vec<String> = std::iter::from_fn(|| ctx.examples.try_pop())
            .map(|ex| ex.original_article)
            .collect();
        assert_eq!(articles.len(), 7);
        assert_eq!(articles[6], "article 6");
    }

    #[test]
    fn test_encoder_stops_when_queue_closed() {
        let storage = Arc::new(MemoryStorage::new());
        storage.add_records("data.bin", &numbered_records(0, 3));
        let source = RecordSource::new(
            storage,
            "data.bin",
            PassMode::Continuous,
            Arc::new(AtomicBool::new(false)),
            Some(1),
        )
        .unwrap();

        let ctx = EncoderContext {
            source: Arc::new(Mutex::new(source)),
            examples: Arc::new(BoundedQueue::new("examples", 4, 1)),
            vocab: Arc::new(vocab_from_words(&["article"])),
            config: config(2, 2, false, false),
        };
        ctx.examples.close();

        assert!(encode_examples(&ctx, 0).is_ok());
    }

    #[test]
    fn test_bucketing_sorts_and_keeps_short_tail() {
        let ctx = collator(config(2, 3, true, false));
        for words in [5, 1, 4, 2, 3] {
            ctx.examples
                .push(example(words, &ctx.vocab, &ctx.config))
                .unwrap();
        }
        ctx.examples.producer_done();

        collate_batches(&ctx, 0).unwrap();

        let batches = drain(&ctx.batches);
        let lens: Vec<Vec<usize>> = batches
            .iter()
            .map(|b| b.enc_lens.iter().take(b.len()).copied().collect())
            .collect();
        assert_eq!(lens, vec![vec![1, 2], vec![3, 4], vec![5]]);
        assert_eq!(batches[0].enc_width(), 2);
        assert_eq!(batches[2].batch_size(), 2);
    }

    #[test]
    fn test_bucketing_shuffles_batch_order_not_contents() {
        let ctx = collator(config(1, 16, false, false));
        for words in 1..=16 {
            ctx.examples
                .push(example(words, &ctx.vocab, &ctx.config))
                .unwrap();
        }
        ctx.examples.producer_done();

        collate_batches(&ctx, 0).unwrap();

        let mut lens: Vec<usize> = drain(&ctx.batches).iter().map(|b| b.enc_lens[0]).collect();
        assert_eq!(lens.len(), 16);
        let arrived = lens.clone();
        lens.sort_unstable();
        assert_eq!(lens, (1..=16).collect::<Vec<_>>());
        assert_ne!(arrived, lens, "seeded shuffle left batches in length order");
    }

    #[test]
    fn test_decode_mode_replicates_example() {
        let ctx = collator(config(3, 2, true, true));
        let record = RawRecord {
            article: "w w x".to_string(),
            abstract_text: "<s> w </s>".to_string(),
        };
        ctx.examples
            .push(Example::from_record(&record, &ctx.vocab, &ctx.config.batching))
            .unwrap();
        ctx.examples.producer_done();

        collate_batches(&ctx, 0).unwrap();

        let batches = drain(&ctx.batches);
        assert_eq!(batches.len(), 1);
        let batch = &batches[0];
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.enc_batch.row(0), batch.enc_batch.row(2));
        assert_eq!(batch.target_batch.row(0), batch.target_batch.row(1));
        assert_eq!(batch.original_articles, vec!["w w x"; 3]);
    }
}
