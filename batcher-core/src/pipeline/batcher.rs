// batcher-core/src/pipeline/batcher.rs

//! The consumer-facing batching pipeline.
//!
//! ```text
//! RecordSource ─► encoder pool ─► examples queue ─► collator pool ─► batch queue ─► next_batch()
//!  (one mutex)                      (bounded)                          (bounded)
//! ```
//!
//! In continuous mode a supervisor thread wakes every
//! `supervise_interval_secs` and restarts workers that failed or panicked.

use std::iter::FusedIterator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError, Sender};

use super::pool::{RestartPolicy, RetireFn, WorkFn, WorkerPool};
use super::queue::BoundedQueue;
use super::workers::{collate_batches, encode_examples, CollatorContext, EncoderContext};
use crate::batch::Batch;
use crate::config::BatcherConfig;
use crate::dataset::{PassMode, RecordSource};
use crate::error::{BatcherError, Result};
use crate::example::Example;
use crate::storage::{LocalStorage, StorageBackend};
use crate::vocab::Vocab;

/// Point-in-time view of the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub examples_queued: usize,
    pub examples_capacity: usize,
    pub batches_queued: usize,
    pub batches_capacity: usize,
    pub encoders_alive: usize,
    pub collators_alive: usize,
    pub encoder_restarts: u64,
    pub collator_restarts: u64,
}

struct Pools {
    encoders: WorkerPool,
    collators: WorkerPool,
}

impl Pools {
    fn supervise(&mut self) {
        for pool in [&mut self.encoders, &mut self.collators] {
            if let Err(e) = pool.supervise() {
                tracing::error!(pool = pool.name(), error = %e, "failed to restart worker");
            }
        }
    }
}

struct Supervisor {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Concurrent producer of padded, length-bucketed batches.
pub struct Batcher {
    config: Arc<BatcherConfig>,
    vocab: Arc<Vocab>,
    examples: Arc<BoundedQueue<Example>>,
    batches: Arc<BoundedQueue<Batch>>,
    finished: Arc<AtomicBool>,
    pools: Arc<Mutex<Pools>>,
    supervisor: Option<Supervisor>,
    shut_down: bool,
    // set once the iterator has yielded `None`
    drained: bool,
}

impl Batcher {
    /// Loads the vocabulary and opens local storage as configured, then
    /// starts the pipeline.
    pub fn from_config(config: BatcherConfig) -> Result<Self> {
        config.validate()?;
        let vocab = Vocab::load(&config.data.vocab_path, config.data.vocab_size)?;
        let storage: Arc<dyn StorageBackend> = Arc::new(LocalStorage::new(&config.storage)?);
        Self::new(Arc::new(config), Arc::new(vocab), storage)
    }

    /// Starts the worker pools (and the supervisor, in continuous mode).
    ///
    /// # Errors
    ///
    /// Fails if the config is invalid, the data pattern matches no files, or
    /// a thread cannot be spawned.
    pub fn new(
        config: Arc<BatcherConfig>,
        vocab: Arc<Vocab>,
        storage: Arc<dyn StorageBackend>,
    ) -> Result<Self> {
        config.validate()?;

        let pipeline = &config.pipeline;
        let mode = PassMode::from_config(pipeline);
        let policy = RestartPolicy::from_config(pipeline);
        let finished = Arc::new(AtomicBool::new(pipeline.finished));

        let source = RecordSource::new(
            storage,
            &config.data.data_path,
            mode,
            finished.clone(),
            pipeline.seed,
        )?;

        let encoder_count = pipeline.effective_encoder_workers();
        let collator_count = pipeline.effective_collator_workers();
        let examples = Arc::new(BoundedQueue::new(
            "examples",
            pipeline.examples_max_buffer_len,
            encoder_count,
        ));
        let batches = Arc::new(BoundedQueue::new(
            "batches",
            pipeline.batch_max_buffer_len,
            collator_count,
        ));

        let encoder_ctx = Arc::new(EncoderContext {
            source: Arc::new(Mutex::new(source)),
            examples: examples.clone(),
            vocab: vocab.clone(),
            config: config.clone(),
        });
        let encode: WorkFn = Arc::new(move |worker: usize| encode_examples(&encoder_ctx, worker));
        let retire_encoder: RetireFn = {
            let examples = examples.clone();
            Arc::new(move || examples.producer_done())
        };

        let collator_ctx = Arc::new(CollatorContext {
            examples: examples.clone(),
            batches: batches.clone(),
            vocab: vocab.clone(),
            config: config.clone(),
        });
        let collate: WorkFn = Arc::new(move |worker: usize| collate_batches(&collator_ctx, worker));
        let retire_collator: RetireFn = {
            let batches = batches.clone();
            Arc::new(move || batches.producer_done())
        };

        let encoders = WorkerPool::spawn("encoder", encoder_count, policy, encode, retire_encoder)
            .inspect_err(|_| examples.close())?;
        let collators =
            WorkerPool::spawn("collator", collator_count, policy, collate, retire_collator)
                .inspect_err(|_| {
                    examples.close();
                    batches.close();
                })?;
        let pools = Arc::new(Mutex::new(Pools {
            encoders,
            collators,
        }));

        let mut batcher = Self {
            config: config.clone(),
            vocab,
            examples,
            batches,
            finished,
            pools,
            supervisor: None,
            shut_down: false,
            drained: false,
        };

        if mode == PassMode::Continuous {
            let interval = Duration::from_secs(pipeline.supervise_interval_secs);
            batcher.supervisor = Some(spawn_supervisor(batcher.pools.clone(), interval)?);
        }

        tracing::info!(
            data_path = %config.data.data_path,
            ?mode,
            decode = pipeline.decode,
            encoders = encoder_count,
            collators = collator_count,
            batch_size = config.batching.batch_size,
            "batcher started"
        );
        Ok(batcher)
    }

    /// Returns the next batch, or `None` at the end of the stream.
    ///
    /// Once the stream is marked finished, an empty batch queue ends the
    /// stream immediately. Otherwise this blocks until a batch is ready or
    /// every collator has retired with nothing left queued. In continuous
    /// mode without `finished` the stream never ends.
    ///
    /// A `None` caused by `finished` only reflects the queue at that moment:
    /// collators still flushing their last bucket can refill it, and a later
    /// call returns those batches. The `Iterator` impl stops at the first
    /// `None` instead.
    pub fn next_batch(&self) -> Option<Batch> {
        if self.batches.is_closed() {
            return None;
        }
        if let Some(batch) = self.batches.try_pop() {
            return Some(batch);
        }

        if self.finished.load(Ordering::SeqCst) {
            tracing::info!("finished reading dataset, no more batches");
            return None;
        }
        if self.batches.is_exhausted() {
            return None;
        }

        tracing::warn!(
            batches = self.batches.len(),
            examples = self.examples.len(),
            "batch queue is empty, waiting for the next batch"
        );
        self.batches.pop()
    }

    /// Signals that no more data will arrive; the continuous source stops
    /// after its current pass.
    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> PipelineStats {
        let pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        PipelineStats {
            examples_queued: self.examples.len(),
            examples_capacity: self.examples.capacity(),
            batches_queued: self.batches.len(),
            batches_capacity: self.batches.capacity(),
            encoders_alive: pools.encoders.alive(),
            collators_alive: pools.collators.alive(),
            encoder_restarts: pools.encoders.restarts(),
            collator_restarts: pools.collators.restarts(),
        }
    }

    pub fn config(&self) -> &BatcherConfig {
        &self.config
    }

    pub fn vocab(&self) -> &Arc<Vocab> {
        &self.vocab
    }

    /// Closes both queues, stops the supervisor and joins every thread.
    pub fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        self.examples.close();
        self.batches.close();

        if let Some(supervisor) = self.supervisor.take() {
            drop(supervisor.stop);
            if supervisor.handle.join().is_err() {
                tracing::error!("supervisor thread panicked");
            }
        }

        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        let exits = pools.encoders.join_all().len() + pools.collators.join_all().len();
        tracing::info!(workers = exits, "batcher shut down");
    }
}

impl Drop for Batcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl Iterator for Batcher {
    type Item = Batch;

    fn next(&mut self) -> Option<Self::Item> {
        if self.drained {
            return None;
        }
        let batch = self.next_batch();
        self.drained = batch.is_none();
        batch
    }
}

impl FusedIterator for Batcher {}

fn spawn_supervisor(pools: Arc<Mutex<Pools>>, interval: Duration) -> Result<Supervisor> {
    let (stop, stopped) = channel::bounded::<()>(1);

    let handle = thread::Builder::new()
        .name("supervisor".to_string())
        .spawn(move || loop {
            match stopped.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => {
                    pools
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .supervise();
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        })
        .map_err(|e| BatcherError::pipeline(format!("failed to spawn supervisor: {e}")))?;

    Ok(Supervisor { stop, handle })
}
