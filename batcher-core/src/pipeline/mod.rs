// batcher-core/src/pipeline/mod.rs

//! Multi-threaded example encoding, bucketing and batch collation.
//!
//! # Example
//!
//! ```no_run
//! use batcher_core::{BatcherConfig, Batcher};
//!
//! let config = BatcherConfig::from_file("batcher.toml")
//!     .unwrap()
//!     .with_env_overrides();
//! let batcher = Batcher::from_config(config).unwrap();
//!
//! while let Some(batch) = batcher.next_batch() {
//!     println!("{:?} encoder ids", batch.enc_batch.shape());
//! }
//! ```

mod batcher;
mod pool;
mod queue;
mod workers;

pub use batcher::{Batcher, PipelineStats};
pub use pool::{RestartPolicy, RetireFn, WorkFn, WorkerExit, WorkerPool};
pub use queue::{BoundedQueue, QueueClosed};
