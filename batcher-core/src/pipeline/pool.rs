// batcher-core/src/pipeline/pool.rs

//! Fixed-size pools of named worker threads with explicit restart policy.
//!
//! Each worker runs the pool's work function once. How it ends (normal
//! return, `Err`, or panic) is captured as a [`WorkerExit`]. A worker that
//! will not be restarted under the pool's [`RestartPolicy`] calls the pool's
//! retire hook on its way out, which is how downstream queues learn that a
//! producer is gone for good.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::config::PipelineConfig;
use crate::error::{BatcherError, Result};

/// Work run by one worker; the argument is the worker's slot index.
pub type WorkFn = Arc<dyn Fn(usize) -> Result<()> + Send + Sync>;

/// Called once by a worker that exits for good.
pub type RetireFn = Arc<dyn Fn() + Send + Sync>;

/// How a worker's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerExit {
    Completed,
    Failed(String),
    Panicked(String),
}

impl WorkerExit {
    pub fn is_failure(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

/// Whether a finished worker is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartPolicy {
    /// Workers are expected to finish; nothing is restarted.
    Never,
    /// Workers that failed or panicked are restarted; completed ones are not.
    OnFailure,
}

impl RestartPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        if config.singlepass {
            Self::Never
        } else {
            Self::OnFailure
        }
    }

    pub fn should_restart(&self, exit: &WorkerExit) -> bool {
        match self {
            Self::Never => false,
            Self::OnFailure => exit.is_failure(),
        }
    }
}

pub struct WorkerPool {
    name: String,
    work: WorkFn,
    on_retire: RetireFn,
    policy: RestartPolicy,
    handles: Vec<Option<JoinHandle<WorkerExit>>>,
    restarts: u64,
}

impl WorkerPool {
    /// Starts `size` workers named `{name}-{slot}`.
    pub fn spawn(
        name: impl Into<String>,
        size: usize,
        policy: RestartPolicy,
        work: WorkFn,
        on_retire: RetireFn,
    ) -> Result<Self> {
        let mut pool = Self {
            name: name.into(),
            work,
            on_retire,
            policy,
            handles: Vec::with_capacity(size),
            restarts: 0,
        };

        for slot in 0..size {
            let handle = pool.spawn_worker(slot)?;
            pool.handles.push(Some(handle));
        }

        tracing::debug!(pool = %pool.name, size, ?policy, "worker pool started");
        Ok(pool)
    }

    fn spawn_worker(&self, slot: usize) -> Result<JoinHandle<WorkerExit>> {
        let pool = self.name.clone();
        let work = self.work.clone();
        let on_retire = self.on_retire.clone();
        let policy = self.policy;

        thread::Builder::new()
            .name(format!("{pool}-{slot}"))
            .spawn(move || {
                let exit = match panic::catch_unwind(AssertUnwindSafe(|| work(slot))) {
                    Ok(Ok(())) => WorkerExit::Completed,
                    Ok(Err(e)) => WorkerExit::Failed(e.to_string()),
                    Err(payload) => WorkerExit::Panicked(panic_message(payload.as_ref())),
                };

                match &exit {
                    WorkerExit::Completed => {
                        tracing::debug!(pool = %pool, worker = slot, "worker finished");
                    }
                    WorkerExit::Failed(error) => {
                        tracing::error!(pool = %pool, worker = slot, %error, "worker failed");
                    }
                    WorkerExit::Panicked(message) => {
                        tracing::error!(pool = %pool, worker = slot, %message, "worker panicked");
                    }
                }

                if !policy.should_restart(&exit) {
                    on_retire();
                }
                exit
            })
            .map_err(|e| {
                BatcherError::pipeline(format!("failed to spawn {}-{slot}: {e}", self.name))
            })
    }

    /// Reaps finished workers and restarts the ones the policy allows.
    ///
    /// Returns how many workers were restarted.
    pub fn supervise(&mut self) -> Result<usize> {
        let mut restarted = 0;

        for slot in 0..self.handles.len() {
            let finished = self.handles[slot]
                .as_ref()
                .is_some_and(JoinHandle::is_finished);
            if !finished {
                continue;
            }

            let exit = match self.handles[slot].take().map(JoinHandle::join) {
                Some(Ok(exit)) => exit,
                Some(Err(payload)) => WorkerExit::Panicked(panic_message(payload.as_ref())),
                None => continue,
            };

            if self.policy.should_restart(&exit) {
                tracing::warn!(
                    pool = %self.name,
                    worker = slot,
                    ?exit,
                    "found dead worker, restarting"
                );
                self.handles[slot] = Some(self.spawn_worker(slot)?);
                self.restarts += 1;
                restarted += 1;
            }
        }

        Ok(restarted)
    }

    /// Number of workers still running.
    pub fn alive(&self) -> usize {
        self.handles
            .iter()
            .flatten()
            .filter(|h| !h.is_finished())
            .count()
    }

    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits for every worker to exit.
    ///
    /// Callers must first make the workers return, e.g. by closing their
    /// queues.
    pub fn join_all(&mut self) -> Vec<WorkerExit> {
        self.handles
            .iter_mut()
            .filter_map(Option::take)
            .map(|handle| match handle.join() {
                Ok(exit) => exit,
                Err(payload) => WorkerExit::Panicked(panic_message(payload.as_ref())),
            })
            .collect()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
