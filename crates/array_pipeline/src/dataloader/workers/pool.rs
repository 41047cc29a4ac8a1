//! Worker pool implementation for parallel batch assembly.
//!
//! Provides a thread pool that manages worker lifecycle, task distribution
//! and result collection for one epoch.
//!
//! # Key features
//! - Bounded channels prevent memory bloat
//! - Graceful shutdown on drop: the pool never outlives its owner, and every
//!   worker thread is joined before `drop` returns
//! - Thread-local worker IDs for debugging
//! - Generic over task and output types
//!
//! Workers pull from a single shared queue. Delivery order is restored on the
//! consumer side from the sequence number each task carries, so which worker
//! picks up which task does not matter.

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::dataloader::common::thread::set_worker_id;
use crate::error::{PipelineError, Result};

/// Thread pool for parallel batch assembly.
///
/// Manages worker lifecycle and communication through bounded channels:
/// - Task channel: Main thread -> Workers (work distribution)
/// - Output channel: Workers -> Main thread (result collection)
/// - Shutdown flag: Enables graceful termination
///
/// # Type Parameters
/// - `Task`: Work items sent to workers
/// - `Output`: Results returned from workers
pub(crate) struct WorkerPool<Task, Output> {
    workers: Vec<thread::JoinHandle<()>>,
    task_tx: Option<Sender<Task>>,
    output_rx: Receiver<Output>,
    shutdown: Arc<AtomicBool>,
}

impl<Task, Output> WorkerPool<Task, Output>
where
    Task: Send + 'static,
    Output: Send + 'static,
{
    /// Spawns `num_workers` threads named `dataloader-worker-{id}`.
    ///
    /// `capacity` bounds both channels. Callers that never have more than
    /// `capacity` tasks outstanding are guaranteed that neither `submit` nor
    /// a worker's output send ever blocks.
    pub(crate) fn new<F>(num_workers: usize, capacity: usize, worker_fn: F) -> Result<Self>
    where
        F: Fn(Receiver<Task>, Sender<Output>, Arc<AtomicBool>) + Send + Sync + 'static,
    {
        // Validation
        if num_workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "Cannot create WorkerPool with 0 workers. \
                Either set num_workers > 0 or use single-threaded mode."
                    .to_string(),
            ));
        }

        if capacity == 0 {
            return Err(PipelineError::InvalidConfig(
                "Cannot create WorkerPool with capacity 0. \
                Capacity must be > 0 to prevent deadlocks."
                    .to_string(),
            ));
        }

        let (task_tx, task_rx) = bounded(capacity);
        let (output_tx, output_rx) = bounded(capacity);

        // Built before spawning so that a spawn failure part-way through
        // still joins the workers that did start.
        let mut pool = Self {
            workers: Vec::with_capacity(num_workers),
            task_tx: Some(task_tx),
            output_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
        };
        let worker_fn = Arc::new(worker_fn);

        // Spawn workers
        for worker_id in 0..num_workers {
            let task_rx = task_rx.clone();
            let output_tx = output_tx.clone();
            let shutdown = pool.shutdown.clone();
            let worker_fn = worker_fn.clone();

            let handle = thread::Builder::new()
                .name(format!("dataloader-worker-{}", worker_id))
                .spawn(move || {
                    set_worker_id(worker_id);
                    worker_fn(task_rx, output_tx, shutdown);
                })
                .map_err(|source| PipelineError::WorkerSpawn {
                    worker: worker_id,
                    source,
                })?;

            pool.workers.push(handle);
        }

        debug!(num_workers, capacity, "Spawned worker pool");
        Ok(pool)
    }
}

impl<Task, Output> WorkerPool<Task, Output> {
    /// Queues a task for the next idle worker.
    ///
    /// Hands the task back if every worker has exited or the pool was shut down.
    pub(crate) fn submit(&self, task: Task) -> std::result::Result<(), Task> {
        match &self.task_tx {
            Some(tx) => tx.send(task).map_err(|e| e.into_inner()),
            None => Err(task),
        }
    }

    /// Blocks until a worker produces an output or `timeout` elapses.
    pub(crate) fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Output, RecvTimeoutError> {
        self.output_rx.recv_timeout(timeout)
    }

    pub(crate) fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Signals shutdown, closes the task channel and joins every worker.
    ///
    /// Idempotent; also run on drop.
    pub(crate) fn shutdown(&mut self) {
        if self.workers.is_empty() && self.task_tx.is_none() {
            return;
        }

        // Signal shutdown to all workers
        self.shutdown.store(true, Ordering::Relaxed);

        // Drop the task sender to close the channel
        self.task_tx.take();

        // Wait for workers to finish
        let num_workers = self.workers.len();
        for worker in self.workers.drain(..) {
            let name = worker.thread().name().map(str::to_owned);
            if worker.join().is_err() {
                warn!(worker = ?name, "Worker thread exited with a panic");
            }
        }
        debug!(num_workers, "Worker pool shut down");
    }
}

impl<Task, Output> Drop for WorkerPool<Task, Output> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
