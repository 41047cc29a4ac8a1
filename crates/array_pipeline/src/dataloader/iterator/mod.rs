//! src/dataloader/iterator/mod.rs
//!
//! The per-epoch batch iterator returned by `BatchIterator::iterate()`.
//!
//! # Iterator Variants
//! - `Single`: the consumer thread fetches and collates each group itself
//! - `Multi`: a fresh worker pool fetches groups in parallel; a reorder
//!   buffer hands batches out in dispatch order
//!
//! ```text
//!   groups ──seq──► task channel ──► worker 0 ─┐
//!    (0,1,2..)                   ──► worker 1 ─┼─► output channel ──► ReorderBuffer ──► next()
//!                                ──► worker 2 ─┘   (any order)          (0,1,2..)
//! ```

mod reorder;

use crossbeam_channel::RecvTimeoutError;
use std::iter::{Enumerate, FusedIterator};
use std::sync::Arc;
use std::time::Duration;
use std::vec::IntoIter;
use tracing::{debug, info, warn};

use self::reorder::ReorderBuffer;
use super::config::LoaderConfig;
use super::workers::fetch::{fetch_batch, spawn_fetch_workers, FetchOutput, FetchTask};
use super::workers::pool::WorkerPool;
use crate::collator::Collator;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::minibatch::Batch;

/// Iterator over the batches of one epoch.
///
/// Yields exactly `num_batches()` batches, in the order their index-groups
/// were drawn, unless a fetch fails. The first failure is yielded once as
/// `Some(Err(_))`, after which the iterator is fused and all workers have
/// been joined. Dropping the iterator early also joins every worker before
/// `drop` returns.
pub struct EpochIter {
    epoch: usize,
    num_batches: usize,
    delivered: usize,
    state: IterState,
}

enum IterState {
    /// Single-threaded: groups are fetched on the consumer thread.
    Single {
        dataset: Arc<dyn Dataset>,
        collator: Arc<dyn Collator>,
        groups: IntoIter<Vec<usize>>,
        pin_memory: bool,
    },

    /// Multi-threaded with a worker pool for this epoch.
    Multi(MultiState),

    Finished,
}

/// Dispatch and delivery state of a multi-threaded epoch.
/// - `dispatched`: number of groups handed to workers so far
/// - `window`: maximum of `dispatched - delivered`
struct MultiState {
    pool: WorkerPool<FetchTask, FetchOutput>,
    groups: Enumerate<IntoIter<Vec<usize>>>,
    reorder: ReorderBuffer<Batch>,
    dispatched: usize,
    window: usize,
    timeout: Duration,
}

impl MultiState {
    /// Tops up the in-flight window, then returns the next batch in dispatch
    /// order, the first failure, or `None` once every group is delivered.
    fn next_ordered(&mut self, delivered: usize) -> Option<Result<Batch>> {
        while self.dispatched - delivered < self.window {
            let Some((seq, indices)) = self.groups.next() else {
                break;
            };
            if self.pool.submit(FetchTask { seq, indices }).is_err() {
                return Some(Err(PipelineError::WorkersDisconnected {
                    pending: self.dispatched - delivered,
                }));
            }
            self.dispatched += 1;
        }

        loop {
            if let Some(batch) = self.reorder.pop_next() {
                return Some(Ok(batch));
            }
            if self.reorder.next_seq() >= self.dispatched {
                return None;
            }

            let pending = self.dispatched - delivered;
            match self.pool.recv_timeout(self.timeout) {
                // A failure aborts the epoch right away, even if earlier
                // batches are still outstanding.
                Ok(FetchOutput { result: Err(e), .. }) => return Some(Err(e)),
                Ok(FetchOutput {
                    seq,
                    result: Ok(batch),
                }) => {
                    self.reorder.insert(seq, batch);
                    if self.reorder.buffered() > 1 {
                        debug!(
                            waiting_for = self.reorder.next_seq(),
                            buffered = self.reorder.buffered(),
                            "Holding out-of-order batches"
                        );
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    return Some(Err(PipelineError::WorkerTimeout {
                        timeout: self.timeout,
                        pending,
                    }))
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Some(Err(PipelineError::WorkersDisconnected { pending }))
                }
            }
        }
    }
}

impl EpochIter {
    pub(crate) fn single(
        epoch: usize,
        groups: Vec<Vec<usize>>,
        dataset: Arc<dyn Dataset>,
        collator: Arc<dyn Collator>,
        pin_memory: bool,
    ) -> Self {
        Self {
            epoch,
            num_batches: groups.len(),
            delivered: 0,
            state: IterState::Single {
                dataset,
                collator,
                groups: groups.into_iter(),
                pin_memory,
            },
        }
    }

    pub(crate) fn multi(
        epoch: usize,
        groups: Vec<Vec<usize>>,
        dataset: Arc<dyn Dataset>,
        collator: Arc<dyn Collator>,
        config: &LoaderConfig,
    ) -> Result<Self> {
        let num_batches = groups.len();
        if num_batches == 0 {
            return Ok(Self {
                epoch,
                num_batches,
                delivered: 0,
                state: IterState::Finished,
            });
        }

        // No point in spawning workers that could never receive a group
        let num_workers = config.num_workers.min(num_batches);
        let window = config.in_flight();
        let pool = spawn_fetch_workers(
            dataset,
            collator,
            num_workers,
            window,
            config.worker_poll,
            config.pin_memory,
        )?;

        Ok(Self {
            epoch,
            num_batches,
            delivered: 0,
            state: IterState::Multi(MultiState {
                pool,
                groups: groups.into_iter().enumerate(),
                reorder: ReorderBuffer::new(),
                dispatched: 0,
                window,
                timeout: config.timeout,
            }),
        })
    }

    /// Epoch this iterator belongs to, counted from 0.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Total number of batches in the epoch.
    pub fn num_batches(&self) -> usize {
        self.num_batches
    }

    /// Number of batches delivered so far.
    pub fn delivered(&self) -> usize {
        self.delivered
    }

    /// Drops the worker pool, if any, joining every worker.
    fn finish(&mut self) {
        self.state = IterState::Finished;
    }
}

impl Iterator for EpochIter {
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let delivered = self.delivered;
        let item = match &mut self.state {
            IterState::Finished => return None,

            // Single-threaded: direct `Sample` fetching using `get(index)`
            IterState::Single {
                dataset,
                collator,
                groups,
                pin_memory,
            } => groups
                .next()
                .map(|indices| fetch_batch(&**dataset, &**collator, &indices, *pin_memory)),

            // Multi-threaded: dispatch, then deliver in order
            IterState::Multi(multi) => multi.next_ordered(delivered),
        };

        match item {
            Some(Ok(batch)) => {
                self.delivered += 1;
                if self.delivered == self.num_batches {
                    info!(epoch = self.epoch, batches = self.delivered, "Epoch complete");
                    self.finish();
                }
                Some(Ok(batch))
            }
            Some(Err(e)) => {
                warn!(
                    epoch = self.epoch,
                    delivered = self.delivered,
                    error = %e,
                    "Aborting epoch"
                );
                self.finish();
                Some(Err(e))
            }
            None => {
                self.finish();
                None
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match self.state {
            IterState::Finished => (0, Some(0)),
            _ => {
                let remaining = self.num_batches - self.delivered;
                (remaining, Some(remaining))
            }
        }
    }
}

impl FusedIterator for EpochIter {}

impl Drop for EpochIter {
    fn drop(&mut self) {
        if let IterState::Multi(MultiState { pool, .. }) = &self.state {
            debug!(
                epoch = self.epoch,
                delivered = self.delivered,
                total = self.num_batches,
                workers = pool.num_workers(),
                "Epoch iterator dropped early, shutting down workers"
            );
        }
        self.finish();
    }
}
