//! src/dataloader/workers/fetch.rs
//!
//! Fetch workers: each one turns an index-group into a [`Batch`].
//!
//! # Architecture:
//! - Workers share the dataset and collator via `Arc` for zero-copy access.
//! - Tasks carry the dispatch sequence number of their group; outputs echo it
//!   back so the consumer can restore dispatch order.
//! - A failing or panicking fetch becomes an error output for that sequence
//!   number. The worker itself keeps running until it is told to shut down.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

use super::pool::WorkerPool;
use crate::collator::Collator;
use crate::dataloader::common::thread::current_worker_id;
use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::minibatch::Batch;
use crate::sample::Sample;

/// One index-group to assemble, tagged with its dispatch position.
#[derive(Debug)]
pub(crate) struct FetchTask {
    pub(crate) seq: usize,
    pub(crate) indices: Vec<usize>,
}

/// The assembled batch (or the failure) for the task with the same `seq`.
pub(crate) struct FetchOutput {
    pub(crate) seq: usize,
    pub(crate) result: Result<Batch>,
}

/// Reads every index of `indices` from `dataset` in the given order and
/// collates the samples. Used by workers and by single-threaded iteration.
pub(crate) fn fetch_batch(
    dataset: &dyn Dataset,
    collator: &dyn Collator,
    indices: &[usize],
    pin_memory: bool,
) -> Result<Batch> {
    let samples = indices
        .iter()
        .map(|&index| dataset.get(index))
        .collect::<Result<Vec<Sample>>>()?;

    let batch = collator.collate(&samples)?;
    if pin_memory {
        batch.pin_memory()
    } else {
        Ok(batch)
    }
}

/// Spawns a pool of fetch workers over `dataset`.
///
/// `capacity` must be at least the number of tasks the caller keeps in flight.
pub(crate) fn spawn_fetch_workers(
    dataset: Arc<dyn Dataset>,
    collator: Arc<dyn Collator>,
    num_workers: usize,
    capacity: usize,
    poll_interval: Duration,
    pin_memory: bool,
) -> Result<WorkerPool<FetchTask, FetchOutput>> {
    WorkerPool::new(
        num_workers,
        capacity,
        move |task_rx: Receiver<FetchTask>,
              output_tx: Sender<FetchOutput>,
              shutdown: Arc<AtomicBool>| {
            let worker_id = current_worker_id().unwrap_or_default();
            let mut assembled = 0usize;

            while !shutdown.load(Ordering::Relaxed) {
                let task = match task_rx.recv_timeout(poll_interval) {
                    Ok(task) => task,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };

                let seq = task.seq;
                let outcome = catch_unwind(AssertUnwindSafe(|| {
                    fetch_batch(&*dataset, &*collator, &task.indices, pin_memory)
                }));
                let result = match outcome {
                    Ok(Ok(batch)) => {
                        assembled += 1;
                        trace!(worker = worker_id, batch = seq, size = batch.len(), "Assembled batch");
                        Ok(batch)
                    }
                    Ok(Err(source)) => {
                        warn!(worker = worker_id, batch = seq, error = %source, "Batch assembly failed");
                        Err(PipelineError::Fetch {
                            batch: seq,
                            worker: worker_id,
                            source: Box::new(source),
                        })
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(worker = worker_id, batch = seq, %message, "Worker panicked");
                        Err(PipelineError::WorkerPanicked {
                            batch: seq,
                            worker: worker_id,
                            message,
                        })
                    }
                };

                if output_tx.send(FetchOutput { seq, result }).is_err() {
                    break;
                }
            }

            debug!(worker = worker_id, assembled, "Fetch worker exiting");
        },
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collator::StackCollator;
    use tch::Tensor;

    /// Sample `i` is `(i as f32, i as i64)`; `poison` makes that index fail.
    struct Counting {
        len: usize,
        poison: Option<usize>,
        panic_on: Option<usize>,
    }

    impl Dataset for Counting {
        fn len(&self) -> usize {
            self.len
        }

        fn get(&self, index: usize) -> Result<Sample> {
            if Some(index) == self.panic_on {
                panic!("corrupt row {}", index);
            }
            if Some(index) == self.poison || index >= self.len {
                return Err(PipelineError::Index {
                    index,
                    len: self.len,
                });
            }
            Ok(Sample::new(
                Tensor::from(index as f32),
                Tensor::from(index as i64),
            ))
        }
    }

    fn counting(len: usize) -> Counting {
        Counting {
            len,
            poison: None,
            panic_on: None,
        }
    }

    #[test]
    fn fetch_batch_keeps_index_order() -> anyhow::Result<()> {
        let batch = fetch_batch(&counting(10), &StackCollator, &[1, 4, 7], false)?;
        let labels: Vec<i64> = Vec::<i64>::try_from(&batch.labels)?;
        assert_eq!(labels, vec![1, 4, 7]);
        Ok(())
    }

    #[test]
    fn fetch_batch_propagates_dataset_errors() {
        let dataset = Counting {
            poison: Some(4),
            ..counting(10)
        };
        let result = fetch_batch(&dataset, &StackCollator, &[1, 4, 7], false);
        assert!(matches!(result, Err(PipelineError::Index { index: 4, .. })));
    }

    #[test]
    fn workers_tag_outputs_with_sequence_numbers() -> anyhow::Result<()> {
        let dataset = Counting {
            poison: Some(5),
            panic_on: Some(8),
            ..counting(10)
        };
        let pool = spawn_fetch_workers(
            Arc::new(dataset),
            Arc::new(StackCollator),
            2,
            4,
            Duration::from_millis(10),
            false,
        )?;

        let groups = [vec![0, 1], vec![4, 5], vec![8, 9]];
        for (seq, indices) in groups.iter().enumerate() {
            assert!(pool
                .submit(FetchTask {
                    seq,
                    indices: indices.clone(),
                })
                .is_ok());
        }

        let mut outputs: Vec<FetchOutput> = (0..3)
            .map(|_| pool.recv_timeout(Duration::from_secs(5)))
            .collect::<std::result::Result<_, _>>()?;
        outputs.sort_by_key(|o| o.seq);

        assert!(outputs[0].result.is_ok());
        assert!(matches!(
            &outputs[1].result,
            Err(PipelineError::Fetch { batch: 1, .. })
        ));
        match &outputs[2].result {
            Err(PipelineError::WorkerPanicked { batch, message, .. }) => {
                assert_eq!(*batch, 2);
                assert!(message.contains("corrupt row 8"));
            }
            other => panic!("expected a panic report, got {:?}", other.as_ref().err()),
        }
        Ok(())
    }
}
