//! Thread-local storage for worker identification.
//!
//! Provides a thread-local worker ID that allows fetch workers to identify
//! themselves in error messages and log events.

use std::cell::Cell;

thread_local! {
    /// Thread-local worker ID.
    ///
    /// Each worker thread is assigned a unique ID (0 to num_workers-1) when
    /// spawned. Threads that are not fetch workers, including the consumer
    /// thread in single-threaded mode, hold `None`.
    pub static WORKER_ID: Cell<Option<usize>> = const { Cell::new(None) };
}

/// Returns the ID of the fetch worker running on this thread, if any.
pub fn current_worker_id() -> Option<usize> {
    WORKER_ID.with(Cell::get)
}

pub(crate) fn set_worker_id(worker_id: usize) {
    WORKER_ID.with(|id| id.set(Some(worker_id)));
}
