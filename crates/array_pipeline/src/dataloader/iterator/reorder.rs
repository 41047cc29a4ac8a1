use std::collections::BTreeMap;

/// Restores dispatch order for outputs that complete out of order.
///
/// Items are inserted under their sequence number and released strictly as
/// `0, 1, 2, ...`. The buffer never holds more items than the caller has in
/// flight, so its size is bounded by the prefetch window.
#[derive(Debug)]
pub(crate) struct ReorderBuffer<T> {
    next_seq: usize,
    pending: BTreeMap<usize, T>,
}

impl<T> ReorderBuffer<T> {
    pub(crate) fn new() -> Self {
        Self {
            next_seq: 0,
            pending: BTreeMap::new(),
        }
    }

    pub(crate) fn insert(&mut self, seq: usize, item: T) {
        debug_assert!(seq >= self.next_seq, "sequence {} already released", seq);
        self.pending.insert(seq, item);
    }

    /// Releases the next item in sequence, if it has arrived.
    pub(crate) fn pop_next(&mut self) -> Option<T> {
        let item = self.pending.remove(&self.next_seq)?;
        self.next_seq += 1;
        Some(item)
    }

    /// Sequence number of the next item to be released.
    pub(crate) fn next_seq(&self) -> usize {
        self.next_seq
    }

    /// Number of items waiting on an earlier sequence number.
    pub(crate) fn buffered(&self) -> usize {
        self.pending.len()
    }
}
