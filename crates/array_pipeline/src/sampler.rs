use crate::array::blocks;
use crate::error::Result;
use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A `Sampler` decides the order in which a dataset's indices are visited
/// during one epoch.
///
/// # Method
/// - `new_epoch()`: returns the complete ordering for the next epoch. Every
///    call starts a new epoch, so two calls may (and for random samplers,
///    usually will) return different orderings.
///
/// Implementations must be `Send + Sync` so the same sampler instance can be
/// owned by a `BatchIterator` that is itself shared.
pub trait Sampler: Send + Sync {
    /// Number of indices produced per epoch, i.e. the dataset size.
    fn len(&self) -> usize;

    fn new_epoch(&self) -> SplitIndices;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The ordering of `[0, N)` drawn for one epoch.
///
/// Every index in `[0, N)` appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    epoch: usize,
    indices: Vec<usize>,
}

impl SplitIndices {
    pub(crate) fn new(epoch: usize, indices: Vec<usize>) -> Self {
        Self { epoch, indices }
    }

    /// Epoch this ordering was drawn for, counted from 0.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.indices
    }

    /// Partitions the ordering, in order, into consecutive groups of
    /// `batch_size` indices (the last group may be shorter). Each group is
    /// sorted ascending so that its rows are read front to back.
    ///
    /// ```
    /// # use array_pipeline::sampler::{Sampler, SequentialSampler};
    /// let groups = SequentialSampler::new(10).new_epoch().groups(4).unwrap();
    /// assert_eq!(groups.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);
    /// ```
    pub fn groups(&self, batch_size: usize) -> Result<Vec<Vec<usize>>> {
        Ok(blocks(self.indices.len(), batch_size)?
            .map(|range| {
                let mut group = self.indices[range].to_vec();
                group.sort_unstable();
                group
            })
            .collect())
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.indices
    }
}

/// ============================================================================
/// Yields indices sequentially in order `(0,1,2,...,dataset_size-1)` every
/// epoch. Useful for deterministic evaluation passes.
///
/// # Examples
/// ```ignore
/// let sampler = SequentialSampler::new(5);
/// assert_eq!(sampler.new_epoch().as_slice(), &[0, 1, 2, 3, 4]);
/// ```
#[derive(Debug)]
pub struct SequentialSampler {
    dataset_size: usize,
    epoch: AtomicUsize,
}

impl SequentialSampler {
    pub fn new(dataset_size: usize) -> Self {
        Self {
            dataset_size,
            epoch: AtomicUsize::new(0),
        }
    }
}

impl Sampler for SequentialSampler {
    fn len(&self) -> usize {
        self.dataset_size
    }

    fn new_epoch(&self) -> SplitIndices {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
        SplitIndices::new(epoch, (0..self.dataset_size).collect())
    }
}

/// ============================================================================
/// A fresh uniform permutation of `0..dataset_size` every epoch, drawn
/// without replacement.
///
/// # Seed Handling
/// - Seeded: epoch `e` shuffles with a `StdRng` whose 32-byte seed holds
///   `seed` in bytes `0..8` and `e` in bytes `8..16`. Every `(seed, e)` pair
///   gets its own stream, so the same seed replays the same sequence of
///   epochs while nearby seeds never share an epoch's order.
/// - Unseeded: every epoch shuffles with the thread-local OS-seeded RNG.
///
/// Train and validation get their own sampler instances, each sized to its
/// own dataset and seeded independently.
///
/// # Example usage
/// ```ignore
/// let train = SplitSampler::new(60_000, Some(42));
/// let val = SplitSampler::new(10_000, Some(43));
/// let order = train.new_epoch();
/// ```
#[derive(Debug)]
pub struct SplitSampler {
    dataset_size: usize,
    base_seed: Option<u64>,
    epoch: AtomicUsize,
}

impl SplitSampler {
    pub fn new(dataset_size: usize, base_seed: Option<u64>) -> Self {
        Self {
            dataset_size,
            base_seed,
            epoch: AtomicUsize::new(0),
        }
    }

    pub fn seed(&self) -> Option<u64> {
        self.base_seed
    }

    /// Number of epochs drawn so far.
    pub fn epochs_drawn(&self) -> usize {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Returns the permutation for `epoch` without advancing the epoch counter.
    ///
    /// Deterministic for seeded samplers; a fresh random draw otherwise.
    pub fn permutation(&self, epoch: usize) -> SplitIndices {
        let mut indices: Vec<usize> = (0..self.dataset_size).collect();
        match self.base_seed {
            Some(_) => indices.shuffle(&mut self.derive_rng_for_epoch(epoch)),
            None => indices.shuffle(&mut rand::rng()),
        }
        SplitIndices::new(epoch, indices)
    }

    /// Derives a deterministic random number generator for the given epoch
    #[inline]
    fn derive_rng_for_epoch(&self, epoch: usize) -> StdRng {
        let base_seed = self.base_seed.unwrap_or_default();
        let mut seed = <StdRng as SeedableRng>::Seed::default();
        seed[..8].copy_from_slice(&base_seed.to_le_bytes());
        seed[8..16].copy_from_slice(&(epoch as u64).to_le_bytes());
        StdRng::from_seed(seed)
    }
}

impl Sampler for SplitSampler {
    fn len(&self) -> usize {
        self.dataset_size
    }

    fn new_epoch(&self) -> SplitIndices {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst);
        self.permutation(epoch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::collections::HashSet;

    const TEST_SEED: u64 = 42;
    const TEST_DATASET_SIZE: usize = 100;

    fn assert_is_permutation(indices: &SplitIndices, n: usize) {
        assert_eq!(indices.len(), n);
        let unique: HashSet<usize> = indices.as_slice().iter().copied().collect();
        assert_eq!(unique.len(), n);
        assert!(indices.as_slice().iter().all(|&i| i < n));
    }

    mod sequential_sampler_tests {
        use super::*;

        #[test]
        fn yields_sequential_indices() {
            let sampler = SequentialSampler::new(100);
            let indices = sampler.new_epoch();
            assert_eq!(indices.as_slice(), (0..100).collect::<Vec<_>>().as_slice());
            assert_eq!(indices.epoch(), 0);
            assert_eq!(sampler.new_epoch().epoch(), 1);
        }

        #[test]
        fn handles_empty_dataset() {
            let sampler = SequentialSampler::new(0);
            assert!(sampler.is_empty());
            assert!(sampler.new_epoch().is_empty());
        }
    }

    mod split_sampler_tests {
        use super::*;

        #[test]
        fn every_epoch_is_a_permutation() {
            for n in [0, 1, 2, 7, TEST_DATASET_SIZE] {
                let seeded = SplitSampler::new(n, Some(TEST_SEED));
                let unseeded = SplitSampler::new(n, None);
                for _ in 0..3 {
                    assert_is_permutation(&seeded.new_epoch(), n);
                    assert_is_permutation(&unseeded.new_epoch(), n);
                }
            }
        }

        #[test]
        fn produces_deterministic_results() {
            let a = SplitSampler::new(TEST_DATASET_SIZE, Some(TEST_SEED));
            let b = SplitSampler::new(TEST_DATASET_SIZE, Some(TEST_SEED));
            assert_eq!(a.new_epoch(), b.new_epoch());
            assert_eq!(a.new_epoch(), b.new_epoch());
            assert_eq!(a.permutation(1), b.permutation(1));
        }

        #[test]
        fn different_epochs_produce_different_orders() {
            let sampler = SplitSampler::new(TEST_DATASET_SIZE, Some(TEST_SEED));
            let first = sampler.new_epoch();
            let second = sampler.new_epoch();
            assert_eq!(first.epoch(), 0);
            assert_eq!(second.epoch(), 1);
            assert_ne!(first.as_slice(), second.as_slice());
            assert_eq!(sampler.epochs_drawn(), 2);
        }

        #[test]
        fn different_seeds_produce_different_orders() {
            let train = SplitSampler::new(TEST_DATASET_SIZE, Some(TEST_SEED));
            let val = SplitSampler::new(TEST_DATASET_SIZE, Some(TEST_SEED + 1));
            assert_ne!(train.permutation(0), val.permutation(0));
        }

        #[test]
        fn adjacent_seeds_do_not_share_epochs() {
            let train = SplitSampler::new(32, Some(2024));
            let val = SplitSampler::new(32, Some(2025));
            for epoch in 0..4 {
                assert_ne!(
                    train.permutation(epoch + 1).as_slice(),
                    val.permutation(epoch).as_slice()
                );
            }
        }

        #[test]
        fn permutation_does_not_advance_epoch() {
            let sampler = SplitSampler::new(10, Some(TEST_SEED));
            let _ = sampler.permutation(5);
            assert_eq!(sampler.epochs_drawn(), 0);
            assert_eq!(sampler.new_epoch(), sampler.permutation(0));
        }
    }

    mod split_indices_tests {
        use super::*;

        #[test]
        fn groups_follow_ordering_and_sort_within() -> anyhow::Result<()> {
            let indices = SplitIndices::new(0, vec![9, 3, 7, 1, 0, 8, 2, 6, 5, 4]);
            let groups = indices.groups(4)?;
            assert_eq!(
                groups,
                vec![vec![1, 3, 7, 9], vec![0, 2, 6, 8], vec![4, 5]]
            );
            Ok(())
        }

        #[test]
        fn group_sizes_sum_to_len() -> anyhow::Result<()> {
            let sampler = SplitSampler::new(TEST_DATASET_SIZE, Some(TEST_SEED));
            let groups = sampler.new_epoch().groups(32)?;
            assert_eq!(groups.len(), 4);
            assert_eq!(groups.iter().map(Vec::len).sum::<usize>(), TEST_DATASET_SIZE);
            assert_eq!(groups[3].len(), 4);
            Ok(())
        }

        #[test]
        fn zero_batch_size_is_rejected() {
            let indices = SequentialSampler::new(3).new_epoch();
            assert!(matches!(
                indices.groups(0),
                Err(PipelineError::InvalidConfig(_))
            ));
        }
    }
}
