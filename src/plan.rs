use std::ops::Range;

/// Upper bound on frames held per batch. Keeps per-batch memory in the
/// hundreds-of-frames range rather than acting as a systems limit.
pub const MAX_BATCH_SIZE: usize = 256;

/// Partitioning of a frame sequence into contiguous, group-aligned batches.
///
/// With a group size above 1 (exposure bracketing) the effective batch size is
/// rounded down to a multiple of the group size, floored at one group, so no
/// exposure group ever spans two batches.
#[derive(Clone, Copy, Debug)]
pub struct BatchPlan {
    len: usize,
    batch_size: usize,
}

impl BatchPlan {
    pub fn new(len: usize, batch_size: usize, group_size: usize) -> Self {
        let mut size = batch_size.clamp(1, MAX_BATCH_SIZE);
        if group_size > 1 {
            size = (size / group_size * group_size).max(group_size);
        }
        Self {
            len,
            batch_size: size,
        }
    }

    /// Effective per-batch length after clamping and group alignment.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn batch_count(&self) -> usize {
        self.len.div_ceil(self.batch_size)
    }

    /// Lazy, restartable iterator of index ranges into the sequence.
    pub fn batches(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        let (len, size) = (self.len, self.batch_size);
        (0..len)
            .step_by(size)
            .map(move |start| start..(start + size).min(len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranges(plan: &BatchPlan) -> Vec<Range<usize>> {
        plan.batches().collect()
    }

    #[test]
    fn concatenated_batches_reconstruct_the_sequence() {
        let plan = BatchPlan::new(10, 4, 1);
        let got = ranges(&plan);
        assert_eq!(got, vec![0..4, 4..8, 8..10]);
        assert!(got[..got.len() - 1].iter().all(|r| r.len() == 4));
    }

    #[test]
    fn batch_size_is_clamped() {
        assert_eq!(BatchPlan::new(10, 0, 1).batch_size(), 1);
        assert_eq!(BatchPlan::new(10, 100_000, 1).batch_size(), MAX_BATCH_SIZE);
    }

    #[test]
    fn bracketed_batches_are_group_aligned() {
        let plan = BatchPlan::new(12, 8, 3);
        assert_eq!(plan.batch_size(), 6);
        for r in plan.batches() {
            assert!(r.start.is_multiple_of(3));
        }
        assert_eq!(ranges(&plan), vec![0..6, 6..12]);
    }

    #[test]
    fn batch_size_below_group_size_floors_at_one_group() {
        assert_eq!(BatchPlan::new(9, 2, 3).batch_size(), 3);
    }

    #[test]
    fn short_sequence_yields_one_whole_batch() {
        let plan = BatchPlan::new(3, 100, 1);
        assert_eq!(ranges(&plan), vec![0..3]);
    }

    #[test]
    fn empty_sequence_yields_no_batches() {
        let plan = BatchPlan::new(0, 8, 3);
        assert_eq!(plan.batch_count(), 0);
        assert!(ranges(&plan).is_empty());
    }

    #[test]
    fn batches_iterator_is_restartable() {
        let plan = BatchPlan::new(7, 2, 1);
        assert_eq!(ranges(&plan), ranges(&plan));
        assert_eq!(plan.batch_count(), 4);
    }
}
