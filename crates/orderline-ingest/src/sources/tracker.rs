//! Contiguous commit tracking for offset-based sources
//!
//! Offset-based sources can only persist "everything before X is consumed".
//! A message whose processing failed is never committed, so the persisted
//! position must stop in front of it even when later messages commit. After a
//! restart delivery resumes from that position.
//!
//! Committed messages behind an uncommitted one are merged into contiguous
//! ranges, so memory grows with the number of uncommitted messages rather
//! than with everything delivered since.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Partition {
    /// Delivered offsets not yet folded into the watermark: start -> (end, committed)
    pending: BTreeMap<i64, (i64, bool)>,
}

impl Partition {
    /// Fold the committed range at `start` into committed neighbours
    fn merge_around(&mut self, start: i64) {
        let Some(&(end, _)) = self.pending.get(&start) else {
            return;
        };
        let mut end = end;

        if let Some((&next_start, &(next_end, true))) = self.pending.range(end..).next()
            && next_start == end
        {
            self.pending.remove(&next_start);
            end = next_end;
        }

        let mut merged_start = start;
        if let Some((&prev_start, &(prev_end, true))) = self.pending.range(..start).next_back()
            && prev_end == start
        {
            self.pending.remove(&start);
            merged_start = prev_start;
        }

        self.pending.insert(merged_start, (end, true));
    }
}

#[derive(Debug, Default)]
pub(crate) struct CommitTracker {
    partitions: HashMap<i32, Partition>,
}

impl CommitTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Record a delivered message spanning `[start, end)`
    pub(crate) fn delivered(&mut self, partition: i32, start: i64, end: i64) {
        self.partitions
            .entry(partition)
            .or_default()
            .pending
            .insert(start, (end, false));
    }

    /// Mark a delivered message committed
    ///
    /// Returns the new watermark when it moved, i.e. the position to persist.
    pub(crate) fn commit(&mut self, partition: i32, start: i64) -> Option<i64> {
        let state = self.partitions.get_mut(&partition)?;
        match state.pending.get_mut(&start) {
            Some(entry) => entry.1 = true,
            None => return None,
        }

        let mut advanced = None;
        while let Some(entry) = state.pending.first_entry() {
            let (end, committed) = *entry.get();
            if !committed {
                break;
            }
            entry.remove();
            advanced = Some(end);
        }
        if advanced.is_none() {
            state.merge_around(start);
        }
        advanced
    }

    /// Number of delivered messages not yet covered by the watermark
    #[cfg(test)]
    pub(crate) fn pending(&self, partition: i32) -> usize {
        self.partitions
            .get(&partition)
            .map(|p| p.pending.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_order_commits_advance() {
        let mut tracker = CommitTracker::new();
        tracker.delivered(0, 10, 11);
        tracker.delivered(0, 11, 12);

        assert_eq!(tracker.commit(0, 10), Some(11));
        assert_eq!(tracker.commit(0, 11), Some(12));
        assert_eq!(tracker.pending(0), 0);
    }

    #[test]
    fn test_uncommitted_message_holds_watermark() {
        let mut tracker = CommitTracker::new();
        tracker.delivered(0, 0, 40);
        tracker.delivered(0, 40, 95);
        tracker.delivered(0, 95, 130);

        assert_eq!(tracker.commit(0, 0), Some(40));
        // 40..95 failed and is never committed
        assert_eq!(tracker.commit(0, 95), None);
        assert_eq!(tracker.pending(0), 2);

        // A later redelivery that succeeds releases everything behind it
        assert_eq!(tracker.commit(0, 40), Some(130));
    }

    #[test]
    fn test_committed_runs_behind_a_gap_are_merged() {
        let mut tracker = CommitTracker::new();
        for offset in 0..100_000 {
            tracker.delivered(0, offset, offset + 1);
        }
        for offset in 1..100_000 {
            assert_eq!(tracker.commit(0, offset), None);
        }

        // The stuck message plus one merged range
        assert_eq!(tracker.pending(0), 2);
        assert_eq!(tracker.commit(0, 0), Some(100_000));
        assert_eq!(tracker.pending(0), 0);
    }

    #[test]
    fn test_out_of_order_commits_merge_both_ways() {
        let mut tracker = CommitTracker::new();
        for offset in 0..6 {
            tracker.delivered(0, offset, offset + 1);
        }

        assert_eq!(tracker.commit(0, 2), None);
        assert_eq!(tracker.commit(0, 4), None);
        assert_eq!(tracker.pending(0), 6);
        // 3 bridges 2 and 4
        assert_eq!(tracker.commit(0, 3), None);
        assert_eq!(tracker.pending(0), 4);

        assert_eq!(tracker.commit(0, 0), Some(1));
        assert_eq!(tracker.commit(0, 1), Some(5));
        assert_eq!(tracker.pending(0), 1);
        assert_eq!(tracker.commit(0, 5), Some(6));
    }

    #[test]
    fn test_partitions_are_independent() {
        let mut tracker = CommitTracker::new();
        tracker.delivered(0, 5, 6);
        tracker.delivered(1, 7, 8);

        assert_eq!(tracker.commit(1, 7), Some(8));
        assert_eq!(tracker.pending(0), 1);
    }

    #[test]
    fn test_unknown_offsets_are_ignored() {
        let mut tracker = CommitTracker::new();
        assert_eq!(tracker.commit(3, 99), None);
        tracker.delivered(0, 1, 2);
        assert_eq!(tracker.commit(0, 50), None);
    }
}
