//! Fixed-length circular array of request counters.

use crate::error::{Result, SdkError};

/// A ring of per-time-slice request counts.
///
/// The slot under `head` counts requests for the current time slice. The
/// ring keeps two running totals: one over every slot, and one over the
/// `tripwire_len` most recent slots (the tripwire window, `head` included).
#[derive(Debug, Clone)]
pub(crate) struct BucketRing {
    /// Request counts, one per time slice
    buckets: Vec<u32>,
    /// Index of the current time slice
    head: usize,
    /// Number of most recent slots forming the tripwire window
    tripwire_len: usize,
    /// Sum of every slot
    total: u64,
    /// Sum of the tripwire window
    tripwire_total: u64,
}

impl BucketRing {
    /// Create an empty ring of `len` slots with a tripwire window of `tripwire_len` slots.
    ///
    /// The tripwire window must be non-empty and no longer than the ring.
    pub fn new(len: usize, tripwire_len: usize) -> Result<Self> {
        if tripwire_len == 0 || tripwire_len > len {
            return Err(SdkError::InvalidConfig(format!(
                "tripwire window of {} buckets does not fit a ring of {} buckets",
                tripwire_len, len
            )));
        }
        Ok(Self {
            buckets: vec![0; len],
            head: 0,
            tripwire_len,
            total: 0,
            tripwire_total: 0,
        })
    }

    /// Number of slots in the ring.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Whether every slot is zero.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Index of the current slot.
    #[cfg(test)]
    pub fn head(&self) -> usize {
        self.head
    }

    /// Sum of every slot.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Sum of the tripwire window.
    pub fn tripwire_total(&self) -> u64 {
        self.tripwire_total
    }

    /// Largest count held by a single slot.
    pub fn max_in_single_bucket(&self) -> u32 {
        self.buckets.iter().copied().max().unwrap_or(0)
    }

    /// Count one request in the current slot.
    pub fn record(&mut self) {
        self.buckets[self.head] += 1;
        self.total += 1;
        self.tripwire_total += 1;
    }

    /// Move the head forward `steps` time slices, zeroing every slot entered.
    ///
    /// Skipped slices saw no requests, so they end up as zero slots.
    pub fn advance(&mut self, steps: u64) {
        let len = self.buckets.len();
        if steps >= len as u64 {
            self.head = (self.head + (steps % len as u64) as usize) % len;
            self.clear_counts();
            return;
        }

        for _ in 0..steps {
            self.head = (self.head + 1) % len;

            // The slot tripwire_len behind the new head leaves the tripwire window.
            let leaving = (self.head + len - self.tripwire_len) % len;
            self.tripwire_total -= self.buckets[leaving] as u64;

            self.total -= self.buckets[self.head] as u64;
            self.buckets[self.head] = 0;
        }
    }

    /// Zero every slot and move the head back to the start.
    pub fn clear(&mut self) {
        self.head = 0;
        self.clear_counts();
    }

    fn clear_counts(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = 0);
        self.total = 0;
        self.tripwire_total = 0;
    }

    /// Sum of the tripwire window computed from the slots themselves.
    #[cfg(test)]
    fn recount_tripwire(&self) -> u64 {
        let len = self.buckets.len();
        (0..self.tripwire_len)
            .map(|back| self.buckets[(self.head + len - back) % len] as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_bad_sizes() {
        assert!(matches!(BucketRing::new(0, 0), Err(SdkError::InvalidConfig(_))));
        assert!(matches!(BucketRing::new(4, 0), Err(SdkError::InvalidConfig(_))));
        assert!(matches!(BucketRing::new(4, 5), Err(SdkError::InvalidConfig(_))));
        assert!(BucketRing::new(4, 4).is_ok());
    }

    #[test]
    fn test_new_ring_is_empty() {
        let ring = BucketRing::new(6, 2).unwrap();
        assert_eq!(ring.len(), 6);
        assert!(ring.is_empty());
        assert_eq!(ring.total(), 0);
        assert_eq!(ring.tripwire_total(), 0);
        assert_eq!(ring.max_in_single_bucket(), 0);
    }

    #[test]
    fn test_record_updates_both_totals() {
        let mut ring = BucketRing::new(6, 2).unwrap();
        ring.record();
        ring.record();

        assert_eq!(ring.total(), 2);
        assert_eq!(ring.tripwire_total(), 2);
        assert_eq!(ring.max_in_single_bucket(), 2);
    }

    #[test]
    fn test_advance_drops_slot_from_tripwire_window() {
        let mut ring = BucketRing::new(6, 2).unwrap();
        ring.record(); // slot 0

        ring.advance(1);
        ring.record(); // slot 1
        assert_eq!(ring.tripwire_total(), 2);

        ring.advance(1);
        // slot 0 has left the two-slot tripwire window but is still in the ring
        assert_eq!(ring.tripwire_total(), 1);
        assert_eq!(ring.total(), 2);
        assert_eq!(ring.tripwire_total(), ring.recount_tripwire());
    }

    #[test]
    fn test_advance_wraps_and_zeroes_stale_slots() {
        let mut ring = BucketRing::new(4, 2).unwrap();
        for _ in 0..3 {
            ring.record();
        }

        ring.advance(3);
        assert_eq!(ring.head(), 3);
        assert_eq!(ring.total(), 3);
        assert_eq!(ring.tripwire_total(), 0);

        // Wrapping back onto slot 0 clears it
        ring.advance(1);
        assert_eq!(ring.head(), 0);
        assert_eq!(ring.total(), 0);
        assert!(ring.is_empty());
    }

    #[test]
    fn test_advance_past_whole_ring_clears() {
        let mut ring = BucketRing::new(4, 2).unwrap();
        ring.record();
        ring.advance(1);
        ring.record();

        ring.advance(10);
        assert!(ring.is_empty());
        assert_eq!(ring.tripwire_total(), 0);
        assert_eq!(ring.head(), (1 + 10) % 4);
    }

    #[test]
    fn test_tripwire_equal_to_ring_length() {
        let mut ring = BucketRing::new(3, 3).unwrap();
        ring.record();
        ring.advance(1);
        ring.record();
        ring.advance(1);
        ring.record();
        assert_eq!(ring.tripwire_total(), 3);

        ring.advance(1);
        assert_eq!(ring.tripwire_total(), 2);
        assert_eq!(ring.total(), 2);
        assert_eq!(ring.tripwire_total(), ring.recount_tripwire());
    }

    #[test]
    fn test_running_totals_match_recount() {
        let mut ring = BucketRing::new(36, 12).unwrap();
        for step in 0..200u64 {
            for _ in 0..(step % 7) {
                ring.record();
            }
            ring.advance(step % 3);
            assert_eq!(ring.tripwire_total(), ring.recount_tripwire());
        }
    }

    #[test]
    fn test_clear() {
        let mut ring = BucketRing::new(4, 2).unwrap();
        ring.record();
        ring.advance(2);
        ring.record();

        ring.clear();
        assert_eq!(ring.head(), 0);
        assert!(ring.is_empty());
        assert_eq!(ring.tripwire_total(), 0);
    }
}
