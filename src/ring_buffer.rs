//! Ring bit buffer for sliding-window failure statistics
//!
//! Records the outcome of the most recent `capacity` calls as single bits
//! (failure = 1) in a packed word array. Both recording and the failure
//! rate query are O(1). The failure rate is only defined once the window
//! holds `capacity` outcomes; before that a sentinel of `-1.0` is returned
//! so that an undersampled window never trips a breaker.

use parking_lot::Mutex;

const BITS_PER_WORD: usize = u64::BITS as usize;

/// Failure rate sentinel returned while the buffer is not yet full
pub const RATE_NOT_AVAILABLE: f32 = -1.0;

#[derive(Debug)]
struct Slots {
    words: Vec<u64>,
    /// Total bits written since creation or reset; the next write lands at
    /// `write_count % capacity`
    write_count: u64,
    failed: usize,
}

/// Fixed-capacity circular record of call outcomes
#[derive(Debug)]
pub struct RingBitBuffer {
    capacity: usize,
    slots: Mutex<Slots>,
}

impl RingBitBuffer {
    /// Create a buffer tracking the last `capacity` outcomes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0; configuration validation rejects such
    /// sizes before a buffer is ever built.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring bit buffer capacity must be at least 1");
        let word_count = capacity.div_ceil(BITS_PER_WORD);
        Self {
            capacity,
            slots: Mutex::new(Slots {
                words: vec![0; word_count],
                write_count: 0,
                failed: 0,
            }),
        }
    }

    /// Record one outcome and return the resulting failure rate in percent,
    /// or [`RATE_NOT_AVAILABLE`] while the window is still filling.
    pub fn record(&self, failure: bool) -> f32 {
        let mut slots = self.slots.lock();

        let index = (slots.write_count % self.capacity as u64) as usize;
        let word = index / BITS_PER_WORD;
        let mask = 1u64 << (index % BITS_PER_WORD);

        let rolling = slots.write_count >= self.capacity as u64;
        if rolling && slots.words[word] & mask != 0 {
            slots.failed -= 1;
        }

        if failure {
            slots.words[word] |= mask;
            slots.failed += 1;
        } else {
            slots.words[word] &= !mask;
        }

        slots.write_count += 1;
        self.rate_of(&slots)
    }

    /// Clear all recorded outcomes.
    pub fn reset(&self) {
        let mut slots = self.slots.lock();
        slots.words.fill(0);
        slots.write_count = 0;
        slots.failed = 0;
    }

    /// The window size `N`
    pub fn size(&self) -> usize {
        self.capacity
    }

    /// Outcomes currently held, saturating at the window size
    pub fn recorded_calls(&self) -> usize {
        let slots = self.slots.lock();
        self.recorded_of(&slots)
    }

    /// Failure outcomes currently held
    pub fn failed_calls(&self) -> usize {
        self.slots.lock().failed
    }

    /// Success outcomes currently held
    pub fn successful_calls(&self) -> usize {
        let slots = self.slots.lock();
        self.recorded_of(&slots) - slots.failed
    }

    /// Current failure rate in percent, or [`RATE_NOT_AVAILABLE`] while the
    /// window is still filling
    pub fn failure_rate(&self) -> f32 {
        let slots = self.slots.lock();
        self.rate_of(&slots)
    }

    /// One consistent view of (recorded, failed, rate) taken under a single
    /// lock acquisition.
    pub(crate) fn counters(&self) -> (usize, usize, f32) {
        let slots = self.slots.lock();
        (self.recorded_of(&slots), slots.failed, self.rate_of(&slots))
    }

    fn recorded_of(&self, slots: &Slots) -> usize {
        slots.write_count.min(self.capacity as u64) as usize
    }

    fn rate_of(&self, slots: &Slots) -> f32 {
        if slots.write_count < self.capacity as u64 {
            RATE_NOT_AVAILABLE
        } else {
            slots.failed as f32 * 100.0 / self.capacity as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_rate_unavailable_until_full() {
        let buffer = RingBitBuffer::new(4);

        assert_eq!(buffer.record(true), RATE_NOT_AVAILABLE);
        assert_eq!(buffer.record(true), RATE_NOT_AVAILABLE);
        assert_eq!(buffer.record(true), RATE_NOT_AVAILABLE);
        assert_eq!(buffer.failure_rate(), RATE_NOT_AVAILABLE);

        // The fourth record fills the window
        assert_eq!(buffer.record(false), 75.0);
        assert_eq!(buffer.failure_rate(), 75.0);
    }

    #[test]
    fn test_counts_track_outcomes() {
        let buffer = RingBitBuffer::new(10);
        buffer.record(true);
        buffer.record(false);
        buffer.record(false);

        assert_eq!(buffer.size(), 10);
        assert_eq!(buffer.recorded_calls(), 3);
        assert_eq!(buffer.failed_calls(), 1);
        assert_eq!(buffer.successful_calls(), 2);
    }

    #[test]
    fn test_window_reflects_only_last_n_outcomes() {
        let buffer = RingBitBuffer::new(4);

        // Fill with failures, then roll in successes one by one
        for _ in 0..4 {
            buffer.record(true);
        }
        assert_eq!(buffer.failure_rate(), 100.0);

        assert_eq!(buffer.record(false), 75.0);
        assert_eq!(buffer.record(false), 50.0);
        assert_eq!(buffer.record(false), 25.0);
        assert_eq!(buffer.record(false), 0.0);

        // Rolling further keeps the rate defined
        assert_eq!(buffer.record(true), 25.0);
        assert_eq!(buffer.recorded_calls(), 4);
    }

    #[test]
    fn test_capacity_beyond_one_word() {
        let buffer = RingBitBuffer::new(130);
        for i in 0..130 {
            buffer.record(i % 2 == 0);
        }
        assert_eq!(buffer.recorded_calls(), 130);
        assert_eq!(buffer.failed_calls(), 65);

        // Roll the whole window over with successes
        for _ in 0..130 {
            buffer.record(false);
        }
        assert_eq!(buffer.failed_calls(), 0);
        assert_eq!(buffer.failure_rate(), 0.0);
    }

    #[test]
    fn test_reset_clears_everything() {
        let buffer = RingBitBuffer::new(3);
        buffer.record(true);
        buffer.record(true);
        buffer.record(true);
        assert_eq!(buffer.failure_rate(), 100.0);

        buffer.reset();
        assert_eq!(buffer.recorded_calls(), 0);
        assert_eq!(buffer.failed_calls(), 0);
        assert_eq!(buffer.failure_rate(), RATE_NOT_AVAILABLE);

        // Stale bits from before the reset must not resurface
        assert_eq!(buffer.record(false), RATE_NOT_AVAILABLE);
        assert_eq!(buffer.failed_calls(), 0);
    }

    #[test]
    fn test_single_slot_buffer() {
        let buffer = RingBitBuffer::new(1);
        assert_eq!(buffer.record(true), 100.0);
        assert_eq!(buffer.record(false), 0.0);
        assert_eq!(buffer.record(true), 100.0);
    }

    #[test]
    fn test_invariant_holds_under_concurrent_records() {
        let buffer = Arc::new(RingBitBuffer::new(64));
        let mut handles = Vec::new();

        for worker in 0..8 {
            let buffer = Arc::clone(&buffer);
            handles.push(thread::spawn(move || {
                for i in 0..100 {
                    buffer.record((worker + i) % 3 == 0);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let (recorded, failed, rate) = buffer.counters();
        assert_eq!(recorded, 64);
        assert_eq!(failed + buffer.successful_calls(), recorded);
        assert_eq!(rate, failed as f32 * 100.0 / 64.0);
    }

    #[test]
    #[should_panic(expected = "capacity must be at least 1")]
    fn test_zero_capacity_rejected() {
        RingBitBuffer::new(0);
    }
}
