//! Lock-protected ring buffer for interleaved PCM samples
//!
//! Single producer appends, single consumer removes up to N samples. The
//! mutex is held only for the duration of the copy, so the real-time audio
//! callback on either end never waits on codec or network work.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

struct Ring<T> {
    slots: Vec<T>,
    head: usize,
    len: usize,
}

/// Bounded circular buffer of interleaved PCM samples.
///
/// A write that does not fit is rejected whole rather than truncated, so a
/// multi-channel frame is never split across an overflow boundary.
pub struct SampleRing<T> {
    ring: Mutex<Ring<T>>,
    capacity: usize,
    overflows: AtomicUsize,
}

impl<T: Copy + Default> SampleRing<T> {
    /// Create a ring holding at most `capacity` samples
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Mutex::new(Ring {
                slots: vec![T::default(); capacity],
                head: 0,
                len: 0,
            }),
            capacity,
            overflows: AtomicUsize::new(0),
        }
    }

    /// Append `samples`, or reject the whole slice if it does not fit.
    /// Returns whether the write was accepted.
    pub fn write(&self, samples: &[T]) -> bool {
        let mut ring = self.ring.lock();
        if samples.len() > self.capacity - ring.len {
            drop(ring);
            self.overflows.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let capacity = self.capacity;
        let mut tail = (ring.head + ring.len) % capacity;
        for &sample in samples {
            ring.slots[tail] = sample;
            tail = (tail + 1) % capacity;
        }
        ring.len += samples.len();
        true
    }

    /// Remove up to `out.len()` samples into `out`, returning how many were
    /// copied. Never blocks and never waits for more data.
    pub fn read_into(&self, out: &mut [T]) -> usize {
        let mut ring = self.ring.lock();
        let count = out.len().min(ring.len);
        let capacity = self.capacity;
        for slot in out.iter_mut().take(count) {
            *slot = ring.slots[ring.head];
            ring.head = (ring.head + 1) % capacity;
        }
        ring.len -= count;
        count
    }

    /// Remove and return up to `count` samples. Allocates; intended for
    /// worker threads, not audio callbacks.
    pub fn read(&self, count: usize) -> Vec<T> {
        let mut out = vec![T::default(); count];
        let got = self.read_into(&mut out);
        out.truncate(got);
        out
    }

    /// Samples currently buffered
    pub fn available(&self) -> usize {
        self.ring.lock().len
    }

    /// Maximum sample count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of rejected writes
    pub fn overflows(&self) -> usize {
        self.overflows.load(Ordering::Relaxed)
    }

    /// Discard all buffered samples
    pub fn clear(&self) {
        let mut ring = self.ring.lock();
        ring.head = 0;
        ring.len = 0;
    }
}
