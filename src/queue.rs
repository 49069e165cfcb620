//! Bounded FIFO queue for compressed audio packets
//!
//! Insertion order is emission order. The queue favors liveness over
//! completeness: a push against a full queue evicts the oldest packet
//! instead of blocking the producer, and a pop against an empty queue waits
//! at most a short timeout instead of deadlocking the consumer.

use bytes::Bytes;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub struct PacketQueue {
    packets: Mutex<VecDeque<Bytes>>,
    not_empty: Condvar,
    capacity: usize,
    dropped: AtomicU64,
}

impl PacketQueue {
    /// Create a queue holding at most `capacity` packets
    pub fn new(capacity: usize) -> Self {
        Self {
            packets: Mutex::new(VecDeque::with_capacity(capacity)),
            not_empty: Condvar::new(),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a packet, evicting the oldest one when full.
    /// Returns false if an eviction happened.
    pub fn push(&self, packet: Bytes) -> bool {
        let evicted = {
            let mut packets = self.packets.lock();
            let evicted = if packets.len() >= self.capacity {
                packets.pop_front().is_some()
            } else {
                false
            };
            packets.push_back(packet);
            self.not_empty.notify_one();
            evicted
        };

        if evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        !evicted
    }

    /// Dequeue the oldest packet, waiting up to `timeout` for one to arrive.
    /// Returns `None` on timeout.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Bytes> {
        let mut packets = self.packets.lock();
        if packets.is_empty() {
            self.not_empty.wait_for(&mut packets, timeout);
        }
        packets.pop_front()
    }

    /// Dequeue without waiting
    pub fn try_pop(&self) -> Option<Bytes> {
        self.packets.lock().pop_front()
    }

    /// Current packet count
    pub fn len(&self) -> usize {
        self.packets.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.lock().is_empty()
    }

    /// Maximum packet count
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Packets evicted by overflow
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Discard all queued packets
    pub fn clear(&self) {
        self.packets.lock().clear();
    }
}
