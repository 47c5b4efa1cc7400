//! Event ring (ER, §4.6).
//!
//! A bounded single-producer/single-consumer ring of fixed-size records,
//! modeled after the host crate's perf mmap ring
//! ([`crate::count`]'s sibling `sample::rb::Rb`, not carried into this
//! crate — see DESIGN.md): a power-of-two slot count, atomic head/tail with
//! acquire/release ordering, and a lending-style pop on the consumer side.
//! Unlike a perf ring, records here are fixed-size, so there is no variable
//! chunk-length header to parse.
//!
//! Reservation on the producer side is lock-free and never blocks: if the
//! ring is full the record is dropped and the caller logs a warning (§7).
//! A dropped record must never corrupt engine state — `before_idle`,
//! `after_idle` and `interrupt` never observe the ring at all.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::record::Record;

/// Minimum capacity required by §4.6; enforced by [`EventRing::new`].
pub const MIN_CAPACITY: usize = 4096;

/// Bounded SPSC ring of [`Record`]s.
///
/// The producer (the pinned target CPU, inside [`crate::tracer`]) calls
/// [`push`][EventRing::push]; the consumer (user-space) calls
/// [`pop`][EventRing::pop]. Capacity must be a power of two so slot
/// indexing is a mask instead of a modulo.
pub struct EventRing {
    slots: Box<[Option<Record>]>,
    mask: usize,
    head: AtomicUsize, // next slot the producer will write
    tail: AtomicUsize, // next slot the consumer will read
    drops: AtomicUsize,
}

impl EventRing {
    /// Creates a ring with room for at least `MIN_CAPACITY` records.
    /// `capacity` is rounded up to the next power of two.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(MIN_CAPACITY).next_power_of_two();
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            drops: AtomicUsize::new(0),
        }
    }

    /// Attempts to publish `record`. Returns `false` (and bumps the drop
    /// counter) if the ring is full; the caller is expected to log a warn
    /// and continue — §7's "ring overflow" is non-fatal by design.
    pub fn push(&mut self, record: Record) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);

        if head.wrapping_sub(tail) > self.mask {
            self.drops.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        self.slots[head & self.mask] = Some(record);
        // Release publish: any consumer that acquires `head` after this
        // store observes a fully-initialized record (§5 "Ordering").
        self.head.store(head.wrapping_add(1), Ordering::Release);
        true
    }

    /// Pops the oldest unread record, or `None` if the ring is empty.
    pub fn pop(&mut self) -> Option<Record> {
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);

        if tail == head {
            return None;
        }

        let record = self.slots[tail & self.mask].take();
        self.tail.store(tail.wrapping_add(1), Ordering::Release);
        record
    }

    /// Number of records dropped to date because the ring was full.
    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::Relaxed)
    }

    /// Number of records currently buffered.
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.mask + 1
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::Datapoint;

    fn data(ldist: u64) -> Record {
        Record::Data(Datapoint {
            silent_time: 0,
            wake_latency: 0,
            intr_latency: 0,
            ldist,
            req_cstate: 1,
            tsc_cycles: 0,
            mperf_cycles: 0,
            cc_cycles: vec![],
            smi_wake: 0,
            nmi_wake: 0,
            smi_intr: 0,
            nmi_intr: 0,
            drv_fields: vec![],
        })
    }

    #[test]
    fn fifo_order_is_preserved() {
        let mut ring = EventRing::new(8);
        for i in 0..5 {
            assert!(ring.push(data(i)));
        }
        for i in 0..5 {
            match ring.pop().unwrap() {
                Record::Data(dp) => assert_eq!(dp.ldist, i),
                Record::Ping => panic!("expected data"),
            }
        }
        assert!(ring.pop().is_none());
    }

    #[test]
    fn capacity_is_rounded_up_and_at_least_min() {
        let ring = EventRing::new(10);
        assert_eq!(ring.capacity(), MIN_CAPACITY);
        let ring = EventRing::new(5000);
        assert_eq!(ring.capacity(), 8192);
    }

    #[test]
    fn overflow_drops_and_counts_without_corrupting_state() {
        let mut ring = EventRing::new(MIN_CAPACITY);
        for i in 0..MIN_CAPACITY as u64 {
            assert!(ring.push(data(i)));
        }
        assert!(!ring.push(data(999)));
        assert_eq!(ring.drops(), 1);

        // The next successful record, after draining one slot, is intact.
        ring.pop().unwrap();
        assert!(ring.push(data(1000)));
        assert_eq!(ring.len(), MIN_CAPACITY);
    }
}
