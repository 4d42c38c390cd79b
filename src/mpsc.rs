//! Multi-producer/single-consumer packed-index ring
//!
//! Head and tail share a single 64-bit word (low half head, high half
//! tail), so empty, full, and size checks are one atomic load and every
//! index advance is one CAS. Slots carry no per-slot tag: the all-zero
//! element value marks a free cell, which is why producers must never
//! enqueue the zero value. One slot is reserved to tell a full ring from
//! an empty one, so the usable capacity is the buffer size minus one.
//!
//! With more than one concurrent consumer no items are lost, but dequeue
//! order is no longer guaranteed; single-consumer use is the caller's
//! contract.

use std::mem;
use std::sync::atomic::AtomicU64;

use crossbeam_utils::CachePadded;

use crate::arch::{round_up_to_power_of_2, spin_loop_pause};
use crate::common::{ordering, AtomicValue, QueueOps, QueueOpts};
use crate::ZeroableElement;

#[inline]
const fn pack(head: u32, tail: u32) -> u64 {
    (head as u64) | ((tail as u64) << 32)
}

#[inline]
const fn head_of(line: u64) -> u32 {
    line as u32
}

#[inline]
const fn tail_of(line: u64) -> u32 {
    (line >> 32) as u32
}

#[inline]
const fn size_of_line(line: u64, buf_size: usize) -> usize {
    let head = head_of(line) as usize;
    let mut tail = tail_of(line) as usize;
    if tail < head {
        tail += buf_size;
    }
    tail - head
}

/// Bounded multi-producer/single-consumer queue.
///
/// Capacity is fixed at construction from [`QueueOpts::max_size`], rounded
/// up to the next power of two; one slot stays reserved, so `capacity()`
/// reports the rounded size minus one. There are no blocking operations:
/// both paths are spin-on-CAS.
pub struct MpscQueue<T: ZeroableElement> {
    /// Packed head/tail word, alone on its cache line.
    ht: CachePadded<AtomicU64>,
    buffer: CachePadded<Box<[AtomicValue<T>]>>,
}

impl<T: ZeroableElement> MpscQueue<T> {
    /// Creates a new empty queue.
    ///
    /// Panics if the capacity hint rounds down to an unusable ring or `T`
    /// does not fit in a machine word.
    pub fn new(opts: QueueOpts) -> Self {
        assert!(
            mem::size_of::<T>() <= mem::size_of::<usize>(),
            "elements must fit in a machine word"
        );

        let buf_size = round_up_to_power_of_2(opts.max_size());
        let mut buffer = Vec::with_capacity(buf_size);
        for _ in 0..buf_size {
            buffer.push(AtomicValue::new());
        }

        let queue = Self {
            ht: CachePadded::new(AtomicU64::new(pack(0, 0))),
            buffer: CachePadded::new(buffer.into_boxed_slice()),
        };
        assert!(queue.capacity() > 0, "max_size hint too small");
        queue
    }

    /// Attempts to enqueue without blocking.
    ///
    /// Returns false if the ring was observed full. `value` must not be
    /// the zero sentinel.
    pub fn try_push(&self, value: T) -> bool {
        self.try_push_counted(value).is_ok()
    }

    /// Attempts to enqueue, additionally reporting the element count.
    ///
    /// On success returns the number of items in the queue just after this
    /// push; on a full ring returns the observed count (the capacity) as
    /// the error.
    pub fn try_push_counted(&self, value: T) -> Result<usize, usize> {
        debug_assert!(
            value != T::default(),
            "the zero value is reserved as the empty sentinel"
        );

        let buf_size = self.buffer.len();
        let mut line = self.ht.load(ordering::A);
        let (claimed, num_items) = loop {
            let s = size_of_line(line, buf_size);
            if s == self.capacity() {
                return Err(s);
            }

            let head = head_of(line);
            let tail = tail_of(line);
            let next_tail = if tail as usize == buf_size - 1 { 0 } else { tail + 1 };

            match self.ht.compare_exchange_weak(
                line,
                pack(head, next_tail),
                ordering::R,
                ordering::X,
            ) {
                Ok(_) => break (tail, s + 1),
                Err(actual) => line = actual,
            }
        };

        // A pop may have claimed this index but not yet cleared the cell;
        // the exchange only succeeds once it has.
        let slot = &self.buffer[claimed as usize];
        while slot
            .compare_exchange_weak(T::default(), value, ordering::R, ordering::X)
            .is_err()
        {
            spin_loop_pause();
        }

        Ok(num_items)
    }

    /// Attempts to dequeue without blocking.
    ///
    /// Returns None if the ring was observed empty.
    pub fn try_pop(&self) -> Option<T> {
        let index = self.claim_for_pop()?;

        let slot = &self.buffer[index as usize];
        // A push may have claimed this index but not yet written its
        // value, which leaves us spinning on the sentinel.
        loop {
            let value = slot.swap(T::default(), ordering::AR);
            if value != T::default() {
                return Some(value);
            }
            spin_loop_pause();
        }
    }

    /// Best-effort element count.
    pub fn size(&self) -> usize {
        size_of_line(self.ht.load(ordering::A), self.buffer.len())
    }

    /// Usable capacity of the ring.
    pub fn capacity(&self) -> usize {
        self.buffer.len() - 1
    }

    /// Advances head by one, returning the claimed index, or None when the
    /// ring is empty.
    fn claim_for_pop(&self) -> Option<u32> {
        loop {
            let line = self.ht.load(ordering::A);
            if size_of_line(line, self.buffer.len()) == 0 {
                return None;
            }

            let mut head = head_of(line) as usize + 1;
            let tail = tail_of(line);
            if head >= self.buffer.len() {
                head -= self.buffer.len();
            }

            if self
                .ht
                .compare_exchange_weak(line, pack(head as u32, tail), ordering::R, ordering::X)
                .is_ok()
            {
                return Some(head_of(line));
            }
        }
    }
}

impl<T: ZeroableElement> QueueOps<T> for MpscQueue<T> {
    fn try_push(&self, element: T) -> bool {
        MpscQueue::try_push(self, element)
    }

    fn try_pop(&self) -> Option<T> {
        MpscQueue::try_pop(self)
    }

    fn size(&self) -> usize {
        MpscQueue::size(self)
    }

    fn capacity(&self) -> usize {
        MpscQueue::capacity(self)
    }
}

impl<T: ZeroableElement> Drop for MpscQueue<T> {
    fn drop(&mut self) {
        // Drain so element teardown runs exactly once per queued value.
        while self.try_pop().is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trip() {
        let line = pack(3, 250);
        assert_eq!(head_of(line), 3);
        assert_eq!(tail_of(line), 250);
    }

    #[test]
    fn size_handles_wrapped_tail() {
        assert_eq!(size_of_line(pack(0, 0), 8), 0);
        assert_eq!(size_of_line(pack(0, 5), 8), 5);
        // Tail wrapped past the end of the buffer.
        assert_eq!(size_of_line(pack(6, 2), 8), 4);
        assert_eq!(size_of_line(pack(7, 6), 8), 7);
    }

    #[test]
    fn capacity_rounds_up_and_reserves_one() {
        let q = MpscQueue::<u32>::new(QueueOpts::default().set_max_size(5));
        assert_eq!(q.capacity(), 7);

        let q = MpscQueue::<u32>::new(QueueOpts::default().set_max_size(8));
        assert_eq!(q.capacity(), 7);
    }

    #[test]
    fn fifo_order_single_consumer() {
        let q = MpscQueue::<u32>::new(QueueOpts::default().set_max_size(16));

        for i in 1..=10 {
            assert!(q.try_push(i));
        }
        assert_eq!(q.size(), 10);

        for i in 1..=10 {
            assert_eq!(q.try_pop(), Some(i));
        }
        assert_eq!(q.try_pop(), None);
    }

    #[test]
    fn counted_push_reports_post_operation_size() {
        let q = MpscQueue::<u32>::new(QueueOpts::default().set_max_size(4));
        assert_eq!(q.capacity(), 3);

        assert_eq!(q.try_push_counted(10), Ok(1));
        assert_eq!(q.try_push_counted(20), Ok(2));
        assert_eq!(q.try_push_counted(30), Ok(3));
        assert_eq!(q.try_push_counted(40), Err(3));
    }

    #[test]
    #[should_panic(expected = "empty sentinel")]
    fn zero_push_is_a_contract_violation() {
        let q = MpscQueue::<u32>::new(QueueOpts::default().set_max_size(8));
        q.try_push(0);
    }
}
