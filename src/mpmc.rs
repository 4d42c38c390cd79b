//! Multi-producer/multi-consumer tagged-ticket ring
//!
//! Every operation first claims a monotonically increasing tag by
//! fetch-add on the head or tail counter, then rendezvouses with its
//! counterparty on the ring slot the tag indexes. The slot's tag word
//! encodes role, waiter flag, and sequence in 64 bits; pairing a claim
//! with the counterparty tag exactly one lap behind makes ABA reuse of a
//! slot impossible. Blocking operations suspend with a futex-style wait on
//! the slot tag itself, so a hand-off wakes only the threads parked on
//! that slot.

use std::fmt;
use std::mem;
use std::sync::atomic::{fence, AtomicU64};

use crossbeam_utils::CachePadded;

use crate::common::{ordering, AtomicValue, QueueOps};
use crate::wait;
use crate::Element;

/// Consumer role flag: set when the tag belongs to a dequeue claim, or
/// when a dequeued slot awaits the producer one lap ahead.
const CONSUMER_FLAG: u64 = 1 << 63;
/// Set by a thread about to block on the slot; cleared by every hand-off.
const WAITING_FLAG: u64 = 1 << 62;

/// 64-bit claim token: flag bits 62..63, sequence in bits 0..61.
///
/// The low `log2(CAP)` bits of the sequence index the ring.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Tag<const CAP: usize>(u64);

impl<const CAP: usize> Tag<CAP> {
    /// One lap of the ring, in tag units.
    const WRAP_DELTA: u64 = CAP as u64;
    const INDEX_MASK: u64 = CAP as u64 - 1;

    #[inline]
    fn new(raw: u64) -> Self {
        Tag(raw)
    }

    #[inline]
    fn raw(self) -> u64 {
        self.0
    }

    #[inline]
    fn next(self) -> Self {
        Tag(self.0.wrapping_add(1))
    }

    #[inline]
    fn prev(self) -> Self {
        Tag(self.0.wrapping_sub(1))
    }

    #[inline]
    fn seq(self) -> u64 {
        (self.0 << 2) >> 2
    }

    /// The tag the counterparty must have left in the slot for this claim
    /// to proceed: same index, role inverted, exactly one lap back for a
    /// producer claim.
    #[inline]
    fn prev_paired(self) -> Self {
        if self.is_consumer() {
            Tag((self.0 ^ CONSUMER_FLAG) & !WAITING_FLAG)
        } else {
            Tag((self.0.wrapping_sub(Self::WRAP_DELTA) ^ CONSUMER_FLAG) & !WAITING_FLAG)
        }
    }

    #[inline]
    fn is_paired(self, observed: Self) -> bool {
        self.prev_paired().0 == observed.0 & !WAITING_FLAG
    }

    #[inline]
    fn is_producer(self) -> bool {
        self.0 & CONSUMER_FLAG == 0
    }

    #[inline]
    fn is_consumer(self) -> bool {
        self.0 & CONSUMER_FLAG != 0
    }

    #[inline]
    fn as_consumer(self) -> Self {
        Tag(self.0 | CONSUMER_FLAG)
    }

    #[inline]
    fn is_waiting(self) -> bool {
        self.0 & WAITING_FLAG != 0
    }

    #[inline]
    fn as_waiting(self) -> Self {
        Tag(self.0 | WAITING_FLAG)
    }

    #[inline]
    fn index(self) -> usize {
        (self.0 & Self::INDEX_MASK) as usize
    }
}

impl<const CAP: usize> fmt::Debug for Tag<CAP> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tag<{}{}>{{{}@{}}}",
            if self.is_producer() { "P" } else { "C" },
            if self.is_waiting() { "|W" } else { "" },
            self.seq(),
            self.index()
        )
    }
}

/// One ring cell: the claim tag next to the payload word.
///
/// The payload is published first and the tag release-swapped after, so a
/// claim that observes its paired tag also observes the payload; the pair
/// behaves like a single 128-bit exchange without requiring one.
struct Slot<T: Element> {
    tag: AtomicU64,
    value: AtomicValue<T>,
}

/// Bounded multi-producer/multi-consumer queue with FIFO hand-off in
/// claim order.
///
/// `CAP` is the compile-time capacity and must be a power of two.
/// Blocking `push`/`pop` never fail; `try_push`/`try_pop` report a full or
/// empty ring instead of suspending.
pub struct MpmcQueue<T: Element, const CAP: usize> {
    head: CachePadded<AtomicU64>,
    tail: CachePadded<AtomicU64>,
    buffer: CachePadded<Box<[Slot<T>]>>,
}

impl<T: Element, const CAP: usize> MpmcQueue<T, CAP> {
    /// Creates a new empty queue. Panics if `CAP` is not a power of two or
    /// `T` does not fit in a machine word.
    pub fn new() -> Self {
        assert!(CAP.is_power_of_two(), "capacity must be a power of two");
        assert!(
            mem::size_of::<T>() <= mem::size_of::<usize>(),
            "elements must fit in a machine word"
        );

        let mut buffer = Vec::with_capacity(CAP);
        for i in 0..CAP {
            // Slot i starts one lap behind, awaiting the first producer.
            buffer.push(Slot {
                tag: AtomicU64::new(i as u64 | CONSUMER_FLAG),
                value: AtomicValue::new(),
            });
        }

        let queue = Self {
            // Counters start one full lap in so the first claims pair with
            // the seeded tags without underflow.
            head: CachePadded::new(AtomicU64::new(Tag::<CAP>::WRAP_DELTA)),
            tail: CachePadded::new(AtomicU64::new(Tag::<CAP>::WRAP_DELTA)),
            buffer: CachePadded::new(buffer.into_boxed_slice()),
        };

        // Publish the seeded tags before any operation can run.
        fence(ordering::R);
        queue
    }

    /// Enqueues `value`, blocking until a slot hands over.
    pub fn push(&self, value: T) {
        let tag = Tag::<CAP>::new(self.tail.fetch_add(1, ordering::AR));
        self.write_slot(value, tag);
    }

    /// Attempts to enqueue without blocking.
    ///
    /// Returns false if the ring was observed full.
    pub fn try_push(&self, value: T) -> bool {
        let head = Tag::<CAP>::new(self.head.load(ordering::A));

        let mut expected_tail = head;
        let mut desired_tail = expected_tail.next();

        while let Err(actual) = self.tail.compare_exchange_weak(
            expected_tail.raw(),
            desired_tail.raw(),
            ordering::R,
            ordering::X,
        ) {
            expected_tail = Tag::new(actual);
            desired_tail = expected_tail.next();
            // The claim is expected_tail, so the last fillable one sits at
            // head + CAP - 1; reject only past that.
            if desired_tail.raw() > head.raw().wrapping_add(Tag::<CAP>::WRAP_DELTA) {
                return false;
            }
        }

        self.write_slot(value, expected_tail);
        true
    }

    /// Dequeues the next element, blocking until one is published.
    pub fn pop(&self) -> T {
        let tag = Tag::<CAP>::new(self.head.fetch_add(1, ordering::AR)).as_consumer();
        self.read_slot(tag)
    }

    /// Attempts to dequeue without blocking.
    ///
    /// Returns None if the ring was observed empty.
    pub fn try_pop(&self) -> Option<T> {
        let tail = Tag::<CAP>::new(self.tail.load(ordering::A));

        let mut desired_head = tail;
        let mut expected_head = desired_head.prev();

        while let Err(actual) = self.head.compare_exchange_weak(
            expected_head.raw(),
            desired_head.raw(),
            ordering::R,
            ordering::X,
        ) {
            expected_head = Tag::new(actual);
            desired_head = expected_head.next();
            if desired_head > tail {
                return None;
            }
        }

        Some(self.read_slot(expected_head.as_consumer()))
    }

    /// Best-effort element count.
    pub fn size(&self) -> usize {
        // Reading head before tail can transiently "see" more elements
        // than the ring holds, but the count never goes negative. A
        // consumer parked on an empty ring holds head past tail, so the
        // difference saturates rather than underflowing.
        let head = self.head.load(ordering::A);
        let tail = self.tail.load(ordering::A);
        tail.saturating_sub(head) as usize
    }

    /// Fixed capacity of the ring.
    pub const fn capacity(&self) -> usize {
        CAP
    }

    fn write_slot(&self, value: T, tag: Tag<CAP>) {
        debug_assert!(tag.is_producer());
        debug_assert!(!tag.is_waiting());

        let slot = &self.buffer[tag.index()];
        loop {
            let observed = Tag::new(slot.tag.load(ordering::A));
            if tag.is_paired(observed) {
                break;
            }
            Self::wait_for_turn(slot, tag, observed);
        }

        // Sole owner of the slot until the tag swap publishes it; the
        // release swap carries the payload store with it.
        slot.value.store(value, ordering::X);
        let prior = Tag::<CAP>::new(slot.tag.swap(tag.raw(), ordering::AR));
        if prior.is_waiting() {
            wait::wake_all(&slot.tag);
        }
    }

    fn read_slot(&self, tag: Tag<CAP>) -> T {
        debug_assert!(tag.is_consumer());
        debug_assert!(!tag.is_waiting());

        let slot = &self.buffer[tag.index()];
        loop {
            let observed = Tag::new(slot.tag.load(ordering::A));
            if tag.is_paired(observed) {
                break;
            }
            Self::wait_for_turn(slot, tag, observed);
        }

        let value = slot.value.load(ordering::X);
        // Leave the slot zeroed, awaiting the producer one lap ahead.
        slot.value.store(T::default(), ordering::X);
        let prior = Tag::<CAP>::new(slot.tag.swap(tag.raw(), ordering::AR));
        if prior.is_waiting() {
            wait::wake_all(&slot.tag);
        }
        value
    }

    /// Marks the slot tag with the waiter flag and suspends until the slot
    /// changes, re-checking the pairing whenever the flag CAS loses a race.
    fn wait_for_turn(slot: &Slot<T>, claimed: Tag<CAP>, mut observed: Tag<CAP>) {
        loop {
            let want = observed.as_waiting();
            let armed = observed == want
                || match slot.tag.compare_exchange_weak(
                    observed.raw(),
                    want.raw(),
                    ordering::R,
                    ordering::X,
                ) {
                    Ok(_) => true,
                    Err(actual) => {
                        observed = Tag::new(actual);
                        false
                    }
                };

            if armed {
                wait::wait(&slot.tag, want.raw());
                return;
            }

            if claimed.is_paired(observed) {
                return;
            }
        }
    }
}

impl<T: Element, const CAP: usize> QueueOps<T> for MpmcQueue<T, CAP> {
    fn try_push(&self, element: T) -> bool {
        MpmcQueue::try_push(self, element)
    }

    fn try_pop(&self) -> Option<T> {
        MpmcQueue::try_pop(self)
    }

    fn size(&self) -> usize {
        MpmcQueue::size(self)
    }

    fn capacity(&self) -> usize {
        CAP
    }
}

impl<T: Element, const CAP: usize> Default for MpmcQueue<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Element, const CAP: usize> Drop for MpmcQueue<T, CAP> {
    fn drop(&mut self) {
        // Drain so element teardown runs exactly once per queued value.
        while self.try_pop().is_some() {}
    }
}
