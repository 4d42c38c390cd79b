//! Shared functionality for the ring queues
//!
//! This module provides the configuration record, the operation trait both
//! rings implement, and the machine-word atomic cell used for payloads.

use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Memory ordering constants for atomic operations
///
/// These are aliases to the standard library's Ordering values to keep the
/// queue code close to the shorthand used in the protocol descriptions.
pub mod ordering {
    pub use std::sync::atomic::Ordering::AcqRel as AR;
    pub use std::sync::atomic::Ordering::Acquire as A;
    pub use std::sync::atomic::Ordering::Relaxed as X;
    pub use std::sync::atomic::Ordering::Release as R;
}

/// Configuration for queue construction.
///
/// The only recognized option is `max_size`, the desired capacity hint for
/// the runtime-sized ring. The MPMC ring takes its capacity as a
/// compile-time constant and ignores this record.
#[derive(Clone, Copy, Debug)]
pub struct QueueOpts {
    max_size: usize,
}

impl QueueOpts {
    /// Desired capacity hint. Rounded up to a power of two by the queue.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Sets the capacity hint, returning the updated options for chaining.
    pub fn set_max_size(mut self, val: usize) -> Self {
        self.max_size = val;
        self
    }
}

impl Default for QueueOpts {
    fn default() -> Self {
        // One assumed destructive-interference span worth of slots.
        Self { max_size: 128 }
    }
}

/// Operations common to both ring queues.
///
/// Blocking `push`/`pop` exist only on the MPMC ring and are inherent
/// methods there; the single-consumer ring deliberately has no suspending
/// operations.
pub trait QueueOps<T> {
    /// Attempts to enqueue an element.
    ///
    /// Returns false if the queue was observed full at some point during
    /// the call.
    fn try_push(&self, element: T) -> bool;

    /// Attempts to dequeue an element.
    ///
    /// Returns None if the queue was observed empty at some point during
    /// the call.
    fn try_pop(&self) -> Option<T>;

    /// Best-effort number of elements currently queued.
    ///
    /// Racy by nature: the value may transiently over-report but is never
    /// negative.
    fn size(&self) -> usize;

    /// Fixed capacity of the queue.
    fn capacity(&self) -> usize;
}

/// Wrapper for accessing elements atomically
///
/// Payloads are held as their raw bits inside a machine word, zero-padded
/// when the element is narrower than the word.
#[repr(transparent)]
pub(crate) struct AtomicValue<T> {
    value: AtomicUsize,
    _marker: PhantomData<T>,
}

impl<T: crate::Element> AtomicValue<T> {
    /// Creates a new cell holding the zero pattern
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            value: AtomicUsize::new(0),
            _marker: PhantomData,
        }
    }

    #[inline]
    fn to_raw(value: T) -> usize {
        let mut raw = 0usize;
        unsafe {
            ptr::copy_nonoverlapping(
                &value as *const T as *const u8,
                &mut raw as *mut usize as *mut u8,
                mem::size_of::<T>(),
            );
        }
        raw
    }

    #[inline]
    fn from_raw(raw: usize) -> T {
        unsafe { mem::transmute_copy(&raw) }
    }

    /// Loads the atomic value
    #[inline]
    pub(crate) fn load(&self, order: Ordering) -> T {
        Self::from_raw(self.value.load(order))
    }

    /// Stores a value into the atomic
    #[inline]
    pub(crate) fn store(&self, value: T, order: Ordering) {
        self.value.store(Self::to_raw(value), order);
    }

    /// Atomically exchanges a value
    #[inline]
    pub(crate) fn swap(&self, value: T, order: Ordering) -> T {
        Self::from_raw(self.value.swap(Self::to_raw(value), order))
    }

    /// Atomically compares and exchanges a value
    #[inline]
    pub(crate) fn compare_exchange_weak(
        &self,
        current: T,
        new: T,
        success: Ordering,
        failure: Ordering,
    ) -> Result<T, T> {
        match self.value.compare_exchange_weak(
            Self::to_raw(current),
            Self::to_raw(new),
            success,
            failure,
        ) {
            Ok(raw) => Ok(Self::from_raw(raw)),
            Err(raw) => Err(Self::from_raw(raw)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opts_default_and_chaining() {
        assert_eq!(QueueOpts::default().max_size(), 128);
        assert_eq!(QueueOpts::default().set_max_size(8).max_size(), 8);
    }

    #[test]
    fn atomic_value_round_trip() {
        let cell = AtomicValue::<u32>::new();
        assert_eq!(cell.load(ordering::A), 0);

        cell.store(7, ordering::R);
        assert_eq!(cell.load(ordering::A), 7);

        assert_eq!(cell.swap(9, ordering::AR), 7);
        assert_eq!(cell.load(ordering::A), 9);
    }

    #[test]
    fn atomic_value_compare_exchange() {
        let cell = AtomicValue::<u64>::new();

        // Weak CAS may fail spuriously, so retry as callers do.
        while cell.compare_exchange_weak(0, 5, ordering::R, ordering::X).is_err() {}
        assert_eq!(cell.load(ordering::A), 5);

        assert!(matches!(
            cell.compare_exchange_weak(0, 6, ordering::R, ordering::X),
            Err(5)
        ));
    }

    #[test]
    fn narrow_elements_zero_pad() {
        let cell = AtomicValue::<u8>::new();
        cell.store(0xAB, ordering::R);
        assert_eq!(cell.load(ordering::A), 0xAB);
        assert_eq!(cell.swap(0, ordering::AR), 0xAB);
        assert_eq!(cell.load(ordering::A), 0);
    }
}
