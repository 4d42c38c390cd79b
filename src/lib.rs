//! # ring_queues
//!
//! Bounded, lock-free, in-process queues for worker-pool style task
//! dispatch: a multi-producer/multi-consumer ring ([`MpmcQueue`]) and a
//! lighter multi-producer/single-consumer ring ([`MpscQueue`]).
//!
//! Both queues are fixed-size rings coordinated purely by atomic
//! operations. The MPMC ring issues monotonic claim tags by fetch-add and
//! rendezvouses on a per-slot tag word; its blocking operations suspend
//! with a futex-style wait on that word. The MPSC ring packs head and tail
//! into a single 64-bit word and reserves the all-zero element value as
//! its empty sentinel.

mod arch;
mod common;
mod wait;

pub mod mpmc;
pub mod mpsc;

// Re-exports for convenience
pub use common::{QueueOps, QueueOpts};
pub use mpmc::MpmcQueue;
pub use mpsc::MpscQueue;

/// Trait for elements that can be stored in either queue.
///
/// Elements must be trivially copyable, no larger than a machine word, and
/// representable inside an always-lock-free atomic. Queue constructors
/// assert the size bound.
pub trait Element: Copy + Default + PartialEq + Send + Sync + 'static {}

/// Trait for elements usable with [`MpscQueue`].
///
/// The `Default` value of the type is the reserved empty sentinel: a slot
/// holding it is free, so producers must never enqueue it. Pushing the
/// sentinel is a contract violation caught by a debug assertion.
pub trait ZeroableElement: Element {}

// Implement the element traits for common primitive types
macro_rules! impl_element {
    ($($t:ty),*) => {
        $(
            impl Element for $t {}
            impl ZeroableElement for $t {}
        )*
    };
}

impl_element!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_trait_sanity() {
        fn is_element<T: Element>() -> bool {
            true
        }
        fn is_zeroable<T: ZeroableElement>() -> bool {
            true
        }

        assert!(is_element::<u32>());
        assert!(is_element::<i64>());
        assert!(is_zeroable::<u64>());
        assert!(is_zeroable::<usize>());
    }
}
