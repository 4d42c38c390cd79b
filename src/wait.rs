//! Futex-style suspension on a 64-bit tag word
//!
//! OS word-wait facilities operate on 32-bit words, so waits are keyed to
//! the upper half of the tag, where the role and waiter flags live. A
//! thread only ever sleeps on a waiter-marked tag value, and every slot
//! hand-off swaps in a tag with the waiter flag clear, which means the
//! 32-bit compare alone is enough to catch a transition that raced the
//! sleep; explicit wake-alls cover threads already parked.

use std::sync::atomic::{AtomicU32, AtomicU64};

#[cfg(target_endian = "little")]
const FLAG_HALF: usize = 1;
#[cfg(target_endian = "big")]
const FLAG_HALF: usize = 0;

#[inline]
fn flag_half(word: &AtomicU64) -> &AtomicU32 {
    // An AtomicU64 is 8-byte aligned, so either half satisfies the 4-byte
    // alignment the wait syscall requires.
    unsafe { &*(word as *const AtomicU64 as *const AtomicU32).add(FLAG_HALF) }
}

/// Blocks the calling thread while the upper half of `word` still holds
/// the upper half of `expected`. Returns on wake or spuriously.
#[inline]
pub(crate) fn wait(word: &AtomicU64, expected: u64) {
    atomic_wait::wait(flag_half(word), (expected >> 32) as u32);
}

/// Wakes every thread blocked on `word`.
#[inline]
pub(crate) fn wake_all(word: &AtomicU64) {
    atomic_wait::wake_all(flag_half(word));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn wait_returns_immediately_on_mismatch() {
        let word = AtomicU64::new(1 << 62);
        // Expected upper half differs from the stored one, so this must
        // not block.
        wait(&word, 0);
    }

    #[test]
    fn wake_all_releases_a_waiter() {
        let word = Arc::new(AtomicU64::new(1 << 62));
        let waiter = {
            let word = Arc::clone(&word);
            thread::spawn(move || {
                while word.load(Ordering::Acquire) == 1 << 62 {
                    wait(&word, 1 << 62);
                }
            })
        };

        thread::sleep(std::time::Duration::from_millis(50));
        word.store(0, Ordering::Release);
        wake_all(&word);
        waiter.join().unwrap();
    }
}
