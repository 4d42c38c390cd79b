//! Architecture-specific helpers
//!
//! CPU pause instructions for spin loops and the power-of-two rounding the
//! runtime-sized ring relies on.

/// Executes a CPU-specific instruction to indicate a spin-wait loop to the CPU
///
/// This helps improve performance in busy-wait loops by:
/// - Potentially reducing power consumption
/// - Avoiding pipeline flushes
/// - Giving priority to other hyper-threads
#[inline(always)]
pub fn spin_loop_pause() {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    unsafe {
        #[cfg(target_arch = "x86")]
        std::arch::x86::_mm_pause();
        #[cfg(target_arch = "x86_64")]
        std::arch::x86_64::_mm_pause();
    }

    #[cfg(any(target_arch = "arm", target_arch = "aarch64"))]
    unsafe {
        #[cfg(target_feature = "v6")]
        std::arch::asm!("yield");
        #[cfg(not(target_feature = "v6"))]
        std::arch::asm!("nop");
    }

    #[cfg(any(target_arch = "powerpc", target_arch = "powerpc64"))]
    unsafe {
        // Lower priority of current thread
        std::arch::asm!("or 31,31,31");
    }

    #[cfg(not(any(
        target_arch = "x86",
        target_arch = "x86_64",
        target_arch = "arm",
        target_arch = "aarch64",
        target_arch = "powerpc",
        target_arch = "powerpc64",
    )))]
    {
        std::hint::spin_loop();
    }
}

/// Returns the next power of 2 greater than or equal to the input value
pub const fn round_up_to_power_of_2(mut n: usize) -> usize {
    if n == 0 {
        return 1;
    }

    n -= 1;
    n |= n >> 1;
    n |= n >> 2;
    n |= n >> 4;
    n |= n >> 8;
    n |= n >> 16;
    #[cfg(target_pointer_width = "64")]
    {
        n |= n >> 32;
    }
    n + 1
}
