//! Retry-site spin hint for the blocking wrappers (`shootdown`, `sync(p)`).

/// Hints to the CPU that this thread is in a busy-wait spin, matching the
/// teacher crate's `SpinLock`/`SeqLock` retry loops.
#[inline]
pub fn spin_hint() {
    #[cfg(loom)]
    loom::thread::yield_now();
    #[cfg(all(shuttle, not(loom)))]
    shuttle::thread::yield_now();
    #[cfg(not(any(loom, shuttle)))]
    core::hint::spin_loop();
}
