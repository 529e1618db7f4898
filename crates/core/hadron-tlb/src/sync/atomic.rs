//! Swaps in loom's or shuttle's shadow atomics under `cfg(loom)`/`cfg(shuttle)`,
//! `core`'s otherwise.
//!
//! Mirrors `hadron-core`'s `sync::loom_compat` shim so the same engine code
//! runs unmodified under loom's exhaustive scheduler, under shuttle's
//! randomized scheduler, and under normal compilation.

#[cfg(loom)]
pub use loom::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

#[cfg(all(shuttle, not(loom)))]
pub use shuttle::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};

#[cfg(not(any(loom, shuttle)))]
pub use core::sync::atomic::{fence, AtomicBool, AtomicU32, Ordering};
