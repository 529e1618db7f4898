//! Host-testable synchronization shims.
//!
//! [`atomic`] re-exports either `core::sync::atomic` or, under `cfg(loom)`,
//! `loom`'s shadow atomics, so the engine can be model-checked under loom's
//! exhaustive interleaving scheduler without any `#[cfg]` noise at call
//! sites.

pub mod atomic;
pub mod backoff;
