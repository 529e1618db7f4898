//! Lock-free software-managed TLB with flush-on-capacity semantics.
//!
//! A [`Tlb`] maps a large *translator* (virtual) byte range onto a small pool
//! of *translatee* (physical) pages, moving page contents between the two
//! with caller-supplied transfer callbacks. All coordination is lock-free:
//! acquiring a physical page, linking it to a virtual page, bumping and
//! dropping reference counts, and evicting under capacity pressure are all
//! expressed as atomic state transitions over a packed descriptor word.
//!
//! Host-testable: compiles against `std` under `cfg(test)` and is exercised
//! with `loom` and real OS threads in the integration test suite.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

mod config;
mod engine;
mod error;
mod page;
mod sync;
mod tlb;

pub use config::TransferFn;
pub use error::NoPageFound;
pub use page::PAGE_SIZE;
pub use tlb::Tlb;
