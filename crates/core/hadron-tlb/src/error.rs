//! Error types. No physical page was ever acquirable for refcounted linkage
//! (see [`ConfigError`] for the fatal, init-time-only counterpart).

/// `init` was given an invalid region description. Fatal: there is no
/// sensible way to continue, so `Tlb::init` panics with this as context
/// rather than returning it to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A region's size is zero.
    ZeroSize,
    /// A region's size is not a multiple of [`crate::PAGE_SIZE`].
    SizeNotPageMultiple,
    /// A region's base address is not page-aligned.
    BaseNotPageAligned,
    /// A region's base address is null.
    BaseIsNull,
}

/// No physical page could be acquired, even after a full eviction sweep.
///
/// Recoverable: the `Tlb`'s state is unchanged. Callers typically drop
/// outstanding mappings and retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoPageFound;
