//! Region description and the transfer callback contract.

use crate::error::ConfigError;
use crate::page::PAGE_SIZE;

/// Copies `n` bytes from `src` to `dst`. Must not fail; `n` is always
/// exactly [`PAGE_SIZE`].
pub type TransferFn = fn(dst: *mut u8, src: *const u8, n: usize);

/// Immutable region description, captured once at [`crate::Tlb::init`].
pub(crate) struct Config {
    pub translator_base: *mut u8,
    pub translatee_base: *mut u8,
    pub virtual_to_physical: TransferFn,
    pub physical_to_virtual: TransferFn,
}

// SAFETY: the base pointers reference caller-owned buffers that outlive the
// `Tlb`; the function pointers are plain `fn` items.
unsafe impl Send for Config {}
// SAFETY: `Config` is never mutated after construction.
unsafe impl Sync for Config {}

pub(crate) fn validate_region(base: *mut u8, size: usize) -> Result<(), ConfigError> {
    if size == 0 {
        return Err(ConfigError::ZeroSize);
    }
    if size % PAGE_SIZE != 0 {
        return Err(ConfigError::SizeNotPageMultiple);
    }
    if base.is_null() {
        return Err(ConfigError::BaseIsNull);
    }
    if (base as usize) % PAGE_SIZE != 0 {
        return Err(ConfigError::BaseNotPageAligned);
    }
    Ok(())
}
