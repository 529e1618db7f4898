//! Page descriptors and the packed descriptor word codec.

use crate::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Size in bytes of a single translator/translatee page (1 MiB).
pub const PAGE_SIZE: usize = 1 << 20;

const ID_BITS: u32 = 16;
const REF_BITS: u32 = 16;

const _: () = assert!(ID_BITS + REF_BITS == 32, "descriptor word must be exactly 32 bits wide");

/// Cache line size used to pad descriptors apart, avoiding false sharing
/// between adjacent pages under concurrent access.
const CACHE_LINE_SIZE: usize = 64;

/// No physical page linked.
pub const NULL_STATE: u32 = 0;
/// A transfer is in flight; readers must retry.
pub const TRANSFER_STATE: u32 = u32::MAX;

/// Maximum number of physical pages a single translatee region can back,
/// bounded by the `ID_BITS`-wide index field (minus the `+1` bias and the
/// reserved all-ones [`TRANSFER_STATE`] sentinel).
pub const MAX_PHYSICAL_PAGES: u32 = (1 << ID_BITS) - 2;

/// Packs a physical page index and a reference count into a descriptor word.
///
/// `idx` is biased by one so that `0` is reserved for [`NULL_STATE`].
#[inline]
pub fn make(idx: u32, refcount: u32) -> u32 {
    debug_assert!(idx < MAX_PHYSICAL_PAGES, "physical page index out of range");
    debug_assert!(refcount < (1 << REF_BITS), "reference count overflow");
    ((idx + 1) << REF_BITS) | refcount
}

/// Extracts the physical page index from a valid (non-null, non-transfer)
/// descriptor word.
#[inline]
pub fn extract_idx(word: u32) -> u32 {
    (word >> REF_BITS) - 1
}

/// Extracts the reference count from a valid descriptor word.
#[inline]
pub fn extract_ref(word: u32) -> u32 {
    word & ((1 << REF_BITS) - 1)
}

/// One translatee-region page: a fixed address plus lock-free acquisition
/// state.
#[repr(align(64))]
pub struct PhysicalPageState {
    address: *mut u8,
    is_acquired: AtomicBool,
    /// Virtual page this slot is currently linked to. Only meaningful while
    /// `is_acquired` is set; written once by the linking thread before the
    /// address is handed to any caller, so reads of it by a caller holding a
    /// live mapping never race (see `Tlb::unmap`).
    linked_virtual: AtomicU32,
}

// SAFETY: `address` points into a caller-owned buffer that outlives the
// `Tlb`; all other fields are atomics. The type is free to cross threads.
unsafe impl Send for PhysicalPageState {}
// SAFETY: all mutable access goes through the atomic fields.
unsafe impl Sync for PhysicalPageState {}

impl PhysicalPageState {
    pub fn new(address: *mut u8) -> Self {
        Self {
            address,
            is_acquired: AtomicBool::new(false),
            linked_virtual: AtomicU32::new(0),
        }
    }

    #[inline]
    pub fn address(&self) -> *mut u8 {
        self.address
    }

    /// Attempts to acquire this (presumed free) physical page.
    ///
    /// Returns `true` iff *this call* transitioned the slot from free to
    /// acquired; `false` if it was already acquired. Never blocks.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        !self.is_acquired.swap(true, Ordering::AcqRel)
    }

    /// Releases a physical page previously acquired by this caller.
    #[inline]
    pub fn release(&self) {
        self.is_acquired.store(false, Ordering::Release);
    }

    #[inline]
    pub fn set_linked_virtual(&self, virtual_idx: u32) {
        self.linked_virtual.store(virtual_idx, Ordering::Release);
    }

    #[inline]
    pub fn linked_virtual(&self) -> u32 {
        self.linked_virtual.load(Ordering::Acquire)
    }
}

/// One translator-region page: a single packed atomic word encoding linkage
/// and reference count.
#[repr(align(64))]
pub struct VirtualPageState {
    state: AtomicU32,
}

impl VirtualPageState {
    pub const fn new() -> Self {
        Self {
            state: AtomicU32::new(NULL_STATE),
        }
    }

    #[inline]
    pub fn load(&self, order: Ordering) -> u32 {
        self.state.load(order)
    }

    #[inline]
    pub fn store(&self, value: u32, order: Ordering) {
        self.state.store(value, order);
    }

    #[inline]
    pub fn compare_exchange(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.state.compare_exchange(current, new, success, failure)
    }

    #[inline]
    pub fn compare_exchange_weak(
        &self,
        current: u32,
        new: u32,
        success: Ordering,
        failure: Ordering,
    ) -> Result<u32, u32> {
        self.state
            .compare_exchange_weak(current, new, success, failure)
    }
}

impl Default for VirtualPageState {
    fn default() -> Self {
        Self::new()
    }
}

const _: () = assert!(core::mem::align_of::<PhysicalPageState>() == CACHE_LINE_SIZE);
const _: () = assert!(core::mem::align_of::<VirtualPageState>() == CACHE_LINE_SIZE);
