//! The lock-free page-state engine: acquisition, linkage, eviction, resync
//! and reference counting, grounded directly on the original
//! `dg::flush_on_cap_tlb` state machine.

use crate::config::Config;
use crate::error::NoPageFound;
use crate::page::{self, PhysicalPageState, VirtualPageState, NULL_STATE, TRANSFER_STATE};
use crate::sync::atomic::{fence, Ordering};
use crate::sync::backoff::spin_hint;

/// Borrowed view over the three pieces of state every engine operation
/// needs. Exists so the protocol functions below can be exercised directly
/// in tests without constructing a full [`crate::Tlb`].
pub(crate) struct Tables<'a> {
    pub config: &'a Config,
    pub virtual_pages: &'a [VirtualPageState],
    pub physical_pages: &'a [PhysicalPageState],
}

impl<'a> Tables<'a> {
    fn virtual_page_addr(&self, v: u32) -> *mut u8 {
        unsafe {
            self.config
                .translator_base
                .add(v as usize * page::PAGE_SIZE)
        }
    }

    fn transfer_virtual_to_physical(&self, v: u32, phys_idx: u32) {
        let src = self.virtual_page_addr(v);
        let dst = self.physical_pages[phys_idx as usize].address();
        (self.config.virtual_to_physical)(dst, src, page::PAGE_SIZE);
    }

    fn transfer_physical_to_virtual(&self, phys_idx: u32, v: u32) {
        let src = self.physical_pages[phys_idx as usize].address();
        let dst = self.virtual_page_addr(v);
        (self.config.physical_to_virtual)(dst, src, page::PAGE_SIZE);
    }

    /// Scans for a free physical page and atomically claims it. Does not
    /// evict; see [`Self::force_acquire_empty_physical`] for the
    /// eviction-backed variant.
    fn try_acquire_empty_physical(&self) -> Option<u32> {
        self.physical_pages
            .iter()
            .position(PhysicalPageState::try_acquire)
            .map(|idx| idx as u32)
    }

    fn release_physical(&self, phys_idx: u32) {
        self.physical_pages[phys_idx as usize].release();
    }

    /// Evicts virtual page `v` if it is currently unreferenced, releasing
    /// its physical page back to the free pool. Returns `true` if `v` ends
    /// the call in [`NULL_STATE`] — whether because this call evicted it or
    /// because it already was.
    pub(crate) fn try_release_if_zero_ref(&self, v: u32) -> bool {
        loop {
            let page = &self.virtual_pages[v as usize];
            let state = page.load(Ordering::Acquire);
            if state == NULL_STATE {
                return true;
            }
            if state == TRANSFER_STATE {
                return false;
            }
            let phys_idx = page::extract_idx(state);
            let refcount = page::extract_ref(state);
            if refcount != 0 {
                return false;
            }
            if page
                .compare_exchange(state, TRANSFER_STATE, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            self.transfer_physical_to_virtual(phys_idx, v);
            page.store(NULL_STATE, Ordering::Release);
            self.release_physical(phys_idx);
            fence(Ordering::Acquire);
            return true;
        }
    }

    /// Flushes virtual page `v`'s physical contents back without dropping
    /// the linkage. Returns `true` once the page ends the call unlinked or
    /// freshly resynced; `false` if a concurrent transfer was observed and
    /// the caller should retry.
    pub(crate) fn try_sync(&self, v: u32) -> bool {
        loop {
            let page = &self.virtual_pages[v as usize];
            let state = page.load(Ordering::Acquire);
            if state == NULL_STATE {
                return true;
            }
            if state == TRANSFER_STATE {
                return false;
            }
            let phys_idx = page::extract_idx(state);
            let refcount = page::extract_ref(state);
            if refcount != 0 {
                return false;
            }
            if page
                .compare_exchange(state, TRANSFER_STATE, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                continue;
            }
            self.transfer_physical_to_virtual(phys_idx, v);
            page.store(state, Ordering::Release);
            fence(Ordering::Acquire);
            return true;
        }
    }

    /// Acquires a free physical page, sweeping once for an evictable victim
    /// if none is immediately free.
    fn force_acquire_empty_physical(&self) -> Result<u32, NoPageFound> {
        if let Some(idx) = self.try_acquire_empty_physical() {
            return Ok(idx);
        }
        for v in 0..self.virtual_pages.len() as u32 {
            self.try_release_if_zero_ref(v);
        }
        self.try_acquire_empty_physical().ok_or(NoPageFound)
    }

    /// Links virtual page `v` to a freshly acquired physical page with an
    /// initial refcount of one. `Ok(None)` means a concurrent linkage beat
    /// this one to `v`; the caller should retry via
    /// `try_map_and_inc_ref_if_exists` before calling this again.
    pub(crate) fn try_link_and_inc_ref(&self, v: u32) -> Result<Option<*mut u8>, NoPageFound> {
        let phys_idx = self.force_acquire_empty_physical()?;
        self.transfer_virtual_to_physical(v, phys_idx);
        let page = &self.virtual_pages[v as usize];
        let new_state = page::make(phys_idx, 1);
        if page
            .compare_exchange(NULL_STATE, new_state, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.physical_pages[phys_idx as usize].set_linked_virtual(v);
            Ok(Some(self.physical_pages[phys_idx as usize].address()))
        } else {
            self.release_physical(phys_idx);
            Ok(None)
        }
    }

    /// Increments `v`'s reference count if it is already linked. Returns
    /// `None` if `v` is unlinked; spins internally past an in-flight
    /// transfer.
    pub(crate) fn try_map_and_inc_ref_if_exists(&self, v: u32) -> Option<*mut u8> {
        loop {
            let page = &self.virtual_pages[v as usize];
            let state = page.load(Ordering::Acquire);
            if state == NULL_STATE {
                return None;
            }
            if state == TRANSFER_STATE {
                spin_hint();
                continue;
            }
            let phys_idx = page::extract_idx(state);
            let refcount = page::extract_ref(state);
            let new_state = page::make(phys_idx, refcount + 1);
            if page
                .compare_exchange_weak(state, new_state, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(self.physical_pages[phys_idx as usize].address());
            }
        }
    }

    /// Increments `v`'s reference count, linking it first if necessary.
    pub(crate) fn force_fetch_and_inc_ref(&self, v: u32) -> Result<*mut u8, NoPageFound> {
        loop {
            if let Some(ptr) = self.try_map_and_inc_ref_if_exists(v) {
                return Ok(ptr);
            }
            if let Some(ptr) = self.try_link_and_inc_ref(v)? {
                return Ok(ptr);
            }
        }
    }

    /// Decrements `v`'s reference count by one.
    ///
    /// Unlike the original source, the extracted index is bound to a name
    /// distinct from the virtual page argument, so there is no shadowing of
    /// `v` across the retry loop.
    pub(crate) fn dec_ref(&self, v: u32) {
        loop {
            let page = &self.virtual_pages[v as usize];
            let state = page.load(Ordering::Acquire);
            if state == TRANSFER_STATE {
                spin_hint();
                continue;
            }
            let phys_idx = page::extract_idx(state);
            let refcount = page::extract_ref(state);
            debug_assert!(refcount > 0, "unmap called without a matching map");
            let new_state = page::make(phys_idx, refcount - 1);
            if page
                .compare_exchange_weak(state, new_state, Ordering::Release, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    /// Blocks until `v` is evicted (zero refs, unlinked, physical page
    /// released).
    pub(crate) fn drop_page(&self, v: u32) {
        while !self.try_release_if_zero_ref(v) {
            spin_hint();
        }
    }

    /// Blocks until `v`'s physical contents are resynced without dropping
    /// the linkage.
    pub(crate) fn sync_page(&self, v: u32) {
        while !self.try_sync(v) {
            spin_hint();
        }
    }
}
