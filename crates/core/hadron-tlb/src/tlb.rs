//! The public operation surface: `init`, `map`, `unmap`, `shootdown`,
//! `sync`, `flush`, `remap`.

use alloc::vec::Vec;

use crate::config::{validate_region, Config, TransferFn};
use crate::engine::Tables;
use crate::error::NoPageFound;
use crate::page::{PhysicalPageState, VirtualPageState, PAGE_SIZE};

/// An owned, lock-free software-managed TLB.
///
/// Built once by [`Tlb::init`] and shared across threads through `&Tlb` —
/// every operation mutates through atomics on the underlying descriptors, so
/// no `&mut self` is ever required.
pub struct Tlb {
    config: Config,
    virtual_pages: Vec<VirtualPageState>,
    physical_pages: Vec<PhysicalPageState>,
}

// SAFETY: `Tlb` only exposes shared-reference operations; all mutable state
// lives behind atomics in `virtual_pages`/`physical_pages`.
unsafe impl Send for Tlb {}
// SAFETY: see above.
unsafe impl Sync for Tlb {}

impl Tlb {
    /// Builds a new TLB over a translator region `[translator_base,
    /// translator_base + translator_size)` and a translatee region
    /// `[translatee_base, translatee_base + translatee_size)`.
    ///
    /// # Panics
    ///
    /// Panics if either region's size is zero or not a multiple of
    /// [`PAGE_SIZE`], or if either base is null or not page-aligned. This
    /// mirrors the original implementation's "terminate the process on
    /// misconfiguration" contract: there is no way to continue safely.
    pub fn init(
        translator_base: *mut u8,
        translator_size: usize,
        translatee_base: *mut u8,
        translatee_size: usize,
        virtual_to_physical: TransferFn,
        physical_to_virtual: TransferFn,
    ) -> Self {
        validate_region(translator_base, translator_size)
            .unwrap_or_else(|e| panic!("hadron-tlb: invalid translator region: {e:?}"));
        validate_region(translatee_base, translatee_size)
            .unwrap_or_else(|e| panic!("hadron-tlb: invalid translatee region: {e:?}"));

        let virtual_count = translator_size / PAGE_SIZE;
        let physical_count = translatee_size / PAGE_SIZE;

        let virtual_pages = (0..virtual_count).map(|_| VirtualPageState::new()).collect();
        let physical_pages = (0..physical_count)
            .map(|i| unsafe { PhysicalPageState::new(translatee_base.add(i * PAGE_SIZE)) })
            .collect();

        Self {
            config: Config {
                translator_base,
                translatee_base,
                virtual_to_physical,
                physical_to_virtual,
            },
            virtual_pages,
            physical_pages,
        }
    }

    fn tables(&self) -> Tables<'_> {
        Tables {
            config: &self.config,
            virtual_pages: &self.virtual_pages,
            physical_pages: &self.physical_pages,
        }
    }

    /// Translates a translator-space pointer into its virtual page index
    /// and intra-page offset.
    ///
    /// # Safety
    ///
    /// `p` must lie within the translator region; callers on the public API
    /// boundary are expected to have already excluded the null case.
    unsafe fn decompose_translator(&self, p: *mut u8) -> (u32, usize) {
        let distance = (p as usize) - (self.config.translator_base as usize);
        ((distance / PAGE_SIZE) as u32, distance % PAGE_SIZE)
    }

    /// Translates a translatee-space (mapped) pointer into the physical page
    /// it falls in.
    ///
    /// # Safety
    ///
    /// `q` must lie within the translatee region.
    unsafe fn physical_index_of(&self, q: *mut u8) -> u32 {
        let distance = (q as usize) - (self.config.translatee_base as usize);
        (distance / PAGE_SIZE) as u32
    }

    /// Maps `p` (a translator-space pointer), returning a translatee-space
    /// pointer backing the same page-sized contents and incrementing that
    /// page's reference count.
    ///
    /// `p.is_null()` returns `Ok(null)` without touching any state.
    ///
    /// # Errors
    ///
    /// Returns [`NoPageFound`] if no physical page was acquirable even after
    /// a full eviction sweep. The `Tlb`'s state is unchanged in that case.
    pub fn map(&self, p: *mut u8) -> Result<*mut u8, NoPageFound> {
        if p.is_null() {
            return Ok(core::ptr::null_mut());
        }
        let (v, offset) = unsafe { self.decompose_translator(p) };
        let base = self.tables().force_fetch_and_inc_ref(v)?;
        Ok(unsafe { base.add(offset) })
    }

    /// Decrements the reference count of the virtual page currently linked
    /// to `q`'s physical page, where `q` was returned by a prior [`Tlb::map`].
    ///
    /// `q.is_null()` is a no-op.
    pub fn unmap(&self, q: *mut u8) {
        if q.is_null() {
            return;
        }
        let phys_idx = unsafe { self.physical_index_of(q) };
        let v = self.physical_pages[phys_idx as usize].linked_virtual();
        self.tables().dec_ref(v);
    }

    /// Blocks until the page containing `p` (translator-space) has zero
    /// references and has been evicted.
    ///
    /// `p.is_null()` is a no-op.
    pub fn shootdown(&self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let (v, _) = unsafe { self.decompose_translator(p) };
        self.tables().drop_page(v);
    }

    /// Blocks until the page containing `p` (translator-space) has its
    /// physical contents flushed back, without dropping the linkage.
    ///
    /// `p.is_null()` is a no-op.
    pub fn sync_ptr(&self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let (v, _) = unsafe { self.decompose_translator(p) };
        self.tables().sync_page(v);
    }

    /// `shootdown` over every virtual page.
    pub fn flush(&self) {
        for v in 0..self.virtual_pages.len() as u32 {
            self.tables().drop_page(v);
        }
    }

    /// `sync_ptr` over every virtual page.
    pub fn sync(&self) {
        for v in 0..self.virtual_pages.len() as u32 {
            self.tables().sync_page(v);
        }
    }

    /// Remaps `old_p` to `new_p` (both translator-space), given
    /// `old_mapped` (translatee-space, from a prior `map(old_p)`).
    ///
    /// If `old_p` and `new_p` fall in the same translator page, this is pure
    /// pointer arithmetic and leaves reference counts untouched. Otherwise
    /// it is equivalent to `map(new_p)` followed by `unmap(old_mapped)`.
    pub fn remap(
        &self,
        old_p: *mut u8,
        old_mapped: *mut u8,
        new_p: *mut u8,
    ) -> Result<*mut u8, NoPageFound> {
        let (old_v, _) = unsafe { self.decompose_translator(old_p) };
        let (new_v, _) = unsafe { self.decompose_translator(new_p) };
        if old_v == new_v {
            let delta = new_p as isize - old_p as isize;
            return Ok(unsafe { old_mapped.offset(delta) });
        }
        let new_mapped = self.map(new_p)?;
        self.unmap(old_mapped);
        Ok(new_mapped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity_copy(dst: *mut u8, src: *const u8, n: usize) {
        unsafe { core::ptr::copy_nonoverlapping(src, dst, n) };
    }

    struct Region {
        buf: Vec<u8>,
    }

    impl Region {
        fn new(pages: usize) -> Self {
            Self {
                buf: alloc::vec![0u8; PAGE_SIZE * pages],
            }
        }
        fn base(&mut self) -> *mut u8 {
            self.buf.as_mut_ptr()
        }
    }

    #[test]
    fn simple_map_unmap_roundtrip() {
        let mut translator = Region::new(2);
        let mut translatee = Region::new(2);
        let tlb = Tlb::init(
            translator.base(),
            PAGE_SIZE * 2,
            translatee.base(),
            PAGE_SIZE * 2,
            identity_copy,
            identity_copy,
        );

        let p = translator.base();
        unsafe { *p = 0xAA };
        let q = tlb.map(p).unwrap();
        assert!(!q.is_null());
        assert_eq!(unsafe { *q }, 0xAA);
        unsafe { *q = 0xBB };

        tlb.unmap(q);
        tlb.shootdown(p);

        // After shootdown the write-back must have happened.
        assert_eq!(unsafe { *p }, 0xBB);
    }

    #[test]
    fn null_pointer_operations_are_no_ops() {
        let mut translator = Region::new(1);
        let mut translatee = Region::new(1);
        let tlb = Tlb::init(
            translator.base(),
            PAGE_SIZE,
            translatee.base(),
            PAGE_SIZE,
            identity_copy,
            identity_copy,
        );
        assert!(tlb.map(core::ptr::null_mut()).unwrap().is_null());
        tlb.unmap(core::ptr::null_mut());
        tlb.shootdown(core::ptr::null_mut());
        tlb.sync_ptr(core::ptr::null_mut());
    }

    #[test]
    fn saturation_returns_no_page_found() {
        let mut translator = Region::new(2);
        let mut translatee = Region::new(1);
        let tlb = Tlb::init(
            translator.base(),
            PAGE_SIZE * 2,
            translatee.base(),
            PAGE_SIZE,
            identity_copy,
            identity_copy,
        );
        let base = translator.base();
        let p0 = base;
        let p1 = unsafe { base.add(PAGE_SIZE) };
        tlb.map(p0).unwrap();
        assert_eq!(tlb.map(p1), Err(NoPageFound));
    }

    #[test]
    fn remap_within_page_preserves_refcount() {
        let mut translator = Region::new(1);
        let mut translatee = Region::new(1);
        let tlb = Tlb::init(
            translator.base(),
            PAGE_SIZE,
            translatee.base(),
            PAGE_SIZE,
            identity_copy,
            identity_copy,
        );
        let p = translator.base();
        let q = tlb.map(p).unwrap();
        let p2 = unsafe { p.add(16) };
        let q2 = tlb.remap(p, q, p2).unwrap();
        assert_eq!(q2, unsafe { q.add(16) });
        // only one inc_ref ever happened; a single unmap should fully free
        // the page.
        tlb.unmap(q2);
        assert!(tlb.tables().try_release_if_zero_ref(0));
    }

    #[test]
    fn remap_across_pages_acts_like_map_then_unmap() {
        let mut translator = Region::new(2);
        let mut translatee = Region::new(2);
        let tlb = Tlb::init(
            translator.base(),
            PAGE_SIZE * 2,
            translatee.base(),
            PAGE_SIZE * 2,
            identity_copy,
            identity_copy,
        );
        let base = translator.base();
        let p0 = base;
        let p1 = unsafe { base.add(PAGE_SIZE) };
        let q0 = tlb.map(p0).unwrap();
        let q1 = tlb.remap(p0, q0, p1).unwrap();
        assert!(!q1.is_null());
        // old page should now be free (refcount dropped to zero by remap's
        // internal unmap).
        assert!(tlb.tables().try_release_if_zero_ref(0));
    }

    #[test]
    fn flush_leaves_every_page_unlinked() {
        let mut translator = Region::new(3);
        let mut translatee = Region::new(3);
        let tlb = Tlb::init(
            translator.base(),
            PAGE_SIZE * 3,
            translatee.base(),
            PAGE_SIZE * 3,
            identity_copy,
            identity_copy,
        );
        let base = translator.base();
        for i in 0..3 {
            let p = unsafe { base.add(i * PAGE_SIZE) };
            let q = tlb.map(p).unwrap();
            tlb.unmap(q);
        }
        tlb.flush();
        for v in 0..3 {
            assert!(tlb.tables().try_release_if_zero_ref(v));
        }
        for phys in &tlb.physical_pages {
            assert!(phys.try_acquire());
            phys.release();
        }
    }
}
