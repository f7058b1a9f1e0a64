//! Allocator façade (§4.5, §4.6) and its `GlobalAlloc`-compatible wrapper.
//!
//! [`Allocator`] owns the free-list index and the cached epilogue pointer as instance state
//! behind a [`crate::mem::provider::HeapProvider`], the way this codebase's own heap allocators
//! (`BuddyAllocator`, `KernelHeapAllocator`) are structured as instance state rather than bare
//! `static mut` globals. [`LockedAllocator`] wraps it in a `spin::Mutex` and implements
//! `GlobalAlloc`, mirroring `LockedBuddyAllocator`.

use core::alloc::{GlobalAlloc, Layout};
use core::cmp;
use core::ptr;

use crate::mem::block::{self, align8, Tag, HEADER_OVERHEAD, MIN_BLOCK, WSIZE};
use crate::mem::coalesce::coalesce;
use crate::mem::error::AllocError;
use crate::mem::freelist::FreeListIndex;
use crate::mem::place::place;
use crate::mem::provider::HeapProvider;

/// Bytes requested from the provider on a `find_fit` miss, when larger than the request itself.
const CHUNKSIZE: usize = 256;

/// The allocator façade: the four public operations plus initialization and extension.
pub struct Allocator<P: HeapProvider> {
    provider: P,
    freelist: FreeListIndex,
    epilogue: *mut u8,
}

// Every pointer field is derived from `provider`'s own storage; `provider: Send` is therefore
// sufficient to make the whole struct safe to move across threads (never to share without a
// lock, which is what `LockedAllocator` is for).
unsafe impl<P: HeapProvider + Send> Send for Allocator<P> {}

impl<P: HeapProvider> Allocator<P> {
    /// Initializes the heap: prologue, epilogue, empty free-list index.
    pub fn new(mut provider: P) -> Result<Self, AllocError> {
        let base = provider.extend(6 * WSIZE).ok_or(AllocError::OutOfMemory)?;

        unsafe {
            // base[0..4] is alignment padding; the prologue header starts at base+4.
            let prologue_bp = base.add(2 * WSIZE);
            let prologue_tag = Tag::new(MIN_BLOCK, true, true);
            block::set_header(prologue_bp, prologue_tag);
            block::write_offset(block::pred_slot(prologue_bp), 0);
            block::write_offset(block::succ_slot(prologue_bp), 0);
            block::set_footer(prologue_bp, prologue_tag);

            let epilogue_bp = block::next_block(prologue_bp);
            block::set_header(epilogue_bp, Tag::new(0, true, true));

            Ok(Self { provider, freelist: FreeListIndex::new(prologue_bp), epilogue: epilogue_bp })
        }
    }

    /// Inclusive-low/exclusive-high bounds of the heap region, for bounds checks and the checker.
    pub fn bounds(&self) -> (usize, usize) {
        (self.provider.heap_lo(), self.provider.heap_hi())
    }

    /// The prologue's payload pointer, also the free-list index's base for offset decoding.
    pub(crate) fn prologue(&self) -> *mut u8 {
        self.freelist.base_ptr()
    }

    /// The current epilogue's payload pointer.
    pub(crate) fn epilogue(&self) -> *mut u8 {
        self.epilogue
    }

    pub(crate) fn freelist(&self) -> &FreeListIndex {
        &self.freelist
    }

    /// Grows the heap by at least `n_bytes`, coalesces the new space, and returns the resulting
    /// free block's payload pointer.
    unsafe fn extend_heap(&mut self, n_bytes: usize) -> Option<*mut u8> {
        let size = align8(n_bytes);
        let bp = self.provider.extend(size)?;
        debug_assert_eq!(bp, self.epilogue);

        let prev_alloc = block::header(bp).prev_alloc();
        let tag = Tag::new(size, prev_alloc, false);
        block::set_header(bp, tag);
        block::set_footer(bp, tag);

        let new_epilogue = block::next_block(bp);
        block::set_header(new_epilogue, Tag::new(0, false, true));
        self.epilogue = new_epilogue;

        Some(coalesce(&mut self.freelist, bp))
    }

    /// Allocates at least `n` bytes, returning a null pointer on a zero-sized request or OOM.
    pub fn allocate(&mut self, n: usize) -> *mut u8 {
        if n == 0 {
            return ptr::null_mut();
        }
        let asize = align8(cmp::max(n + HEADER_OVERHEAD, MIN_BLOCK));

        unsafe {
            if let Some(bp) = self.freelist.find_fit(asize) {
                place(&mut self.freelist, bp, asize, true);
                return bp;
            }

            let extend_size = cmp::max(asize, CHUNKSIZE);
            let bp = match self.extend_heap(extend_size) {
                Some(bp) => bp,
                None => return ptr::null_mut(),
            };
            place(&mut self.freelist, bp, asize, true);
            bp
        }
    }

    /// Frees `p`. A null pointer or one outside the heap's bounds is a no-op.
    pub fn free(&mut self, p: *mut u8) {
        if p.is_null() {
            return;
        }
        let (lo, hi) = self.bounds();
        if (p as usize) < lo || (p as usize) >= hi {
            return;
        }

        unsafe {
            let tag = block::header(p);
            let cleared = Tag::new(tag.size(), tag.prev_alloc(), false);
            block::set_header(p, cleared);
            block::set_footer(p, cleared);

            let next = block::next_block(p);
            let mut next_tag = block::header(next);
            next_tag.set_prev_alloc(false);
            block::set_header(next, next_tag);

            coalesce(&mut self.freelist, p);
        }
    }

    /// Resizes the allocation at `p` to `n` bytes, preserving its contents up to the smaller of
    /// the old and new sizes. `p = null` behaves as `allocate`; `n = 0` behaves as `free`.
    pub fn reallocate(&mut self, p: *mut u8, n: usize) -> *mut u8 {
        if p.is_null() {
            return self.allocate(n);
        }
        if n == 0 {
            self.free(p);
            return ptr::null_mut();
        }

        unsafe {
            let asize = align8(cmp::max(n + HEADER_OVERHEAD, MIN_BLOCK));
            let cur_size = block::header(p).size();

            if asize <= cur_size {
                place(&mut self.freelist, p, asize, false);
                return p;
            }

            let next = block::next_block(p);
            let next_tag = block::header(next);
            if !next_tag.alloc() && cur_size + next_tag.size() >= asize {
                self.freelist.unlink(next);
                let merged_size = cur_size + next_tag.size();
                let prev_alloc = block::header(p).prev_alloc();
                block::set_header(p, Tag::new(merged_size, prev_alloc, true));
                place(&mut self.freelist, p, asize, false);
                return p;
            }

            let new_bp = self.allocate(n);
            if new_bp.is_null() {
                return ptr::null_mut();
            }
            let old_payload = cur_size - HEADER_OVERHEAD;
            let copy_len = cmp::min(n, old_payload);
            ptr::copy_nonoverlapping(p, new_bp, copy_len);
            self.free(p);
            new_bp
        }
    }

    /// Allocates `count * size` bytes, zeroed. Overflow in the product is treated as OOM.
    pub fn zero_allocate(&mut self, count: usize, size: usize) -> *mut u8 {
        let total = match count.checked_mul(size) {
            Some(total) if total != 0 => total,
            _ => return ptr::null_mut(),
        };

        let bp = self.allocate(total);
        if !bp.is_null() {
            unsafe { ptr::write_bytes(bp, 0, total) };
        }
        bp
    }
}

/// `spin::Mutex`-wrapped [`Allocator`] implementing `GlobalAlloc`, for callers that want a
/// drop-in `#[global_allocator]`, in the same shape as this codebase's `LockedBuddyAllocator`.
pub struct LockedAllocator<P: HeapProvider + Send> {
    inner: spin::Mutex<Allocator<P>>,
}

impl<P: HeapProvider + Send> LockedAllocator<P> {
    pub fn new(provider: P) -> Result<Self, AllocError> {
        Ok(Self { inner: spin::Mutex::new(Allocator::new(provider)?) })
    }
}

unsafe impl<P: HeapProvider + Send> GlobalAlloc for LockedAllocator<P> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        debug_assert!(layout.align() <= block::DSIZE, "alignment beyond 8 bytes is unsupported");
        self.inner.lock().allocate(layout.size())
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        self.inner.lock().free(ptr);
    }

    unsafe fn realloc(&self, ptr: *mut u8, _layout: Layout, new_size: usize) -> *mut u8 {
        self.inner.lock().reallocate(ptr, new_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::check::{self, Mode};
    use crate::mem::diag::NullSink;
    use crate::mem::provider::VecHeapProvider;

    fn new_allocator(cap: usize) -> Allocator<VecHeapProvider> {
        Allocator::new(VecHeapProvider::with_capacity(cap)).unwrap()
    }

    fn run_checks(a: &Allocator<VecHeapProvider>) {
        let mut sink = NullSink;
        for mode in 0..=8u8 {
            check::check(a, Mode::from_u8(mode), &mut sink).unwrap_or_else(|e| {
                panic!("check(mode={mode}) failed: {e}");
            });
        }
    }

    #[test]
    fn init_then_single_allocate() {
        let mut a = new_allocator(4096);
        let p = a.allocate(40);
        assert!(!p.is_null());
        assert_eq!(p as usize % block::DSIZE, 0);
        run_checks(&a);
    }

    #[test]
    fn split_then_free_both_coalesces() {
        let mut a = new_allocator(4096);
        let x = a.allocate(32);
        let y = a.allocate(32);
        a.free(x);
        a.free(y);
        run_checks(&a);
        // A fresh large-enough request should land in the merged block.
        let z = a.allocate(48);
        assert!(!z.is_null());
        run_checks(&a);
    }

    #[test]
    fn first_fit_spills_across_classes() {
        let mut a = new_allocator(4096);
        let _first = a.allocate(48);
        let middle = a.allocate(200);
        let _last = a.allocate(48);
        a.free(middle);
        run_checks(&a);
        let p = a.allocate(180);
        assert!(!p.is_null());
        run_checks(&a);
    }

    #[test]
    fn reallocate_grows_in_place_by_absorbing_free_neighbor() {
        let mut a = new_allocator(4096);
        let p = a.allocate(32);
        let q = a.allocate(16);
        a.free(q);
        run_checks(&a);

        let grown = a.reallocate(p, 40);
        assert_eq!(grown, p);
        run_checks(&a);
    }

    #[test]
    fn reallocate_grows_by_copy_when_no_room() {
        let mut a = new_allocator(4096);
        let p = a.allocate(32);
        unsafe {
            ptr::write_bytes(p, 0xAB, 32);
        }
        let _q = a.allocate(32);

        let grown = a.reallocate(p, 200);
        assert_ne!(grown, p);
        assert!(!grown.is_null());
        unsafe {
            for i in 0..32 {
                assert_eq!(*grown.add(i), 0xAB);
            }
        }
        run_checks(&a);
    }

    #[test]
    fn reallocate_to_same_size_is_identity() {
        let mut a = new_allocator(4096);
        let p = a.allocate(40);
        let payload = unsafe { block::header(p).size() } - HEADER_OVERHEAD;
        let q = a.reallocate(p, payload);
        assert_eq!(q, p);
        run_checks(&a);
    }

    #[test]
    fn reallocate_shrinks_in_place_and_absorbs_free_right_neighbor() {
        let mut a = new_allocator(4096);
        // Fresh heap: p's request (200) misses find_fit and triggers a 256-byte extension,
        // leaving a free tail of size 48 right after p.
        let p = a.allocate(200);
        // q's request (32, asize 40) lands in that 48-byte tail with a <16-byte leftover, so it
        // consumes the tail whole at size 48, landing immediately right of p.
        let q = a.allocate(32);
        a.free(q);
        run_checks(&a);

        // Shrinking p splits off a free tail whose immediate right neighbor is the now-free q —
        // they must merge instead of ending up adjacent and free.
        let shrunk = a.reallocate(p, 90);
        assert_eq!(shrunk, p);
        run_checks(&a);
    }

    #[test]
    fn zero_allocate_zeroes_payload() {
        let mut a = new_allocator(4096);
        let p = a.zero_allocate(8, 4);
        assert!(!p.is_null());
        unsafe {
            for i in 0..32 {
                assert_eq!(*p.add(i), 0);
            }
        }
        run_checks(&a);
    }

    #[test]
    fn zero_allocate_rejects_overflowing_product() {
        let mut a = new_allocator(4096);
        let p = a.zero_allocate(usize::MAX, 2);
        assert!(p.is_null());
    }

    #[test]
    fn free_null_and_out_of_range_are_no_ops() {
        let mut a = new_allocator(4096);
        a.free(ptr::null_mut());
        let (_, hi) = a.bounds();
        a.free((hi + 64) as *mut u8);
        run_checks(&a);
    }
}
