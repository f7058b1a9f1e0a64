//! Read-only consistency checker (§4.7, §8).
//!
//! Walks the heap linearly from prologue to epilogue and walks every free list, verifying the
//! invariants in §3/§8 against each other. Never mutates a byte of the heap. Not in the hot
//! path — exercised by this crate's own tests and by `src/bin/heapcheck.rs`.

use core::fmt::Write;

use crate::mem::block::{self, DSIZE, MIN_BLOCK};
use crate::mem::error::{CheckError, CheckFailure};
use crate::mem::freelist::FreeListIndex;
use crate::mem::heap::Allocator;
use crate::mem::provider::HeapProvider;
use crate::{chk_println, chk_warn};

/// Which invariant a `check` call audits, per §6's enumerated modes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Prologue/epilogue sentinels are present and allocated.
    Sentinels,
    /// A plain forward walk of the heap, printed for inspection.
    ForwardWalk,
    /// Every payload pointer lies within `[lo, hi)`.
    Bounds,
    /// Free blocks' headers and footers agree.
    HeaderFooterAgreement,
    /// No two adjacent blocks are both free.
    NoAdjacentFree,
    /// Every free-list edge's pred/succ links point back correctly.
    PredSuccConsistency,
    /// Every free block sits in the size class whose range contains it.
    FreeListBounds,
    /// The free-block count agrees between the heap walk and the free-list walk.
    FreeCountAgreement,
    /// Combination of [`Mode::FreeListBounds`] phrased per §6 as "size-class correctness".
    SizeClassCorrectness,
}

impl Mode {
    /// Decodes a `check(mode)` call's numeric mode, per §6: 0 through 8.
    ///
    /// # Panics
    /// Panics if `raw` is not in `0..=8`; this mirrors the reference driver, which treats an
    /// out-of-range mode as a programmer error rather than a runtime condition to recover from.
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Mode::Sentinels,
            1 => Mode::ForwardWalk,
            2 => Mode::Bounds,
            3 => Mode::HeaderFooterAgreement,
            4 => Mode::NoAdjacentFree,
            5 => Mode::PredSuccConsistency,
            6 => Mode::FreeListBounds,
            7 => Mode::FreeCountAgreement,
            8 => Mode::SizeClassCorrectness,
            _ => panic!("check mode must be 0..=8, got {raw}"),
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Mode::Sentinels => 0,
            Mode::ForwardWalk => 1,
            Mode::Bounds => 2,
            Mode::HeaderFooterAgreement => 3,
            Mode::NoAdjacentFree => 4,
            Mode::PredSuccConsistency => 5,
            Mode::FreeListBounds => 6,
            Mode::FreeCountAgreement => 7,
            Mode::SizeClassCorrectness => 8,
        }
    }
}

fn fail(mode: Mode, kind: CheckFailure, at: *mut u8) -> CheckError {
    CheckError { mode: mode.as_u8(), kind, at: at as usize }
}

/// Runs the check named by `mode` against `allocator`, writing human-readable progress and
/// warnings to `sink`. Returns the first invariant violation found, if any.
///
/// This never mutates the heap: every read goes through the same `block`/`freelist` accessors
/// the hot path uses, but no `set_header`/`set_footer`/`insert`/`unlink` call is ever made here.
pub fn check<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    mode: Mode,
    sink: &mut W,
) -> Result<(), CheckError> {
    match mode {
        Mode::Sentinels => check_sentinels(allocator, sink),
        Mode::ForwardWalk => check_forward_walk(allocator, sink),
        Mode::Bounds => check_bounds(allocator, sink),
        Mode::HeaderFooterAgreement => check_header_footer(allocator, sink),
        Mode::NoAdjacentFree => check_no_adjacent_free(allocator, sink),
        Mode::PredSuccConsistency => check_pred_succ(allocator, sink),
        Mode::FreeListBounds | Mode::SizeClassCorrectness => check_size_classes(allocator, sink),
        Mode::FreeCountAgreement => check_free_count(allocator, sink),
    }
}

/// Iterates every block from the prologue up to and including the epilogue.
fn heap_blocks<P: HeapProvider>(allocator: &Allocator<P>) -> impl Iterator<Item = *mut u8> + '_ {
    let epilogue = allocator.epilogue();
    let mut cur = Some(allocator.prologue());
    core::iter::from_fn(move || {
        let bp = cur?;
        cur = if bp == epilogue { None } else { Some(unsafe { block::next_block(bp) }) };
        Some(bp)
    })
}

fn check_sentinels<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::Sentinels;
    let prologue = allocator.prologue();
    let epilogue = allocator.epilogue();

    unsafe {
        let p_hdr = block::header(prologue);
        let p_ftr = block::footer(prologue);
        chk_println!(
            sink,
            "prologue: header size={} alloc={} footer size={} alloc={}",
            p_hdr.size(),
            p_hdr.alloc(),
            p_ftr.size(),
            p_ftr.alloc()
        );
        if p_hdr.size() != MIN_BLOCK || !p_hdr.alloc() {
            chk_warn!(sink, "prologue header corrupted");
            return Err(fail(mode, CheckFailure::BadSentinel, prologue));
        }
        if p_ftr != p_hdr {
            chk_warn!(sink, "prologue header/footer disagree");
            return Err(fail(mode, CheckFailure::BadSentinel, prologue));
        }

        let e_hdr = block::header(epilogue);
        chk_println!(sink, "epilogue: header size={} alloc={}", e_hdr.size(), e_hdr.alloc());
        if e_hdr.size() != 0 || !e_hdr.alloc() {
            chk_warn!(sink, "epilogue header corrupted");
            return Err(fail(mode, CheckFailure::BadSentinel, epilogue));
        }
    }
    Ok(())
}

fn check_forward_walk<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    chk_println!(sink, "begin heap walk");
    let mut id = 0u32;
    for bp in heap_blocks(allocator) {
        let hdr = unsafe { block::header(bp) };
        chk_println!(
            sink,
            "block:{} address={:#x} size={} alloc={}",
            id,
            bp as usize,
            hdr.size(),
            hdr.alloc()
        );
        id += 1;
    }
    chk_println!(sink, "end heap walk ({} blocks incl. sentinels)", id);
    Ok(())
}

fn check_bounds<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::Bounds;
    let (lo, hi) = allocator.bounds();
    for bp in heap_blocks(allocator) {
        let addr = bp as usize;
        if addr < lo || addr >= hi || addr % DSIZE != 0 {
            chk_warn!(sink, "pointer {:#x} out of [{:#x}, {:#x}) or misaligned", addr, lo, hi);
            return Err(fail(mode, CheckFailure::OutOfBounds, bp));
        }
    }
    chk_println!(sink, "all block pointers within [{:#x}, {:#x})", lo, hi);
    Ok(())
}

fn check_header_footer<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::HeaderFooterAgreement;
    for bp in heap_blocks(allocator) {
        let hdr = unsafe { block::header(bp) };
        if hdr.alloc() {
            continue;
        }
        let ftr = unsafe { block::footer(bp) };
        if hdr != ftr {
            chk_warn!(sink, "header/footer disagree at {:#x}: {:?} vs {:?}", bp as usize, hdr, ftr);
            return Err(fail(mode, CheckFailure::HeaderFooterMismatch, bp));
        }
    }
    chk_println!(sink, "every free block's header and footer agree");
    Ok(())
}

fn check_no_adjacent_free<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::NoAdjacentFree;
    let mut prev_free = false;
    for bp in heap_blocks(allocator) {
        let hdr = unsafe { block::header(bp) };
        let free = !hdr.alloc();
        if prev_free && free {
            chk_warn!(sink, "adjacent free blocks meeting at {:#x}", bp as usize);
            return Err(fail(mode, CheckFailure::AdjacentFreeBlocks, bp));
        }
        // prev_alloc must also agree with the left neighbor's actual alloc bit (I1/I3 together).
        if hdr.prev_alloc() == prev_free {
            chk_warn!(sink, "prev_alloc bit wrong at {:#x}", bp as usize);
            return Err(fail(mode, CheckFailure::PrevAllocMismatch, bp));
        }
        prev_free = free;
    }
    chk_println!(sink, "no two adjacent blocks are both free");
    Ok(())
}

fn check_pred_succ<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::PredSuccConsistency;
    let freelist = allocator.freelist();
    for bp in freelist.iter_all() {
        unsafe {
            let succ_off = block::read_offset(block::succ_slot(bp));
            if succ_off != 0 {
                let succ = freelist.base_ptr().add(succ_off as usize);
                let back = block::read_offset(block::pred_slot(succ));
                if freelist.base_ptr().add(back as usize) != bp {
                    chk_warn!(sink, "succ({:#x})'s pred does not point back", bp as usize);
                    return Err(fail(mode, CheckFailure::BrokenListEdge, bp));
                }
            }
            let pred_off = block::read_offset(block::pred_slot(bp));
            if pred_off != 0 {
                let pred = freelist.base_ptr().add(pred_off as usize);
                let forward = block::read_offset(block::succ_slot(pred));
                if freelist.base_ptr().add(forward as usize) != bp {
                    chk_warn!(sink, "pred({:#x})'s succ does not point back", bp as usize);
                    return Err(fail(mode, CheckFailure::BrokenListEdge, bp));
                }
            }
        }
    }
    chk_println!(sink, "every free-list pred/succ edge is consistent");
    Ok(())
}

fn check_size_classes<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::FreeListBounds;
    let freelist = allocator.freelist();
    for class in 0..crate::mem::freelist::CLASSES {
        let (lo, hi) = FreeListIndex::class_range(class);
        let mut cur = unsafe { freelist.head(class) };
        while let Some(bp) = cur {
            let size = unsafe { block::header(bp).size() };
            if size < lo || size > hi {
                chk_warn!(sink, "block {:#x} size {} outside class {} range", bp as usize, size, class);
                return Err(fail(mode, CheckFailure::WrongSizeClass, bp));
            }
            cur = unsafe {
                let succ_off = block::read_offset(block::succ_slot(bp));
                if succ_off == 0 { None } else { Some(freelist.base_ptr().add(succ_off as usize)) }
            };
        }
    }
    chk_println!(sink, "every free block sits in its proper size class");
    Ok(())
}

fn check_free_count<P: HeapProvider, W: Write>(
    allocator: &Allocator<P>,
    sink: &mut W,
) -> Result<(), CheckError> {
    let mode = Mode::FreeCountAgreement;
    let mut walk_count = 0usize;
    for bp in heap_blocks(allocator) {
        if bp == allocator.prologue() || bp == allocator.epilogue() {
            continue;
        }
        if !unsafe { block::header(bp).alloc() } {
            walk_count += 1;
        }
    }

    let list_count = allocator.freelist().iter_all().count();

    chk_println!(sink, "heap walk free count={}, free-list walk count={}", walk_count, list_count);
    if walk_count != list_count {
        return Err(fail(mode, CheckFailure::CountMismatch, allocator.prologue()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::diag::NullSink;
    use crate::mem::provider::VecHeapProvider;

    fn new_allocator(cap: usize) -> Allocator<VecHeapProvider> {
        Allocator::new(VecHeapProvider::with_capacity(cap)).unwrap()
    }

    #[test]
    fn fresh_heap_passes_every_mode() {
        let a = new_allocator(4096);
        let mut sink = NullSink;
        for raw in 0..=8u8 {
            check(&a, Mode::from_u8(raw), &mut sink).expect("fresh heap must pass every check");
        }
    }

    #[test]
    fn busy_heap_passes_every_mode() {
        let mut a = new_allocator(4096);
        let p1 = a.allocate(48);
        let _p2 = a.allocate(200);
        let _p3 = a.allocate(48);
        a.free(p1);
        let _p4 = a.allocate(16);

        let mut sink = NullSink;
        for raw in 0..=8u8 {
            check(&a, Mode::from_u8(raw), &mut sink).expect("busy heap must pass every check");
        }
    }

    #[test]
    fn detects_corrupted_header_footer() {
        let mut a = new_allocator(4096);
        let p = a.allocate(64);
        a.free(p);

        unsafe {
            let mut hdr = block::header(p);
            hdr.set_size(hdr.size() + 8);
            block::set_header(p, hdr);
        }

        let mut sink = NullSink;
        let err = check(&a, Mode::HeaderFooterAgreement, &mut sink).unwrap_err();
        assert_eq!(err.kind, CheckFailure::HeaderFooterMismatch);
    }

    #[test]
    fn detects_broken_list_edge() {
        let mut a = new_allocator(4096);
        // `q` keeps `p` and `r` from coalescing into one block when both are freed.
        let p = a.allocate(48);
        let _q = a.allocate(64);
        let r = a.allocate(48);
        a.free(p);
        a.free(r);
        // LIFO order: the list now runs head -> r -> p -> null.

        unsafe {
            // Sever `p`'s predecessor link without updating `r`'s successor link to match —
            // simulates a torn splice where only one side of an edge was patched.
            block::write_offset(block::pred_slot(p), 0);
        }

        let mut sink = NullSink;
        let err = check(&a, Mode::PredSuccConsistency, &mut sink).unwrap_err();
        assert_eq!(err.kind, CheckFailure::BrokenListEdge);
    }

    #[test]
    fn detects_adjacent_free_blocks() {
        let mut a = new_allocator(4096);
        let p = a.allocate(32);
        let q = a.allocate(32);

        unsafe {
            // Force both blocks free without going through `free`'s coalescing, to observe the
            // invariant the coalescer exists to uphold.
            let p_tag = block::header(p);
            let cleared = block::Tag::new(p_tag.size(), p_tag.prev_alloc(), false);
            block::set_header(p, cleared);
            block::set_footer(p, cleared);

            let q_tag = block::header(q);
            let q_cleared = block::Tag::new(q_tag.size(), false, false);
            block::set_header(q, q_cleared);
            block::set_footer(q, q_cleared);
        }

        let mut sink = NullSink;
        let err = check(&a, Mode::NoAdjacentFree, &mut sink).unwrap_err();
        assert_eq!(err.kind, CheckFailure::AdjacentFreeBlocks);
    }
}
