//! Placement engine (§4.4).
//!
//! Services a request of `asize` bytes from a free block `bp` of size `S >= asize`, either
//! consuming it whole or splitting off the tail as a new free block. Idempotent with respect to
//! free-list membership: unlinks `bp` iff it was free on entry, and files the split tail through
//! [`crate::mem::coalesce`] exactly once, so the in-place reallocate-grow path (which calls this
//! on a block that is already allocated, having just absorbed a free right neighbor) does not
//! double-link it. Routing the split tail through `coalesce` rather than a bare `insert` also
//! covers the reallocate *shrink* path: `bp` there is likewise already allocated on entry, and the
//! block immediately right of the new tail may itself already be free, in which case it must be
//! merged in rather than left sitting adjacent to the tail.

use crate::mem::block::{self, Tag, MIN_BLOCK};
use crate::mem::coalesce::coalesce;
use crate::mem::freelist::FreeListIndex;

/// Places `asize` bytes into the free block at `bp`, splitting off a free tail when there is room.
///
/// # Safety
/// `bp` must be a valid block of size `>= asize`. If `was_free` is `true`, `bp` must currently be
/// a member of `freelist`; if `false`, it must not be (the in-place-grow caller passes `false`
/// since it has already unlinked any absorbed neighbor itself via `coalesce`).
pub(crate) unsafe fn place(freelist: &mut FreeListIndex, bp: *mut u8, asize: usize, was_free: bool) {
    let size = block::header(bp).size();
    debug_assert!(size >= asize);

    if was_free {
        freelist.unlink(bp);
    }

    let prev_alloc = block::header(bp).prev_alloc();

    if size - asize < MIN_BLOCK {
        block::set_header(bp, Tag::new(size, prev_alloc, true));

        let next = block::next_block(bp);
        let mut next_tag = block::header(next);
        next_tag.set_prev_alloc(true);
        block::set_header(next, next_tag);
    } else {
        block::set_header(bp, Tag::new(asize, prev_alloc, true));

        let tail = block::next_block(bp);
        let tail_size = size - asize;
        let tail_tag = Tag::new(tail_size, true, false);
        block::set_header(tail, tail_tag);
        block::set_footer(tail, tail_tag);

        // `after_tail` may itself be free — this split can be reached with `bp` already
        // allocated on entry (the reallocate shrink path), in which case nothing has coalesced
        // this new tail with its right neighbor yet. Clear `after_tail`'s `prev_alloc` bit first
        // (coalesce's precondition) and let it absorb `after_tail` rather than leaving two
        // adjacent free blocks when that neighbor turns out to be free.
        let after_tail = block::next_block(tail);
        let mut after_tag = block::header(after_tail);
        after_tag.set_prev_alloc(false);
        block::set_header(after_tail, after_tag);

        coalesce(freelist, tail);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup(buf: &mut [u8]) -> (*mut u8, FreeListIndex) {
        let base = unsafe { buf.as_mut_ptr().add(block::WSIZE) };
        (base, FreeListIndex::new(base))
    }

    #[test]
    fn splits_when_tail_is_large_enough() {
        let mut buf = [0u8; 256];
        let (base, mut freelist) = setup(&mut buf);

        unsafe {
            block::set_header(base, Tag::new(64, true, false));
            block::set_footer(base, Tag::new(64, true, false));
            freelist.insert(base);

            let epilogue = block::next_block(base);
            block::set_header(epilogue, Tag::new(0, false, true));

            place(&mut freelist, base, 32, true);

            let h = block::header(base);
            assert_eq!(h.size(), 32);
            assert!(h.alloc());
            assert!(h.prev_alloc());

            let tail = block::next_block(base);
            let tail_tag = block::header(tail);
            assert_eq!(tail_tag.size(), 32);
            assert!(!tail_tag.alloc());
            assert!(tail_tag.prev_alloc());
            assert_eq!(block::footer(tail), tail_tag);

            assert_eq!(freelist.find_fit(16), Some(tail));
        }
    }

    #[test]
    fn consumes_whole_block_when_tail_too_small() {
        let mut buf = [0u8; 256];
        let (base, mut freelist) = setup(&mut buf);

        unsafe {
            block::set_header(base, Tag::new(40, true, false));
            block::set_footer(base, Tag::new(40, true, false));
            freelist.insert(base);

            let epilogue = block::next_block(base);
            block::set_header(epilogue, Tag::new(0, false, true));

            place(&mut freelist, base, 32, true);

            let h = block::header(base);
            assert_eq!(h.size(), 40);
            assert!(h.alloc());

            let next = block::next_block(base);
            assert!(block::header(next).prev_alloc());
            assert!(freelist.find_fit(16).is_none());
        }
    }

    #[test]
    fn split_tail_absorbs_free_right_neighbor_instead_of_leaving_it_adjacent() {
        let mut buf = [0u8; 256];
        let (base, mut freelist) = setup(&mut buf);

        unsafe {
            // `base` is already allocated on entry, as in the reallocate shrink-in-place path:
            // `place` is reached with `was_free = false`. What will become the split's
            // `after_tail` is already a free block, already filed in the index.
            block::set_header(base, Tag::new(64, true, true));

            let after_tail = block::next_block(base);
            block::set_header(after_tail, Tag::new(32, false, false));
            block::set_footer(after_tail, Tag::new(32, false, false));
            freelist.insert(after_tail);

            let epilogue = block::next_block(after_tail);
            block::set_header(epilogue, Tag::new(0, false, true));

            // Shrinks `base` to 32 bytes, splitting off a 32-byte tail that sits directly left
            // of the already-free `after_tail` — the two must merge, not sit adjacent.
            place(&mut freelist, base, 32, false);

            let h = block::header(base);
            assert_eq!(h.size(), 32);
            assert!(h.alloc());

            let tail = block::next_block(base);
            let tail_tag = block::header(tail);
            assert_eq!(tail_tag.size(), 64, "tail must have absorbed the free right neighbor");
            assert!(!tail_tag.alloc());
            assert_eq!(block::footer(tail), tail_tag, "merged block's footer must agree");

            // `after_tail`'s old free-list entry must be gone; only the merged `tail` remains.
            assert_eq!(freelist.find_fit(16), Some(tail));
            freelist.unlink(tail);
            assert!(freelist.find_fit(16).is_none(), "after_tail must not be orphaned in its own class");
        }
    }

    #[test]
    fn does_not_unlink_when_not_previously_free() {
        let mut buf = [0u8; 256];
        let (base, mut freelist) = setup(&mut buf);

        unsafe {
            // Simulate a block already allocated (e.g. grown in-place by coalesce) that was
            // never a free-list member on this call.
            block::set_header(base, Tag::new(64, true, true));

            let epilogue = block::next_block(base);
            block::set_header(epilogue, Tag::new(0, false, true));

            place(&mut freelist, base, 32, false);

            let tail = block::next_block(base);
            assert_eq!(freelist.find_fit(16), Some(tail));
        }
    }
}
