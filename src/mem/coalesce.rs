//! Coalescing engine (§4.3).
//!
//! Given a block that has already had its `alloc` bit cleared (in both header and footer), this
//! merges it with whichever of its two neighbors are also free, restoring invariant I3 (no two
//! adjacent free blocks), and returns the payload pointer of the (possibly grown) free block.
//! The caller is responsible for inserting the *other* endpoint's `prev_alloc` bit update (the
//! right neighbor of the merged block) before calling in, and for re-checking it after, since
//! growing `bp` changes who that neighbor is.

use crate::mem::block::{self, Tag};
use crate::mem::freelist::FreeListIndex;

/// Merges `bp` with its free neighbors and re-indexes the result.
///
/// # Safety
/// `bp` must currently be a free block (its header/footer cleared of `alloc`) that is not yet a
/// member of `freelist`, and its right neighbor's `prev_alloc` bit must already be cleared.
pub(crate) unsafe fn coalesce(freelist: &mut FreeListIndex, bp: *mut u8) -> *mut u8 {
    let prev_alloc = block::header(bp).prev_alloc();
    let next = block::next_block(bp);
    let next_alloc = block::header(next).alloc();
    let size = block::header(bp).size();

    match (prev_alloc, next_alloc) {
        (true, true) => {
            freelist.insert(bp);
            bp
        }
        (true, false) => {
            let grown = size + block::header(next).size();
            freelist.unlink(next);

            let tag = Tag::new(grown, true, false);
            block::set_header(bp, tag);
            block::set_footer(bp, tag);

            freelist.insert(bp);
            bp
        }
        (false, true) => {
            let prev = block::prev_block(bp);
            let grown = block::header(prev).size() + size;
            freelist.unlink(prev);

            let tag = Tag::new(grown, block::header(prev).prev_alloc(), false);
            block::set_header(prev, tag);
            block::set_footer(prev, tag);

            freelist.insert(prev);
            prev
        }
        (false, false) => {
            let prev = block::prev_block(bp);
            let grown = block::header(prev).size() + size + block::header(next).size();
            freelist.unlink(prev);
            freelist.unlink(next);

            let tag = Tag::new(grown, block::header(prev).prev_alloc(), false);
            block::set_header(prev, tag);
            block::set_footer(prev, tag);

            freelist.insert(prev);
            prev
        }
    }
}
