//! Block layout and boundary-tag arithmetic (§3, §4.1).
//!
//! This is the only module that performs raw pointer arithmetic into the heap. Every other
//! module goes through `header`/`footer`/`next_block`/`prev_block` and the pred/succ slot
//! accessors rather than computing offsets itself.

use core::ptr;

use modular_bitfield::prelude::*;

/// Single word: the unit headers, footers and free-list link slots are built from.
pub const WSIZE: usize = 4;
/// Double word: every block size is a multiple of this.
pub const DSIZE: usize = 8;
/// Header + pred slot + succ slot + footer: the smallest block that can hold free-list links.
pub const MIN_BLOCK: usize = 16;
/// Bytes of bookkeeping overhead on an allocated block (header only; no footer).
pub const HEADER_OVERHEAD: usize = WSIZE;
/// Size of the permanently-allocated prologue block.
pub const PROLOGUE_SIZE: usize = MIN_BLOCK;

/// Rounds `n` up to the next multiple of 8.
#[inline]
pub const fn align8(n: usize) -> usize {
    (n + (DSIZE - 1)) & !(DSIZE - 1)
}

/// The raw 32-bit packing of a header or footer word: `size | prev_alloc<<1 | alloc`.
///
/// Bit 2 is reserved and always zero, matching the reference layout exactly rather than
/// reclaiming it for anything of our own.
#[bitfield]
#[derive(Clone, Copy)]
pub(crate) struct RawTag {
    pub alloc: bool,
    pub prev_alloc: bool,
    #[skip]
    __: B1,
    pub size: B29,
}

/// A decoded header or footer: size plus the two allocation-state bits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tag {
    size: u32,
    prev_alloc: bool,
    alloc: bool,
}

impl Tag {
    pub(crate) fn new(size: usize, prev_alloc: bool, alloc: bool) -> Self {
        debug_assert_eq!(size % DSIZE, 0, "block size must be 8-byte aligned");
        Self { size: size as u32, prev_alloc, alloc }
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    pub fn alloc(&self) -> bool {
        self.alloc
    }

    pub fn prev_alloc(&self) -> bool {
        self.prev_alloc
    }

    pub(crate) fn set_alloc(&mut self, v: bool) {
        self.alloc = v;
    }

    pub(crate) fn set_prev_alloc(&mut self, v: bool) {
        self.prev_alloc = v;
    }

    pub(crate) fn set_size(&mut self, size: usize) {
        self.size = size as u32;
    }

    fn to_raw(self) -> RawTag {
        RawTag::new()
            .with_alloc(self.alloc)
            .with_prev_alloc(self.prev_alloc)
            .with_size(self.size)
    }

    fn from_raw(raw: RawTag) -> Self {
        Self { size: raw.size(), prev_alloc: raw.prev_alloc(), alloc: raw.alloc() }
    }
}

unsafe fn read_word(addr: *mut u8) -> [u8; 4] {
    ptr::read_unaligned(addr.cast::<[u8; 4]>())
}

unsafe fn write_word(addr: *mut u8, bytes: [u8; 4]) {
    ptr::write_unaligned(addr.cast::<[u8; 4]>(), bytes);
}

/// Address of `bp`'s header word (always 4 bytes before the payload).
///
/// # Safety
/// `bp` must point into the heap at a valid block boundary.
#[inline]
pub unsafe fn header_addr(bp: *mut u8) -> *mut u8 {
    bp.sub(WSIZE)
}

/// Reads the header at `bp - 4`.
///
/// # Safety
/// `bp` must be a valid block's payload pointer.
#[inline]
pub unsafe fn header(bp: *mut u8) -> Tag {
    Tag::from_raw(RawTag::from_bytes(read_word(header_addr(bp))))
}

/// Overwrites the header at `bp - 4`.
///
/// # Safety
/// `bp` must be a valid block's payload pointer.
#[inline]
pub unsafe fn set_header(bp: *mut u8, tag: Tag) {
    write_word(header_addr(bp), tag.to_raw().into_bytes());
}

/// Address of the footer word for a block of the given `size` starting at `bp`.
///
/// Only meaningful for free blocks: allocated blocks have no footer.
///
/// # Safety
/// `bp` must be a valid block's payload pointer and `size` its true header size.
#[inline]
pub unsafe fn footer_addr(bp: *mut u8, size: usize) -> *mut u8 {
    bp.add(size - DSIZE)
}

/// Reads the footer of a free block, using its own header to find the size.
///
/// # Safety
/// `bp` must point to a free block.
#[inline]
pub unsafe fn footer(bp: *mut u8) -> Tag {
    let size = header(bp).size();
    Tag::from_raw(RawTag::from_bytes(read_word(footer_addr(bp, size))))
}

/// Overwrites the footer of a free block sized by `tag`.
///
/// # Safety
/// `bp` must point to a free block large enough to hold `tag.size()` bytes.
#[inline]
pub unsafe fn set_footer(bp: *mut u8, tag: Tag) {
    write_word(footer_addr(bp, tag.size()), tag.to_raw().into_bytes());
}

/// The immediate right neighbor's payload pointer.
///
/// # Safety
/// `bp` must be a valid block's payload pointer with a correctly-sized header.
#[inline]
pub unsafe fn next_block(bp: *mut u8) -> *mut u8 {
    bp.add(header(bp).size())
}

/// The immediate left neighbor's payload pointer.
///
/// Reads the left neighbor's footer, which only exists if it is free. Callers must check
/// `header(bp).prev_alloc()` is `false` before calling this — reading a footer that doesn't
/// exist (because the left neighbor is allocated) is undefined.
///
/// # Safety
/// `bp`'s left neighbor must be a free block.
#[inline]
pub unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
    let left_footer = Tag::from_raw(RawTag::from_bytes(read_word(bp.sub(DSIZE))));
    bp.sub(left_footer.size())
}

/// Address of the predecessor link slot: the first word of a free block's payload.
///
/// # Safety
/// `bp` must point to a free block (the slot overlaps live payload bytes on an allocated one).
#[inline]
pub unsafe fn pred_slot(bp: *mut u8) -> *mut u8 {
    bp
}

/// Address of the successor link slot: the second word of a free block's payload.
///
/// # Safety
/// `bp` must point to a free block.
#[inline]
pub unsafe fn succ_slot(bp: *mut u8) -> *mut u8 {
    bp.add(WSIZE)
}

/// Reads a base-relative free-list offset out of a link slot. Zero encodes null.
///
/// # Safety
/// `slot` must be a valid pred/succ slot address.
#[inline]
pub unsafe fn read_offset(slot: *mut u8) -> u32 {
    u32::from_ne_bytes(read_word(slot))
}

/// Writes a base-relative free-list offset into a link slot.
///
/// # Safety
/// `slot` must be a valid pred/succ slot address.
#[inline]
pub unsafe fn write_offset(slot: *mut u8, offset: u32) {
    write_word(slot, offset.to_ne_bytes());
}
