//! Error kinds for the allocator and its consistency checker.
//!
//! Plain `Copy` enums with hand-written `Display` impls, following this codebase's
//! `MemoryError` rather than pulling in `thiserror` for a handful of variants.

use core::fmt::{self, Display, Formatter};

/// Why an allocating operation produced a null pointer.
///
/// The hot path (`allocate`/`reallocate`/`zero_allocate`) never propagates this type to the
/// caller directly — every variant collapses to a null return, per the error handling design.
/// It exists so the allocator's own tests can distinguish "out of memory" from "zero-sized
/// request" without re-deriving it from the returned pointer alone.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocError {
    /// The provider refused to extend the heap.
    OutOfMemory,
    /// The requested size (or, for `zero_allocate`, the `count * size` product) was zero.
    ZeroRequest,
    /// `free`/`reallocate` was given a pointer outside `[lo, hi)`.
    InvalidPointer,
}

impl Display for AllocError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => f.write_str("heap provider refused to extend"),
            AllocError::ZeroRequest => f.write_str("zero-sized allocation request"),
            AllocError::InvalidPointer => f.write_str("pointer outside heap bounds"),
        }
    }
}

/// Which invariant (§3/§8) a failed [`crate::mem::check`] pass was auditing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckFailure {
    /// Prologue or epilogue sentinel is missing or not marked allocated.
    BadSentinel,
    /// `prev_alloc` of a block disagrees with its left neighbor's `alloc` bit.
    PrevAllocMismatch,
    /// A payload pointer lies outside `[lo, hi)` or is not 8-byte aligned.
    OutOfBounds,
    /// A free block's header and footer disagree.
    HeaderFooterMismatch,
    /// Two adjacent blocks are both free.
    AdjacentFreeBlocks,
    /// A free-list edge has a pred/succ pointer that doesn't point back.
    BrokenListEdge,
    /// A free block sits in a size class whose range it does not fall into.
    WrongSizeClass,
    /// The free-block count from the heap walk disagrees with the free-list walk.
    CountMismatch,
}

impl Display for CheckFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let msg = match self {
            CheckFailure::BadSentinel => "prologue/epilogue sentinel corrupted",
            CheckFailure::PrevAllocMismatch => "prev_alloc bit disagrees with left neighbor",
            CheckFailure::OutOfBounds => "pointer out of heap bounds or misaligned",
            CheckFailure::HeaderFooterMismatch => "free block header/footer disagree",
            CheckFailure::AdjacentFreeBlocks => "two adjacent blocks are both free",
            CheckFailure::BrokenListEdge => "free-list pred/succ edge is inconsistent",
            CheckFailure::WrongSizeClass => "free block outside its size class's range",
            CheckFailure::CountMismatch => "free block count disagrees between walks",
        };
        f.write_str(msg)
    }
}

/// Carries which invariant failed, at which address, for which check mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckError {
    /// The check mode (0-8, see `check::Mode`) that was running.
    pub mode: u8,
    /// The invariant that failed.
    pub kind: CheckFailure,
    /// The address of the offending block, if the failure is block-local.
    pub at: usize,
}

impl Display for CheckError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "check(mode={}) failed at {:#x}: {}", self.mode, self.at, self.kind)
    }
}
