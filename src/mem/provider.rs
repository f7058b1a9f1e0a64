//! The heap-region collaborator (§6 "Provider contract").
//!
//! Everything in this module other than [`HeapProvider`] itself is a stand-in for the real
//! process-level `brk`/`sbrk` provider a hosting environment supplies — this crate's job stops
//! at the trait boundary. The `VecHeapProvider` below exists only so the allocator is testable
//! (and so the diagnostic CLI in `src/bin/heapcheck.rs` has something to run against) without a
//! real OS-backed heap.

/// A contiguous, monotonically growable byte region.
///
/// Implementors own the actual backing storage and must guarantee that bytes already handed
/// out by a prior `extend` stay valid and at the same address for the lifetime of the
/// provider — the allocator never relocates the heap.
pub trait HeapProvider {
    /// Inclusive low byte address of the heap. Fixed for the lifetime of the provider.
    fn heap_lo(&self) -> usize;

    /// Inclusive high byte address of the heap. Grows as `extend` is called.
    fn heap_hi(&self) -> usize;

    /// Grows the heap by `n_bytes` (a multiple of 8) and returns the start address of the new
    /// region, or `None` if the provider is exhausted.
    fn extend(&mut self, n_bytes: usize) -> Option<*mut u8>;
}

#[cfg(any(test, feature = "std"))]
pub use hosted::VecHeapProvider;

#[cfg(any(test, feature = "std"))]
mod hosted {
    extern crate std;

    use std::vec::Vec;

    use super::HeapProvider;

    /// A `std`-backed [`HeapProvider`] used by this crate's own tests and by the diagnostic CLI.
    ///
    /// Backed by a single growable `Vec<u8>` reserved up front to `cap` bytes so that `extend`
    /// never triggers a reallocation (which would move already-handed-out addresses and violate
    /// the provider contract).
    pub struct VecHeapProvider {
        storage: Vec<u8>,
        used: usize,
        cap: usize,
    }

    impl VecHeapProvider {
        /// Creates a provider whose backing storage can grow up to `cap` bytes.
        pub fn with_capacity(cap: usize) -> Self {
            let mut storage = Vec::with_capacity(cap);
            storage.resize(cap, 0u8);
            Self { storage, used: 0, cap }
        }
    }

    impl HeapProvider for VecHeapProvider {
        fn heap_lo(&self) -> usize {
            self.storage.as_ptr() as usize
        }

        fn heap_hi(&self) -> usize {
            self.storage.as_ptr() as usize + self.used
        }

        fn extend(&mut self, n_bytes: usize) -> Option<*mut u8> {
            if self.used + n_bytes > self.cap {
                return None;
            }
            let start = unsafe { self.storage.as_mut_ptr().add(self.used) };
            self.used += n_bytes;
            Some(start)
        }
    }
}
