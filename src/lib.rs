//! Boundary-tag heap allocator over a growable arena.
//!
//! This crate implements the allocation engine usually hidden behind a
//! `malloc`/`free`/`realloc` facade: it owns a single contiguous memory
//! region, decides where requests are placed, recycles freed space through
//! free lists and grows the region when nothing fits. The region only ever
//! grows; payloads are aligned to 8 bytes.
//!
//! # Usage
//! The simplest way to use the crate is as the global allocator. Copy the
//! following into your binary crate and adjust the arena capacity (here
//! 64K), which bounds the heap statically:
//! ```no_run
//! #[global_allocator]
//! static ALLOCATOR: brkalloc::Allocator<{ 64 * 1024 }> = brkalloc::Allocator::new();
//!
//! extern crate alloc;
//! ```
//! Afterwards the usual collections (`alloc::vec::Vec`,
//! `alloc::collections::BTreeMap`, ...) work on `#![no_std]`-targets.
//!
//! For direct control — or to bring a different memory substrate — use
//! [`Heap`] itself:
//! ```
//! use brkalloc::{Arena, Heap};
//!
//! let mut heap = Heap::new(Arena::<4096>::new());
//! heap.init().unwrap();
//!
//! let p = heap.alloc(100).unwrap();
//! assert_eq!(p.offset() % 8, 0);
//! heap.free(p);
//! assert_eq!(heap.check(false), 0);
//! ```
//!
//! # Heap organization
//! The heap is carved into blocks, each starting with a 4-byte header that
//! packs the block size with an allocated-bit. Free blocks mirror the
//! header in a footer at their end, which makes merging with the physical
//! predecessor a constant-time operation; they also carry the links of a
//! doubly-linked free list in their first two payload words. A prologue
//! and an epilogue sentinel bracket the real blocks, so neighbor traversal
//! needs no boundary checks.
//!
//! Two layouts are selectable at build time:
//! - the default `segregated` feature maintains 24 free lists, one per
//!   size class, and elides the footer of *allocated* blocks by recording
//!   a block's state in bit 1 of its successor's header: 4 bytes saved
//!   per allocation;
//! - without it, a single free list serves all sizes and every block
//!   carries a footer.
//!
//! Searches are first-fit (from the request's size class upward); the
//! `next-fit` feature switches to a rover that resumes scanning where the
//! previous search stopped.
//!
//! # Logging
//! Cold paths (initialization, heap growth, the [`Heap::check`] auditor)
//! emit [`log`] records. When the crate serves as the global allocator,
//! the installed logger must not itself allocate, or those records will
//! re-enter the allocator lock.
#![cfg_attr(not(test), no_std)]
#![warn(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

mod heap;
mod substrate;

pub use heap::{BlockPtr, Heap, InitError, CHUNK_SIZE};
pub use substrate::{Arena, Substrate};

use core::alloc::{GlobalAlloc, Layout};
use core::ptr;

/// A `malloc`-style allocator with a fixed arena capacity of `N` bytes.
///
/// This wraps a [`Heap`] over an [`Arena`] in a spin lock, making it
/// usable with shared references as [`GlobalAlloc`] requires. The arena
/// is part of the value, so a `static` allocator reserves its whole heap
/// in the static memory image (uninitialized, hence in `.bss`).
///
/// The heap skeleton is written lazily on the first allocation; no setup
/// call is needed:
/// ```no_run
/// #[global_allocator]
/// static ALLOCATOR: brkalloc::Allocator<4096> = brkalloc::Allocator::new();
/// ```
pub struct Allocator<const N: usize> {
    /// The heap, locked for interior mutability ([`GlobalAlloc`] hands out
    /// shared references only).
    heap: spin::Mutex<Heap<Arena<N>>>,
}

impl<const N: usize> Allocator<N> {
    /// Create a new [`Allocator`].
    ///
    /// This function is a `const fn`, therefore you can call it directly
    /// when creating the allocator.
    ///
    /// # Panics
    /// This function will panic, if the arena capacity `N` is too small to
    /// bootstrap a heap or not divisible by `8`.
    #[must_use = "assign the allocator to a static variable and apply the `#[global_allocator]`-attribute to make it the global allocator"]
    pub const fn new() -> Self {
        assert!(
            N >= heap::MIN_REGION,
            "too small heap memory: the arena must hold the heap skeleton and one growth chunk"
        );
        let heap = spin::Mutex::new(Heap::new(Arena::new()));
        Self { heap }
    }

    /// Eagerly initialize the heap (optional; allocation does it lazily).
    ///
    /// # Errors
    /// Fails if the arena cannot back the heap skeleton.
    pub fn init(&self) -> Result<(), InitError> {
        self.heap.lock().init()
    }

    /// Audit the heap; see [`Heap::check`].
    pub fn check(&self, verbose: bool) -> usize {
        self.heap.lock().check(verbose)
    }

    /// Align a given pointer to the specified alignment.
    ///
    /// # Safety
    /// This function requires `align` to be a power of two and requires
    /// the `ptr` to point to a memory region, that is large enough, so
    /// that the aligned pointer is still in that memory region.
    unsafe fn align_to(ptr: *mut u8, align: usize) -> *mut u8 {
        let addr = ptr as usize;
        let mismatch = addr & (align - 1);
        let offset = if mismatch != 0 { align - mismatch } else { 0 };
        // SAFETY: "in-bound"-requirement is part of the safety-contract of
        // this function, therefore the caller is responsible for it
        unsafe { ptr.add(offset) }
    }
}

// SAFETY: the implementation adheres to the `GlobalAlloc` contract: it does
// not panic (on purpose), reports failure as a null pointer and returns
// blocks satisfying the layout's size and alignment (ensured by tests).
unsafe impl<const N: usize> GlobalAlloc for Allocator<N> {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let align = layout.align();
        // payloads are always 8-aligned, which covers the common case.
        // Larger alignments are served by a conservative over-allocation of
        // `align` extra bytes and bumping the payload pointer up.
        let size = if align > 8 {
            layout.size() + align
        } else {
            layout.size()
        };

        let mut heap = self.heap.lock();
        match heap.alloc(size) {
            Some(bp) => {
                let ptr = heap.payload_ptr(bp);
                // SAFETY: `align` is a power of two by the `Layout`
                // contract, and the block was enlarged above so the bumped
                // pointer stays inside its payload.
                unsafe { Self::align_to(ptr, align) }
            }
            None => ptr::null_mut(),
        }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, _layout: Layout) {
        // the pointer may have been bumped for alignment, so resolve the
        // containing block instead of assuming a payload start. Unknown
        // pointers are ignored: `GlobalAlloc` implementations must not
        // unwind, and there is no stable way to abort on `core`.
        let mut heap = self.heap.lock();
        if let Some(bp) = heap.block_containing(ptr) {
            heap.free(bp);
        }
    }
}
