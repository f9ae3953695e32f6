//! The memory substrate backing a [`Heap`](crate::Heap).
//!
//! The allocator itself never talks to the operating system. It asks a
//! [`Substrate`] for more bytes and reads/writes the bytes handed out so
//! far. The substrate owns the backing memory and the current region size;
//! the region only ever grows.
//!
//! This crate ships a single implementation, [`Arena`]: a fixed-capacity
//! byte buffer embedded in the value itself, so a `Heap<Arena<N>>` can live
//! in a `static` without touching the OS at all. Other substrates (e.g. one
//! backed by `sbrk` or a memory-mapped region) can be plugged in by
//! implementing the trait.

use core::mem::MaybeUninit;

/// A monotonically growable, contiguous memory region.
///
/// Offsets into the region are stable: once `extend` has handed out the
/// range `start..start + n`, those bytes stay valid (and at the same
/// offsets) for the lifetime of the substrate. The region never shrinks.
pub trait Substrate {
    /// Grow the region by exactly `n` bytes.
    ///
    /// Returns the offset of the first newly mapped byte, or `None` if the
    /// substrate cannot grow any further. The caller guarantees `n` is a
    /// multiple of 8, so an 8-aligned region stays 8-aligned.
    fn extend(&mut self, n: usize) -> Option<usize>;

    /// The currently mapped bytes, from offset 0 up to the region size.
    fn bytes(&self) -> &[MaybeUninit<u8>];

    /// Mutable view of the currently mapped bytes.
    fn bytes_mut(&mut self) -> &mut [MaybeUninit<u8>];
}

/// The buffer memory backing an [`Arena`].
///
/// The alignment guarantees, that offset arithmetic on the arena agrees
/// with address arithmetic: an 8-aligned offset is an 8-aligned address.
#[repr(align(8))]
struct ArenaMemory<const N: usize>([MaybeUninit<u8>; N]);

/// A fixed-capacity substrate: up to `N` bytes of inline storage with a
/// monotonic break.
///
/// `extend` bumps the break until the capacity is exhausted; the memory
/// beyond the break stays uninitialized, so a large `static` arena occupies
/// `.bss` rather than the binary image.
pub struct Arena<const N: usize> {
    memory: ArenaMemory<N>,
    /// Current region size; everything below is mapped.
    brk: usize,
}

impl<const N: usize> Arena<N> {
    /// Create a new, empty [`Arena`].
    ///
    /// This function is a `const fn`, therefore the arena (wrapped in a
    /// [`Heap`](crate::Heap) or [`Allocator`](crate::Allocator)) can be
    /// assigned to a `static` directly.
    ///
    /// # Panics
    /// This function will panic, if the capacity `N` is not divisible
    /// by `8`.
    #[must_use]
    pub const fn new() -> Self {
        assert!(N % 8 == 0, "arena capacity has to be divisible by 8");
        Self {
            memory: ArenaMemory([MaybeUninit::uninit(); N]),
            brk: 0,
        }
    }

    /// The fixed capacity in bytes.
    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Substrate for Arena<N> {
    fn extend(&mut self, n: usize) -> Option<usize> {
        debug_assert!(n % 8 == 0);
        let old_brk = self.brk;
        if n > N - old_brk {
            return None;
        }
        self.brk = old_brk + n;
        Some(old_brk)
    }

    fn bytes(&self) -> &[MaybeUninit<u8>] {
        &self.memory.0[..self.brk]
    }

    fn bytes_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        &mut self.memory.0[..self.brk]
    }
}

impl<const N: usize> Default for Arena<N> {
    fn default() -> Self {
        Self::new()
    }
}
