//! Size-classed free lists threaded through the free blocks themselves.
//!
//! A free block donates its first two payload words to the list: the first
//! holds the link to the next block of the class, the second the link back.
//! Links are offsets relative to the prologue block pointer; 0 is "none".
//! Insertion is LIFO at the class head, so a just-freed block is the first
//! candidate for reuse.

use crate::substrate::Substrate;

use super::{Heap, WSIZE};

/// Number of free-list head words in front of the prologue.
pub(crate) const CLASS_COUNT: usize = if cfg!(feature = "segregated") { 24 } else { 1 };

/// Upper bounds of the size classes, scanned in order; the last class is
/// unbounded. The table is intentionally not sorted: the 32768 entry is
/// shadowed by the preceding 40000 and exists to keep its class stable.
const CLASS_LIMITS: [usize; 23] = [
    16,
    24,
    48,
    128,
    256,
    512,
    1024,
    2048,
    4096,
    9200,
    12000,
    16000,
    20000,
    24000,
    28000,
    32000,
    40000,
    1 << 15,
    1 << 16,
    1 << 17,
    1 << 18,
    1 << 19,
    1 << 20,
];

/// The class serving blocks of `size` bytes: the first class whose upper
/// bound is large enough.
pub(crate) fn class_of(size: usize) -> usize {
    if !cfg!(feature = "segregated") {
        return 0;
    }
    CLASS_LIMITS
        .iter()
        .position(|&limit| size <= limit)
        .unwrap_or(CLASS_COUNT - 1)
}

impl<S: Substrate> Heap<S> {
    /// Offset of the head word of `class`.
    pub(crate) fn head_word(&self, class: usize) -> usize {
        self.index_base + class * WSIZE
    }

    /// Link stored in the head word of `class`; 0 for an empty list.
    pub(crate) fn class_head(&self, class: usize) -> u32 {
        self.word(self.head_word(class))
    }

    /// Forward link of the free block at `bp`.
    pub(crate) fn link_next(&self, bp: usize) -> u32 {
        self.word(bp)
    }

    /// Backward link of the free block at `bp`.
    pub(crate) fn link_prev(&self, bp: usize) -> u32 {
        self.word(bp + WSIZE)
    }

    /// Encode a block pointer as a link.
    pub(crate) fn link_of(&self, bp: usize) -> u32 {
        debug_assert!(bp > self.base);
        (bp - self.base) as u32
    }

    /// Decode a link back into a block pointer. Must not be called with 0.
    pub(crate) fn bp_of(&self, link: u32) -> usize {
        debug_assert!(link != 0);
        self.base + link as usize
    }

    /// Push the free block at `bp` onto the head of its class list.
    pub(crate) fn freelist_insert(&mut self, bp: usize) {
        let class = class_of(self.header(bp).size());
        let head = self.head_word(class);
        let first = self.word(head);
        let link = self.link_of(bp);

        if first == 0 {
            self.set_word(bp, 0);
            self.set_word(bp + WSIZE, 0);
        } else {
            self.set_word(bp, first);
            self.set_word(bp + WSIZE, 0);
            let first_bp = self.bp_of(first);
            self.set_word(first_bp + WSIZE, link);
        }
        self.set_word(head, link);
    }

    /// Unlink the free block at `bp` from its class list.
    pub(crate) fn freelist_remove(&mut self, bp: usize) {
        let class = class_of(self.header(bp).size());
        match (self.link_next(bp), self.link_prev(bp)) {
            // only member
            (0, 0) => {
                let head = self.head_word(class);
                self.set_word(head, 0);
            }
            // list tail
            (0, prev) => {
                let prev_bp = self.bp_of(prev);
                self.set_word(prev_bp, 0);
            }
            // list head
            (next, 0) => {
                let next_bp = self.bp_of(next);
                self.set_word(next_bp + WSIZE, 0);
                let head = self.head_word(class);
                self.set_word(head, next);
            }
            // interior
            (next, prev) => {
                let prev_bp = self.bp_of(prev);
                let next_bp = self.bp_of(next);
                self.set_word(prev_bp, next);
                self.set_word(next_bp + WSIZE, prev);
            }
        }
    }

    /// Find a free block of at least `asize` bytes.
    pub(crate) fn find_fit(&mut self, asize: usize) -> Option<usize> {
        if cfg!(feature = "next-fit") {
            return self.next_fit(asize);
        }
        (class_of(asize)..CLASS_COUNT).find_map(|class| self.first_fit_in(class, asize))
    }

    /// First fit over a single class list.
    ///
    /// Only classes at or above the request's own class are scanned, so any
    /// hit satisfies the size bound without sorting inside a class.
    fn first_fit_in(&self, class: usize, asize: usize) -> Option<usize> {
        let mut link = self.class_head(class);
        while link != 0 {
            let bp = self.bp_of(link);
            if self.header(bp).size() >= asize {
                return Some(bp);
            }
            link = self.link_next(bp);
        }
        None
    }

    /// Next-fit: resume the physical-sequence walk where the previous
    /// search stopped, wrapping at the epilogue.
    fn next_fit(&mut self, asize: usize) -> Option<usize> {
        let start = self.rover;

        loop {
            let tag = self.header(self.rover);
            if tag.size() == 0 {
                break;
            }
            if !tag.is_allocated() && tag.size() >= asize {
                return Some(self.rover);
            }
            self.rover = self.next_block(self.rover);
        }

        self.rover = self.base;
        while self.rover < start {
            let tag = self.header(self.rover);
            if !tag.is_allocated() && tag.size() >= asize {
                return Some(self.rover);
            }
            self.rover = self.next_block(self.rover);
        }

        None
    }
}
