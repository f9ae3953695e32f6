//! Consistency audit over the whole heap.
//!
//! The checker is a debugging aid: it sweeps the physical block sequence
//! and the free lists, logs every violation it finds and reports how many
//! there were. It is meant to run in tests after a sequence of operations;
//! the allocation hot path never validates anything.

use crate::substrate::Substrate;

use super::freelist::{class_of, CLASS_COUNT};
use super::{Heap, DSIZE, MIN_BLOCK};

impl<S: Substrate> Heap<S> {
    /// Audit the heap and return the number of violations found.
    ///
    /// Checks the sentinel blocks, per-block alignment and minimum size,
    /// header/footer agreement and maximal coalescing, the predecessor
    /// state bits (segregated layout) and the free lists: membership,
    /// class assignment, link symmetry and population. Violations are
    /// logged via [`log::error!`]; with `verbose` set, every block is
    /// additionally logged via [`log::debug!`].
    ///
    /// An uninitialized heap audits clean.
    pub fn check(&self, verbose: bool) -> usize {
        if self.base == 0 {
            return 0;
        }
        let mut errors = Audit::default();

        if verbose {
            log::debug!(
                "auditing heap: {} bytes mapped, base at {:#x}",
                self.heap_size(),
                self.base
            );
        }

        let prologue = self.header(self.base);
        if prologue.size() != DSIZE || !prologue.is_allocated() {
            errors.report(self.base, "bad prologue header");
        }
        if self.footer(self.base).boundary_bits() != prologue.boundary_bits() {
            errors.report(self.base, "bad prologue footer");
        }

        let physical_free = self.check_blocks(verbose, &mut errors);
        let listed_free = self.check_freelists(&mut errors);
        if physical_free != listed_free {
            log::error!(
                "free lists hold {listed_free} block(s), the heap holds {physical_free}"
            );
            errors.0 += 1;
        }

        errors.0
    }

    /// Sweep the physical block sequence; returns the free block count.
    fn check_blocks(&self, verbose: bool, errors: &mut Audit) -> usize {
        let mut free_blocks = 0;
        let mut prev_free = false;
        let mut prev_allocated = true; // the prologue
        let mut bp = self.next_block(self.base);

        loop {
            let tag = self.header(bp);
            if tag.size() == 0 {
                // the epilogue terminates the sweep
                if verbose {
                    log::debug!("{bp:#x}: epilogue {tag:?}");
                }
                if !tag.is_allocated() {
                    errors.report(bp, "epilogue is not allocated");
                }
                if bp != self.heap_size() {
                    errors.report(bp, "epilogue is not at the region end");
                }
                if cfg!(feature = "segregated") && tag.prev_allocated() != prev_allocated {
                    errors.report(bp, "epilogue has a stale predecessor bit");
                }
                break;
            }

            if verbose {
                log::debug!("{bp:#x}: {tag:?}");
            }
            if bp % DSIZE != 0 {
                errors.report(bp, "payload is not doubleword aligned");
            }
            if tag.size() < MIN_BLOCK {
                errors.report(bp, "block is below the minimum size");
            }
            if tag.is_allocated() {
                prev_free = false;
            } else {
                free_blocks += 1;
                if self.footer(bp).boundary_bits() != tag.boundary_bits() {
                    errors.report(bp, "header does not match footer");
                }
                if prev_free {
                    errors.report(bp, "two adjacent free blocks");
                }
                prev_free = true;
            }
            if cfg!(feature = "segregated") && tag.prev_allocated() != prev_allocated {
                errors.report(bp, "stale predecessor bit");
            }

            prev_allocated = tag.is_allocated();
            bp = self.next_block(bp);
        }

        free_blocks
    }

    /// Walk every free list; returns the total number of listed blocks.
    fn check_freelists(&self, errors: &mut Audit) -> usize {
        // corrupted links could cycle; a list can never hold more blocks
        // than fit in the region
        let cap = self.heap_size() / MIN_BLOCK + 1;
        let mut listed = 0;

        for class in 0..CLASS_COUNT {
            let mut prev_link = 0;
            let mut link = self.class_head(class);
            while link != 0 {
                if listed > cap {
                    log::error!("free list of class {class} does not terminate");
                    errors.0 += 1;
                    return listed;
                }
                let bp = self.bp_of(link);
                let tag = self.header(bp);
                listed += 1;

                if tag.is_allocated() {
                    errors.report(bp, "allocated block on a free list");
                }
                if class_of(tag.size()) != class {
                    errors.report(bp, "block is listed in the wrong size class");
                }
                if self.link_prev(bp) != prev_link {
                    errors.report(bp, "free-list links are not symmetric");
                }

                prev_link = link;
                link = self.link_next(bp);
            }
        }

        listed
    }
}

/// Violation counter; reporting goes through the log.
#[derive(Default)]
struct Audit(usize);

impl Audit {
    fn report(&mut self, bp: usize, what: &str) {
        log::error!("block at {bp:#x}: {what}");
        self.0 += 1;
    }
}
