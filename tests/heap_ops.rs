//! End-to-end exercises of the [`brkalloc::Heap`] API.
//!
//! Payload locations are asserted as offsets from the region start, which
//! is stable across runs; the audit ([`brkalloc::Heap::check`]) is run
//! after every sequence to make sure no invariant was harmed.

use core::mem::MaybeUninit;

use brkalloc::{Arena, Heap, CHUNK_SIZE};

fn fresh<const N: usize>() -> Heap<Arena<N>> {
    let mut heap = Heap::new(Arena::new());
    heap.init().unwrap();
    heap
}

#[test]
fn init_then_single_alloc() {
    let mut heap = fresh::<16384>();
    let p = heap.alloc(1).unwrap();

    assert_eq!(p.offset() % 8, 0);
    assert_eq!(heap.block_size(p), 16);
    assert_eq!(heap.check(false), 0);
}

#[test]
fn payloads_hold_the_requested_bytes() {
    let mut heap = fresh::<16384>();
    for n in [1, 7, 8, 9, 100, 1000] {
        let p = heap.alloc(n).unwrap();
        assert_eq!(p.offset() % 8, 0);
        assert!(heap.payload(p).len() >= n);
    }
    assert_eq!(heap.check(false), 0);
}

#[test]
fn free_returns_the_space_for_reuse() {
    let mut heap = fresh::<16384>();
    let p = heap.alloc(64).unwrap();
    heap.free(p);
    assert_eq!(heap.check(false), 0);

    let q = heap.alloc(64).unwrap();
    if !cfg!(feature = "next-fit") {
        assert_eq!(q.offset(), p.offset());
    }
    assert_eq!(heap.check(false), 0);
}

#[test]
fn freeing_in_any_order_coalesces_fully() {
    let mut heap = fresh::<16384>();
    let a = heap.alloc(24).unwrap();
    let b = heap.alloc(24).unwrap();
    let c = heap.alloc(24).unwrap();
    let _guard = heap.alloc(24).unwrap();

    heap.free(a);
    heap.free(c);
    heap.free(b); // the middle free merges all three

    // no free block pair may remain adjacent
    assert_eq!(heap.check(false), 0);

    // the merged block serves a request none of the parts could
    let q = heap.alloc(88).unwrap();
    assert!(heap.block_size(q) >= 96);
    if !cfg!(feature = "next-fit") {
        assert_eq!(q.offset(), a.offset());
    }
    assert_eq!(heap.check(false), 0);
}

#[test]
fn realloc_grows_and_preserves_the_payload() {
    let mut heap = fresh::<16384>();
    let p = heap.alloc(8).unwrap();
    heap.payload_mut(p)[..8].fill(MaybeUninit::new(b'X'));

    let q = heap.realloc(Some(p), 64).unwrap();
    assert_ne!(q.offset(), p.offset());
    for byte in &heap.payload(q)[..8] {
        // SAFETY: the bytes were written before the resize and resizing
        // preserves the common prefix
        assert_eq!(unsafe { byte.assume_init() }, b'X');
    }
    assert_eq!(heap.check(false), 0);
}

#[test]
fn the_heap_grows_on_demand() {
    let mut heap = fresh::<65536>();
    let initial = heap.heap_size();

    let mut offsets = Vec::new();
    let mut total = 0;
    while total <= CHUNK_SIZE {
        let p = heap.alloc(100).unwrap();
        assert_eq!(p.offset() % 8, 0);
        offsets.push(p.offset());
        total += heap.block_size(p);
    }

    assert!(heap.heap_size() > initial, "allocations must trigger growth");
    // all payloads are distinct blocks
    let count = offsets.len();
    offsets.sort_unstable();
    offsets.dedup();
    assert_eq!(offsets.len(), count);
    assert_eq!(heap.check(false), 0);
}

#[test]
fn calloc_provides_zeroed_payloads() {
    let mut heap = fresh::<16384>();
    // dirty a block first, then let calloc reuse the space
    let p = heap.alloc(64).unwrap();
    heap.payload_mut(p).fill(MaybeUninit::new(0xEE));
    heap.free(p);

    let q = heap.calloc(16, 4).unwrap();
    for byte in &heap.payload(q)[..64] {
        // SAFETY: calloc zeroes the payload
        assert_eq!(unsafe { byte.assume_init() }, 0);
    }
    assert_eq!(heap.check(false), 0);
}

#[test]
fn exhaustion_is_reported_not_fatal() {
    let mut heap = fresh::<1024>();

    assert_eq!(heap.alloc(100_000), None);
    assert_eq!(heap.realloc(None, 100_000), None);
    assert_eq!(heap.calloc(1000, 1000), None);
    assert_eq!(heap.check(false), 0);

    // the heap is still serviceable
    let p = heap.alloc(16).unwrap();
    heap.free(p);
    assert_eq!(heap.check(false), 0);
}

#[test]
fn interleaved_lifecycles_keep_the_heap_sound() {
    let mut heap = fresh::<65536>();
    let mut live = Vec::new();

    for round in 1..=6_usize {
        for n in [8, 24, 120, 500] {
            live.push(heap.alloc(n * round % 900 + 1).unwrap());
        }
        // drop every other block
        let mut index = 0;
        live.retain(|&bp| {
            index += 1;
            if index % 2 == 0 {
                heap.free(bp);
                false
            } else {
                true
            }
        });
        assert_eq!(heap.check(false), 0);
    }

    for bp in live {
        heap.free(bp);
    }
    assert_eq!(heap.check(false), 0);
}
