//! Minimal kernel heap.
//!
//! Physical frame and virtual memory management are out of this core's
//! scope (see `SPEC_FULL.md` §2, external collaborators) — the real
//! buddy/slab/VMA machinery the source kernel ships lives outside this
//! crate. What the IPC core still needs is `alloc` (the task directory is
//! an ordered map, tasks are `Arc`-shared, sessions own `Vec`s of pending
//! requests), so this module wires `linked_list_allocator` onto a static
//! backing region just large enough for a single-node developer build.
//! A real deployment replaces this with the VMM-backed heap and never
//! touches this file.

use linked_list_allocator::LockedHeap;

const HEAP_SIZE: usize = 1024 * 1024;

#[repr(align(4096))]
struct HeapRegion([u8; HEAP_SIZE]);

static mut HEAP_REGION: HeapRegion = HeapRegion([0; HEAP_SIZE]);

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Initializes the heap. Must be called exactly once, before the first
/// allocation, from `kernel_main`.
pub fn init() {
    unsafe {
        let region_ptr = core::ptr::addr_of_mut!(HEAP_REGION);
        ALLOCATOR
            .lock()
            .init((*region_ptr).0.as_mut_ptr(), HEAP_SIZE);
    }
}
