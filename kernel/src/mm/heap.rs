//! Kernel heap: a fixed-size static region handed to `linked_list_allocator`,
//! the same global allocator the teacher wires up for bare-metal targets.

use crate::config::KERNEL_HEAP_SIZE;

#[repr(align(4096))]
struct HeapRegion([u8; KERNEL_HEAP_SIZE]);

static mut HEAP: HeapRegion = HeapRegion([0; KERNEL_HEAP_SIZE]);

/// Initialize the global allocator over the static heap region. Physical
/// memory is identity-mapped by [`super::init`] before this runs, so the
/// heap's compile-time address is already valid to write through.
pub fn init() {
    #[cfg(target_os = "none")]
    // SAFETY: `HEAP` is a `'static` region used for nothing else; this
    // runs exactly once, before any other code allocates.
    unsafe {
        let start = core::ptr::addr_of_mut!(HEAP) as usize;
        crate::get_allocator()
            .lock()
            .init(start as *mut u8, KERNEL_HEAP_SIZE);
    }
}
