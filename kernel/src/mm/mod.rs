//! Memory management: physical frames, two-level page tables, the kernel
//! heap, and page-fault handling.

pub mod frame_allocator;
pub mod heap;
pub mod page_fault;
pub mod page_table;

use spin::Mutex;

use crate::config::{KERNEL_RESERVED_FRAMES, PHYS_MEM_TOTAL_FRAMES, ULIM};
use frame_allocator::FRAME_ALLOCATOR;
use page_table::PageTable;

/// The kernel's own page directory. Its upper entries (everything from
/// `ULIM` up) are copied into every environment's page directory, so the
/// kernel's mappings are identical and always present regardless of which
/// environment's `cr3` is loaded.
static KERNEL_PGDIR: Mutex<PageTable> = Mutex::new(PageTable::empty());

/// Bring up the frame allocator, build the kernel's half of the page
/// directory (identity-mapping all of physical memory, since there is no
/// demand paging), load `cr3`, and initialize the kernel heap.
pub fn init() {
    FRAME_ALLOCATOR.init(PHYS_MEM_TOTAL_FRAMES, 0, KERNEL_RESERVED_FRAMES);

    {
        use page_table::{split_va, PteFlags};
        let mut pgdir = KERNEL_PGDIR.lock();
        // Identity-map all of physical memory 1:1 so `phys_to_virt` is a
        // no-op and the kernel can always dereference any frame it owns.
        let total_bytes = (PHYS_MEM_TOTAL_FRAMES as u64) * (crate::config::PAGE_SIZE as u64);
        let mut va: u32 = 0;
        while (va as u64) < total_bytes && va < ULIM {
            let (pdx, ptx, _) = split_va(va);
            let frame = frame_allocator::PhysicalFrame::from_addr(va);
            let table_frame = match pgdir.entries[pdx].is_present() {
                true => pgdir.entries[pdx].frame(),
                false => {
                    let tf = FRAME_ALLOCATOR
                        .alloc()
                        .expect("out of memory building kernel page tables");
                    // SAFETY: `tf` was just allocated and is identity-mapped
                    // already by the frames mapped so far below `va`.
                    unsafe {
                        *(tf.addr() as *mut PageTable) = PageTable::empty();
                    }
                    pgdir.entries[pdx] =
                        page_table::Pte::new(tf, PteFlags::PRESENT | PteFlags::WRITABLE);
                    tf
                }
            };
            // SAFETY: `table_frame` is identity-mapped and holds a live
            // `PageTable` (just zeroed above if freshly allocated).
            let table = unsafe { &mut *(table_frame.addr() as *mut PageTable) };
            table.entries[ptx] =
                page_table::Pte::new(frame, PteFlags::PRESENT | PteFlags::WRITABLE);
            va += crate::config::PAGE_SIZE as u32;
        }
        load_cr3(pgdir.entries.as_ptr() as u32);
    }

    heap::init();
}

pub fn kernel_pgdir() -> spin::MutexGuard<'static, PageTable> {
    KERNEL_PGDIR.lock()
}

fn load_cr3(pgdir_phys: u32) {
    // SAFETY: `pgdir_phys` points at a fully populated, identity-mapped
    // page directory built above; every virtual address the kernel
    // currently executes from and references remains mapped after the
    // switch.
    unsafe {
        core::arch::asm!("mov cr3, {}", in(reg) pgdir_phys, options(nostack, preserves_flags));
    }
}
