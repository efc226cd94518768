//! Kernel-wide compile-time configuration.
//!
//! Every fixed-capacity table and every address-space boundary used by the
//! rest of the kernel is named here instead of scattered as magic numbers,
//! mirroring the address-space layout this kernel was designed against.

/// Size of a physical frame / virtual page.
pub const PAGE_SIZE: usize = 4096;
/// log2(PAGE_SIZE), used for shifting virtual/physical addresses.
pub const PAGE_SHIFT: usize = 12;
/// Entries per page-table level (1024 32-bit entries fill one page).
pub const PTE_ENTRIES: usize = 1024;

/// Start of user text/data/heap. Below this is a permanently unmapped guard
/// region that catches null-pointer-style bugs.
pub const UTEXT: u32 = 0x0080_0000;

/// Top of the normal user stack (one page below is the mapped stack page).
pub const USTACKTOP: u32 = 0xEEBF_E000;

/// Top of the user exception stack (one page below is the mapped xstack
/// page). Lives directly below `USTACKTOP` with a one-page gap so a
/// blown-out normal stack can't silently clobber the exception stack.
pub const UXSTACKTOP: u32 = 0xEEBF_F000;

/// First address of the read-only user-visible kernel region (environment
/// table mirror, page-table self-map).
pub const UTOP: u32 = 0xEEC0_0000;

/// First address reserved exclusively for the kernel. `[UTOP, ULIM)` is
/// mapped read-only into every address space; `[ULIM, 4G)` is kernel-only.
pub const ULIM: u32 = 0xEF00_0000;

/// Fixed index into the root page table that maps the table back onto
/// itself, producing the `uvpt`/`uvpd` self-map window.
pub const PDX_SELFMAP: usize = 0x3BD;

/// Base virtual address of the self-mapped page-table window (`uvpt`).
pub const UVPT: u32 = (PDX_SELFMAP as u32) << 22;

/// Number of environment-table slots. Fixed capacity: no growth, no heap
/// allocation for the table itself.
pub const NENV: usize = 1024;

/// Number of snapshot-table slots.
pub const NSNAPSHOT: usize = 64;

/// Number of transmit descriptors in the NIC TX ring.
pub const E1000_NUM_TXDESC: usize = 64;
/// Number of receive descriptors in the NIC RX ring.
pub const E1000_NUM_RXDESC: usize = 128;
/// Per-descriptor TX packet buffer size. Packets longer than this are
/// rejected with `PKT_TOO_LONG` before ever touching a descriptor.
pub const E1000_TX_BUF_SIZE: usize = 1518;
/// Per-descriptor RX packet buffer size (matches `RCTL` `SZ_2048`).
pub const E1000_RX_BUF_SIZE: usize = 2048;
/// Default station MAC address, reconfigurable at runtime.
pub const E1000_DEFAULT_MAC: [u8; 6] = [0x52, 0x54, 0x00, 0x12, 0x34, 0x56];

/// Size of the fixed kernel heap region.
pub const KERNEL_HEAP_SIZE: usize = 4 * 1024 * 1024;

/// Per-environment kernel stack size.
pub const KSTACK_SIZE: usize = PAGE_SIZE * 2;

/// Total physical memory the frame allocator is told about at boot, in
/// frames. Bootloader-provided memory-map parsing is out of scope (the
/// boot loader is an external collaborator per the design notes); this is
/// a fixed, conservative stand-in for the real `multiboot`/e820 probe.
pub const PHYS_MEM_TOTAL_FRAMES: u32 = 16384; // 64 MiB at 4 KiB frames

/// Frames permanently reserved for the kernel image, boot page tables, and
/// the kernel heap, counted from frame 0.
pub const KERNEL_RESERVED_FRAMES: u32 = 1024; // 4 MiB
