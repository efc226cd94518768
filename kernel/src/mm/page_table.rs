//! Two-level x86 paging: a 1024-entry page directory whose entries each
//! point at a 1024-entry page table, each entry mapping one 4 KiB page.
//! One page-directory slot ([`PDX_SELFMAP`](crate::config::PDX_SELFMAP))
//! maps the directory back onto itself, so `UVPT`/`UVPD` let user code walk
//! its own page tables read-only without a dedicated syscall.

use bitflags::bitflags;

use crate::config::{PDX_SELFMAP, UTOP, UVPT};
use crate::error::{KernelError, KernelResult};
use crate::mm::frame_allocator::{PhysicalFrame, FRAME_ALLOCATOR};

bitflags! {
    /// PTE/PDE bits. The topmost available bit doubles as the copy-on-write
    /// marker the user fork library reads via `uvpt`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PteFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const CACHE_DISABLE = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const PAGE_SIZE     = 1 << 7;
        const GLOBAL        = 1 << 8;
        const AVAIL0        = 1 << 9;
        const AVAIL1        = 1 << 10;
        const COW           = 1 << 11;
    }
}

const ADDR_MASK: u32 = 0xFFFF_F000;

/// One page-table/page-directory slot.
#[derive(Debug, Clone, Copy, Default)]
#[repr(transparent)]
pub struct Pte(u32);

impl Pte {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn new(frame: PhysicalFrame, flags: PteFlags) -> Self {
        Self((frame.addr() & ADDR_MASK) | flags.bits())
    }

    pub fn flags(self) -> PteFlags {
        PteFlags::from_bits_truncate(self.0)
    }

    pub fn frame(self) -> PhysicalFrame {
        PhysicalFrame::from_addr(self.0 & ADDR_MASK)
    }

    pub fn is_present(self) -> bool {
        self.flags().contains(PteFlags::PRESENT)
    }
}

#[repr(C, align(4096))]
pub struct PageTable {
    pub entries: [Pte; 1024],
}

impl PageTable {
    pub const fn empty() -> Self {
        Self {
            entries: [Pte::empty(); 1024],
        }
    }
}

/// Split a 32-bit linear address into directory index, table index, and
/// in-page offset.
pub fn split_va(va: u32) -> (usize, usize, u32) {
    (
        (va >> 22) as usize & 0x3FF,
        (va >> 12) as usize & 0x3FF,
        va & 0xFFF,
    )
}

pub fn page_addr(pdx: usize, ptx: usize) -> u32 {
    ((pdx as u32) << 22) | ((ptx as u32) << 12)
}

/// A process's root page directory, plus the frame it's allocated in
/// (needed to load `cr3` and to free it when the environment is reaped).
pub struct AddressSpace {
    pub pgdir_frame: PhysicalFrame,
    pgdir: *mut PageTable,
}

impl AddressSpace {
    /// Allocate a fresh page directory, self-map it at `PDX_SELFMAP`, and
    /// copy in the kernel's half of the mapping (everything at or above
    /// [`UTOP`](crate::config::UTOP), shared identically by every
    /// environment) from `kernel_pgdir`.
    pub fn new(kernel_pgdir: &PageTable) -> KernelResult<Self> {
        let frame = FRAME_ALLOCATOR.alloc()?;
        // SAFETY: `frame` was just allocated and is owned solely by this
        // address space until it's torn down; `phys_to_virt` is identity
        // during the kernel's own execution window (no demand paging).
        let pgdir = unsafe { phys_to_virt(frame) };
        // SAFETY: `pgdir` points at a just-allocated, uniquely-owned frame
        // sized and aligned for a `PageTable`.
        unsafe {
            (*pgdir) = PageTable::empty();
            for i in (PDX_SELFMAP + 1)..1024 {
                (*pgdir).entries[i] = kernel_pgdir.entries[i];
            }
            // No `WRITABLE`: `uvpt`/`uvpd` are read-only from user mode, per
            // the fork library's need to inspect CoW bits without being
            // able to corrupt its own page tables through them.
            (*pgdir).entries[PDX_SELFMAP] = Pte::new(frame, PteFlags::PRESENT | PteFlags::USER);
        }
        Ok(Self {
            pgdir_frame: frame,
            pgdir,
        })
    }

    pub fn root(&self) -> &PageTable {
        // SAFETY: `self.pgdir` is valid for the lifetime of `self`.
        unsafe { &*self.pgdir }
    }

    fn root_mut(&mut self) -> &mut PageTable {
        // SAFETY: `self.pgdir` is valid for the lifetime of `self`, and
        // `&mut self` proves unique access.
        unsafe { &mut *self.pgdir }
    }

    /// Find the leaf PTE for `va`, allocating the second-level table if
    /// `create` is set and one doesn't exist yet. Returns `None` when
    /// `create` is false and no second-level table is present -- callers
    /// must treat that the same as "not mapped", never dereference through
    /// it.
    pub fn walk(&mut self, va: u32, create: bool) -> KernelResult<Option<*mut Pte>> {
        let (pdx, ptx, _) = split_va(va);
        let pde = self.root().entries[pdx];
        let table_frame = if pde.is_present() {
            pde.frame()
        } else {
            if !create {
                return Ok(None);
            }
            let frame = FRAME_ALLOCATOR.alloc()?;
            // SAFETY: freshly allocated frame, owned by this address space.
            unsafe {
                (*phys_to_virt::<PageTable>(frame)) = PageTable::empty();
            }
            self.root_mut().entries[pdx] =
                Pte::new(frame, PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER);
            frame
        };
        // SAFETY: `table_frame` holds a live, page-table-sized structure
        // either just allocated above or previously installed by `walk`/
        // `map`.
        let table = unsafe { phys_to_virt::<PageTable>(table_frame) };
        // SAFETY: `table` is a valid `*mut PageTable`; `ptx < 1024`.
        Ok(Some(unsafe { &mut (*table).entries[ptx] as *mut Pte }))
    }

    /// Install a mapping, incrementing the target frame's refcount. Any
    /// previous mapping at `va` is torn down first (its frame decref'd)
    /// so remapping never leaks a reference.
    pub fn map(&mut self, va: u32, frame: PhysicalFrame, flags: PteFlags) -> KernelResult<()> {
        if va & 0xFFF != 0 {
            return Err(KernelError::Inval);
        }
        FRAME_ALLOCATOR.incref(frame);
        let slot = self
            .walk(va, true)?
            .expect("walk(create=true) always yields a slot");
        // SAFETY: `slot` was just produced by `walk` against this address
        // space's own tables.
        let old = unsafe { *slot };
        // SAFETY: see above.
        unsafe {
            *slot = Pte::new(frame, flags | PteFlags::PRESENT);
        }
        invlpg(va);
        if old.is_present() {
            FRAME_ALLOCATOR.decref(old.frame());
        }
        Ok(())
    }

    /// Remove the mapping at `va`, if any, decref'ing its frame.
    pub fn unmap(&mut self, va: u32) -> KernelResult<()> {
        if let Some(slot) = self.walk(va, false)? {
            // SAFETY: `slot` came from `walk` against this address space.
            let pte = unsafe { *slot };
            if pte.is_present() {
                // SAFETY: see above.
                unsafe {
                    *slot = Pte::empty();
                }
                invlpg(va);
                FRAME_ALLOCATOR.decref(pte.frame());
            }
        }
        Ok(())
    }

    /// Look up the mapping at `va` without creating anything. Mirrors the
    /// reference kernel's `page_lookup`: callers must check for `None` and
    /// never read a PTE that was never walked into existence.
    pub fn lookup(&mut self, va: u32) -> KernelResult<Option<Pte>> {
        Ok(self.walk(va, false)?.map(|slot| {
            // SAFETY: `slot` came from `walk` against this address space.
            unsafe { *slot }
        }))
    }

    /// Unmap every user-space page below [`UTOP`](crate::config::UTOP) and
    /// free any second-level page table left with no present entries as a
    /// result. Grounded on the reference kernel's `env_free`: tearing down
    /// an address space means walking both levels, not just the leaves.
    ///
    /// `free_root` additionally frees this address space's own page
    /// directory frame. Set only by a full environment teardown
    /// ([`process::destroy`](crate::process::destroy)); a snapshot
    /// [`resume`](crate::snapshot::resume) flushes the same way but keeps
    /// the environment (and its page directory) alive afterward.
    pub fn flush_addr_space(&mut self, free_root: bool) -> KernelResult<()> {
        let last_pdx = (UTOP >> 22) as usize;
        for pdx in 0..last_pdx {
            let pde = self.root().entries[pdx];
            if !pde.is_present() {
                continue;
            }
            let table_frame = pde.frame();
            for ptx in 0..1024 {
                self.unmap(page_addr(pdx, ptx))?;
            }
            // SAFETY: `table_frame` still backs a live `PageTable`; the
            // `unmap` calls above only clear its leaf entries, never the
            // PDE that points at it.
            let empty = unsafe {
                (*phys_to_virt::<PageTable>(table_frame))
                    .entries
                    .iter()
                    .all(|e| !e.is_present())
            };
            if empty {
                self.root_mut().entries[pdx] = Pte::empty();
                FRAME_ALLOCATOR.decref(table_frame);
            }
        }
        if free_root {
            FRAME_ALLOCATOR.decref(self.pgdir_frame);
        }
        Ok(())
    }
}

/// Copy one frame's contents into another, byte for byte. Used by the
/// snapshot engine's capture/resume and the user fork library's `duppage`
/// scratch-copy path; both need a private copy of a page's bytes without
/// going through any environment's address space.
pub fn copy_frame(src: PhysicalFrame, dst: PhysicalFrame) {
    // SAFETY: both frames are identity-mapped (no demand paging), `src` is
    // read-only here and `dst` was just allocated and not yet aliased by
    // any PTE, so the two ranges cannot overlap.
    unsafe {
        let s = phys_to_virt::<u8>(src);
        let d = phys_to_virt::<u8>(dst);
        core::ptr::copy_nonoverlapping(s, d, crate::config::PAGE_SIZE);
    }
}

/// Until demand paging exists, all physical memory is identity-mapped into
/// the kernel's own address space, so "physical to virtual" is the
/// identity function. Centralized here so the one future conversion point
/// (if a higher-half kernel is ever introduced) is obvious.
///
/// SAFETY: caller must not alias the returned pointer's `T` with another
/// live reference, and `frame` must in fact hold a `T`-shaped object (or be
/// about to be initialized as one).
unsafe fn phys_to_virt<T>(frame: PhysicalFrame) -> *mut T {
    frame.addr() as usize as *mut T
}

/// Invalidate a single TLB entry after changing its mapping.
fn invlpg(va: u32) {
    // SAFETY: `invlpg` only affects TLB state for `va`; it has no memory
    // safety implications of its own, only performance ones if omitted.
    unsafe {
        core::arch::asm!("invlpg [{}]", in(reg) va, options(nostack, preserves_flags));
    }
}

const _: () = assert!(UVPT >> 22 == PDX_SELFMAP as u32);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_va_roundtrip() {
        let va = 0x0080_1000u32;
        let (pdx, ptx, off) = split_va(va);
        assert_eq!(off, 0);
        assert_eq!(page_addr(pdx, ptx), va);
    }

    #[test]
    fn pte_packs_frame_and_flags() {
        let frame = PhysicalFrame(5);
        let pte = Pte::new(frame, PteFlags::PRESENT | PteFlags::WRITABLE);
        assert_eq!(pte.frame(), frame);
        assert!(pte.flags().contains(PteFlags::WRITABLE));
        assert!(pte.is_present());
    }
}
