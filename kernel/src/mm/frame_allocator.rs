//! Physical frame allocator.
//!
//! Every frame is refcounted (a page mapped into two address spaces after
//! `duppage` during fork is freed only when the last mapping disappears)
//! and handed out from a LIFO free list, exactly the allocation order used
//! while walking the boot memory map.

extern crate alloc;

use alloc::vec::Vec;

use spin::Mutex;

use crate::config::PAGE_SIZE;
use crate::error::{KernelError, KernelResult};

/// A physical page-frame number (physical address `>> PAGE_SHIFT`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysicalFrame(pub u32);

impl PhysicalFrame {
    pub const fn from_addr(addr: u32) -> Self {
        Self(addr / PAGE_SIZE as u32)
    }

    pub const fn addr(self) -> u32 {
        self.0 * PAGE_SIZE as u32
    }
}

struct Inner {
    /// Reference count per frame, indexed by frame number. Boot-reserved
    /// frames (kernel image, IDT/GDT, the boot page directory) carry a
    /// permanent refcount of 1 and never appear in `free_list`.
    refcounts: Vec<u16>,
    free_list: Vec<PhysicalFrame>,
}

pub struct FrameAllocator {
    inner: Mutex<Option<Inner>>,
}

impl FrameAllocator {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    /// Populate the allocator from a boot memory map: `total_frames` frames
    /// exist, of which `[reserved_start, reserved_end)` (by frame number,
    /// end-exclusive) are permanently held by the kernel image and boot
    /// structures and must never be handed out or freed.
    pub fn init(&self, total_frames: u32, reserved_start: u32, reserved_end: u32) {
        let mut refcounts = Vec::with_capacity(total_frames as usize);
        let mut free_list = Vec::new();
        for frame in 0..total_frames {
            let reserved = frame == 0 || (frame >= reserved_start && frame < reserved_end);
            refcounts.push(if reserved { 1 } else { 0 });
            if !reserved {
                free_list.push(PhysicalFrame(frame));
            }
        }
        // LIFO: hand out low frame numbers first, matching boot layout.
        free_list.reverse();
        *self.inner.lock() = Some(Inner {
            refcounts,
            free_list,
        });
    }

    /// Allocate a single frame with refcount 1. The caller is responsible
    /// for zeroing it if zeroed memory is required.
    pub fn alloc(&self) -> KernelResult<PhysicalFrame> {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().expect("frame allocator not initialized");
        let frame = inner.free_list.pop().ok_or(KernelError::NoMem)?;
        inner.refcounts[frame.0 as usize] = 1;
        Ok(frame)
    }

    /// Increment a frame's reference count. Used when a second mapping of
    /// an already-allocated frame is installed (CoW fork's `duppage`).
    pub fn incref(&self, frame: PhysicalFrame) {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().expect("frame allocator not initialized");
        inner.refcounts[frame.0 as usize] += 1;
    }

    /// Drop one reference to a frame, returning it to the free list once
    /// the last reference is gone.
    pub fn decref(&self, frame: PhysicalFrame) {
        let mut guard = self.inner.lock();
        let inner = guard.as_mut().expect("frame allocator not initialized");
        let count = &mut inner.refcounts[frame.0 as usize];
        debug_assert!(*count > 0, "decref of already-free frame {:#x}", frame.addr());
        *count -= 1;
        if *count == 0 {
            inner.free_list.push(frame);
        }
    }

    pub fn refcount(&self, frame: PhysicalFrame) -> u16 {
        let guard = self.inner.lock();
        let inner = guard.as_ref().expect("frame allocator not initialized");
        inner.refcounts[frame.0 as usize]
    }
}

pub static FRAME_ALLOCATOR: FrameAllocator = FrameAllocator::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_free_is_reusable() {
        let alloc = FrameAllocator::new();
        alloc.init(16, 0, 4);
        let a = alloc.alloc().unwrap();
        let b = alloc.alloc().unwrap();
        assert_ne!(a, b);
        alloc.decref(a);
        let c = alloc.alloc().unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn refcounted_frame_outlives_single_decref() {
        let alloc = FrameAllocator::new();
        alloc.init(16, 0, 4);
        let frame = alloc.alloc().unwrap();
        alloc.incref(frame);
        assert_eq!(alloc.refcount(frame), 2);
        alloc.decref(frame);
        assert_eq!(alloc.refcount(frame), 1);
        alloc.decref(frame);
        assert_eq!(alloc.refcount(frame), 0);
    }

    #[test]
    fn exhausted_allocator_reports_no_mem() {
        let alloc = FrameAllocator::new();
        alloc.init(2, 0, 2);
        assert_eq!(alloc.alloc().unwrap_err(), KernelError::NoMem);
    }
}
