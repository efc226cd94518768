//! RAII wrappers for kernel resources.
//!
//! Scoped guards so a fallible multi-step setup (allocate several frames,
//! map them, ...) can bail out at any `?` without hand-written rollback:
//! whatever's still wrapped in a guard when the scope unwinds gets released.

extern crate alloc;

use alloc::vec::Vec;
use core::ops::Deref;

use crate::mm::frame_allocator::{FrameAllocator, PhysicalFrame};

/// Owns one physical frame; returns it to the allocator on drop unless
/// [`leak`](Self::leak) hands it off first.
pub struct FrameGuard {
    frame: PhysicalFrame,
    allocator: &'static FrameAllocator,
}

impl FrameGuard {
    pub fn new(frame: PhysicalFrame, allocator: &'static FrameAllocator) -> Self {
        Self { frame, allocator }
    }

    pub fn addr(&self) -> u32 {
        self.frame.addr()
    }

    /// Release ownership of the frame without decref'ing it.
    pub fn leak(self) -> PhysicalFrame {
        let frame = self.frame;
        core::mem::forget(self);
        frame
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        self.allocator.decref(self.frame);
    }
}

impl Deref for FrameGuard {
    type Target = PhysicalFrame;

    fn deref(&self) -> &Self::Target {
        &self.frame
    }
}

/// Owns a batch of physical frames, for setup paths (snapshot resume, CoW
/// fork) that allocate several before committing any of them.
pub struct FramesGuard {
    frames: Vec<PhysicalFrame>,
    allocator: &'static FrameAllocator,
}

impl FramesGuard {
    pub fn new(frames: Vec<PhysicalFrame>, allocator: &'static FrameAllocator) -> Self {
        Self { frames, allocator }
    }

    pub fn push(&mut self, frame: PhysicalFrame) {
        self.frames.push(frame);
    }

    /// Release ownership of every frame without decref'ing any of them.
    pub fn leak(mut self) -> Vec<PhysicalFrame> {
        core::mem::take(&mut self.frames)
    }
}

impl Drop for FramesGuard {
    fn drop(&mut self) {
        for frame in self.frames.drain(..) {
            self.allocator.decref(frame);
        }
    }
}

/// Macro to create an RAII scope guard from a bare expression.
#[macro_export]
macro_rules! defer {
    ($e:expr) => {
        let _guard = $crate::raii::ScopeGuard::new(|| $e);
    };
}

/// Generic scope guard that runs cleanup code on drop, unless cancelled.
pub struct ScopeGuard<F: FnOnce()> {
    cleanup: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn new(cleanup: F) -> Self {
        Self {
            cleanup: Some(cleanup),
        }
    }

    /// Cancel the cleanup; used once a fallible setup path has fully
    /// succeeded and the guarded resource should survive.
    pub fn cancel(mut self) {
        self.cleanup = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(cleanup) = self.cleanup.take() {
            cleanup();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_guard_decrefs_on_drop() {
        let alloc: &'static FrameAllocator = alloc::boxed::Box::leak(alloc::boxed::Box::new(FrameAllocator::new()));
        alloc.init(16, 0, 4);
        let frame = alloc.alloc().unwrap();
        alloc.incref(frame); // so refcount survives the guard's drop for inspection
        {
            let _guard = FrameGuard::new(frame, alloc);
        }
        assert_eq!(alloc.refcount(frame), 1);
    }

    #[test]
    fn scope_guard_runs_on_drop() {
        let mut cleaned = false;
        {
            let _guard = ScopeGuard::new(|| {
                cleaned = true;
            });
        }
        assert!(cleaned);
    }

    #[test]
    fn scope_guard_cancel_skips_cleanup() {
        let mut cleaned = false;
        {
            let guard = ScopeGuard::new(|| {
                cleaned = true;
            });
            guard.cancel();
        }
        assert!(!cleaned);
    }
}
