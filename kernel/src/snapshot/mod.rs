//! Environment snapshot/restore: a full checkpoint of one environment's
//! user-visible state (mapped pages plus register file) that can be
//! restored later, independent of whether the environment is still alive.
//!
//! Capture and restore are both designed around the all-or-nothing
//! invariant in the design notes: an environment must never be left with a
//! partially-installed snapshot. Capture rolls back everything it copied on
//! the first allocation failure; restore pre-builds its entire shadow page
//! set before touching the live environment at all.

extern crate alloc;

use alloc::vec::Vec;

use spin::Mutex;

use crate::arch::context::TrapFrame;
use crate::config::{NSNAPSHOT, PAGE_SIZE, UTEXT, UTOP};
use crate::error::{KernelError, KernelResult};
use crate::mm::frame_allocator::{PhysicalFrame, FRAME_ALLOCATOR};
use crate::mm::page_table::{self, PteFlags};
use crate::process::{self, EnvId};

/// One captured page: the virtual address it was mapped at, the permission
/// bits it carried, and a frame holding a private copy of its contents.
#[derive(Clone, Copy)]
struct SavedPage {
    va: u32,
    perm: PteFlags,
    frame: PhysicalFrame,
}

/// One snapshot slot. A `Vec` replaces the reference kernel's
/// dummy-head-linked-list page list (§9): the length is data-dependent, so
/// bounding it would mean bounding how much address space a snapshot can
/// cover.
struct Snapshot {
    owner: EnvId,
    pages: Vec<SavedPage>,
    tf: TrapFrame,
}

pub struct SnapshotId(pub usize);

struct Inner {
    slots: [Option<Snapshot>; NSNAPSHOT],
}

pub struct SnapshotTable {
    inner: Mutex<Inner>,
}

impl SnapshotTable {
    const fn new() -> Self {
        const NONE: Option<Snapshot> = None;
        Self {
            inner: Mutex::new(Inner {
                slots: [NONE; NSNAPSHOT],
            }),
        }
    }

    /// Walk `env`'s user address space and copy every mapped page below
    /// `UTOP` into a fresh snapshot slot. On any allocation failure,
    /// everything captured so far for this attempt is released and `NoMem`
    /// is returned; no partial snapshot is ever left installed.
    fn snapshot(&self, env: EnvId) -> KernelResult<SnapshotId> {
        let tf = process::table().with(env, |e| e.tf);

        let mut pages = Vec::new();
        let capture_result = process::table().with_mut(env, |e| -> KernelResult<()> {
            let aspace = e
                .address_space
                .as_mut()
                .expect("snapshot of environment with no address space");
            let mut va = UTEXT;
            while va < UTOP {
                // Per §9's flagged bug fix: `lookup` returns `None` when no
                // second-level table exists at all, and that must be
                // treated as "unmapped, skip" rather than read through.
                if let Some(pte) = aspace.lookup(va)? {
                    if pte.is_present() {
                        let copy = FRAME_ALLOCATOR.alloc()?;
                        page_table::copy_frame(pte.frame(), copy);
                        pages.push(SavedPage {
                            va,
                            perm: pte.flags(),
                            frame: copy,
                        });
                    }
                }
                va += PAGE_SIZE as u32;
            }
            Ok(())
        });

        if let Err(e) = capture_result {
            for saved in &pages {
                FRAME_ALLOCATOR.decref(saved.frame);
            }
            return Err(e);
        }

        let mut inner = self.inner.lock();
        let slot = inner
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(KernelError::NoMem)?;
        inner.slots[slot] = Some(Snapshot { owner: env, pages, tf });
        Ok(SnapshotId(slot))
    }

    /// Atomically roll `env` back to `snapshot_id`'s captured state.
    ///
    /// Phase 1 pre-allocates and fills every frame the restored mappings
    /// will need, in a shadow list, entirely independent of `env`'s current
    /// state. Only once that has fully succeeded does phase 2 touch the
    /// live environment: flush its current user mappings and install the
    /// shadow pages. A failure in phase 1 leaves `env` completely
    /// untouched.
    fn resume(&self, env: EnvId, snapshot_id: SnapshotId) -> KernelResult<()> {
        let inner = self.inner.lock();
        let snap = inner.slots[snapshot_id.0]
            .as_ref()
            .ok_or(KernelError::BadEnv)?;
        if snap.owner != env {
            return Err(KernelError::BadEnv);
        }

        let mut shadow: Vec<SavedPage> = Vec::with_capacity(snap.pages.len());
        for saved in &snap.pages {
            match FRAME_ALLOCATOR.alloc() {
                Ok(frame) => {
                    page_table::copy_frame(saved.frame, frame);
                    shadow.push(SavedPage {
                        va: saved.va,
                        perm: saved.perm,
                        frame,
                    });
                }
                Err(e) => {
                    for s in &shadow {
                        FRAME_ALLOCATOR.decref(s.frame);
                    }
                    return Err(e);
                }
            }
        }
        let restored_tf = snap.tf;
        drop(inner);

        process::table().with_mut(env, |e| {
            let aspace = e
                .address_space
                .as_mut()
                .expect("resume of environment with no address space");
            aspace
                .flush_addr_space(false)
                .expect("flush_addr_space(create=false) never allocates, so never fails");
            for s in &shadow {
                aspace
                    .map(s.va, s.frame, s.perm)
                    .expect("shadow frame installation cannot fail: already allocated");
            }
            e.tf = restored_tf;
            e.status = if env == process::current_id() {
                crate::process::EnvStatus::Running
            } else {
                crate::process::EnvStatus::Runnable
            };
        });
        Ok(())
    }
}

static SNAPSHOTS: SnapshotTable = SnapshotTable::new();

pub fn init() {}

pub fn table() -> &'static SnapshotTable {
    &SNAPSHOTS
}

pub fn snapshot(env: EnvId) -> KernelResult<SnapshotId> {
    SNAPSHOTS.snapshot(env)
}

pub fn resume(env: EnvId, snapshot_id: SnapshotId) -> KernelResult<()> {
    SNAPSHOTS.resume(env, snapshot_id)
}
