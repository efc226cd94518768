//! Environments: the fixed-capacity table, the per-environment control
//! block, and kernel-side `exofork` support for the user-space CoW fork
//! library.

pub mod fork;
pub mod pcb;
pub mod table;

use core::sync::atomic::{AtomicU32, Ordering};

pub use pcb::{Env, EnvId, EnvStatus};
pub use table::{EnvLookup, EnvTable};

use crate::config::USTACKTOP;
use crate::error::KernelResult;
use crate::mm::page_table::AddressSpace;

static ENV_TABLE: EnvTable = EnvTable::new();

/// Raw bits of the currently-running environment's id, or 0 before the
/// first environment is dispatched. Only the scheduler's dispatch path
/// writes this.
static CURRENT: AtomicU32 = AtomicU32::new(0);

pub fn table() -> &'static EnvTable {
    &ENV_TABLE
}

pub fn current_id() -> EnvId {
    EnvId(CURRENT.load(Ordering::Acquire))
}

pub fn set_current(id: EnvId) {
    CURRENT.store(id.0, Ordering::Release);
}

pub fn init() {
    // Nothing to pre-populate: the root environment is created by
    // `bootstrap`, once the frame allocator and kernel page tables exist.
}

/// Allocate a new environment, giving it its own address space (sharing
/// the kernel's upper mappings) and an initial trap frame for `entry`
/// running on a freshly mapped one-page user stack at `USTACKTOP`. The new
/// environment starts `NotRunnable`; the caller finishes populating its
/// address space (text/data) and mapping the stack page before flipping
/// it to `Runnable` via [`table::EnvTable::with_mut`].
pub fn create(parent: EnvId, entry: u32) -> KernelResult<EnvId> {
    let id = ENV_TABLE.alloc(parent)?;
    let address_space = {
        let kernel_pgdir = crate::mm::kernel_pgdir();
        AddressSpace::new(&kernel_pgdir)?
    };
    ENV_TABLE.with_mut(id, |env| {
        env.address_space = Some(address_space);
        env.tf = crate::arch::context::TrapFrame::new_user(entry, USTACKTOP);
    });
    Ok(id)
}

/// Tear down an environment: mark it `Dying` so the scheduler skips it,
/// release its address space's frames (including its own page directory
/// frame and any second-level tables, via `flush_addr_space`), and free
/// its table slot. Mirrors the reference kernel's `env_destroy` plus
/// `env_free`.
pub fn destroy(id: EnvId) {
    ENV_TABLE.mark_dying(id);
    ENV_TABLE.with_mut(id, |env| {
        if let Some(mut aspace) = env.address_space.take() {
            aspace
                .flush_addr_space(true)
                .expect("flush_addr_space(create=false) never allocates, so never fails");
        }
    });
    ENV_TABLE.free_slot(id);
    if current_id() == id {
        set_current(EnvId::NONE);
    }
}
