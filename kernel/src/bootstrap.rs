//! Kernel bootstrap sequence.
//!
//! Brings up every subsystem in dependency order, then creates the root
//! environment. Materializing that environment's actual program image is
//! the boot loader/ELF loader's job, both external collaborators per the
//! design notes — this module only builds the environment shell (address
//! space, mapped stack page, entry point) and hands its id back so an
//! external loader can populate `.text`/`.data` before marking it runnable.

use crate::config::{PAGE_SIZE, USTACKTOP};
use crate::error::KernelResult;
use crate::mm::frame_allocator::FRAME_ALLOCATOR;
use crate::mm::page_table::PteFlags;
use crate::process::{self, EnvId, EnvStatus};
use crate::{arch, irq, mm, sched, snapshot, timer};

/// Bring up every subsystem that must exist before any environment can run:
/// segmentation/traps, paging and the frame allocator, the environment and
/// snapshot tables, and the scheduler's kernel stack.
pub fn init() {
    arch::init();
    mm::init();
    process::init();
    snapshot::init();
    irq::init();
    timer::init();
    sched::init();
    log::info!("bootstrap: subsystems initialized");
}

/// Create the root environment: a fresh address space, one mapped stack
/// page at `USTACKTOP - PAGE_SIZE`, and a trap frame ready to run at
/// `entry`. Left `NotRunnable` so an external image loader can map
/// `.text`/`.data` first; the caller flips it to `Runnable` once that's
/// done.
pub fn create_root_environment(entry: u32) -> KernelResult<EnvId> {
    let id = process::create(EnvId::NONE, entry)?;
    let stack_frame = FRAME_ALLOCATOR.alloc()?;
    // SAFETY: `stack_frame` was just allocated and is not yet aliased by any
    // PTE; the kernel's identity mapping makes its address directly
    // dereferenceable.
    unsafe {
        core::ptr::write_bytes(stack_frame.addr() as *mut u8, 0, PAGE_SIZE);
    }
    let map_result = process::table().with_mut(id, |env| {
        env.address_space
            .as_mut()
            .expect("freshly created environment has an address space")
            .map(
                USTACKTOP - PAGE_SIZE as u32,
                stack_frame,
                PteFlags::PRESENT | PteFlags::WRITABLE | PteFlags::USER,
            )
    });
    if let Err(e) = map_result {
        FRAME_ALLOCATOR.decref(stack_frame);
        process::destroy(id);
        return Err(e);
    }
    log::info!("bootstrap: created root environment {:?}", id);
    Ok(id)
}

/// Mark a freshly created environment runnable, once its program image is
/// in place.
pub fn make_runnable(id: EnvId) {
    process::table().with_mut(id, |env| env.status = EnvStatus::Runnable);
}
