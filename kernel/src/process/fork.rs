//! Kernel-side support for user-space copy-on-write fork: `exofork` alone.
//! Everything else -- walking `uvpt` for writable/CoW pages, `duppage`,
//! registering the page-fault upcall in the child -- is policy that lives
//! entirely in the user fork runtime library; the kernel only hands out a
//! blank address space and a suspended copy of the caller's register state.

use crate::config::USTACKTOP;
use crate::error::KernelResult;
use crate::mm::page_table::AddressSpace;

use super::table::EnvTable;
use super::{EnvId, EnvStatus};

/// Create a child of `parent` with an empty address space (just the
/// shared kernel mappings) and `parent`'s trap frame, except `eax` is
/// zeroed so the child observes a fork-like `0` return rather than its own
/// environment id. The child starts `NotRunnable`: the calling user
/// library must `duppage` the pages it wants to share before marking it
/// runnable via `env_set_status`.
pub fn exofork(table: &EnvTable, parent: EnvId) -> KernelResult<EnvId> {
    let child = table.alloc(parent)?;
    let address_space = {
        let kernel_pgdir = crate::mm::kernel_pgdir();
        AddressSpace::new(&kernel_pgdir)?
    };
    // Read the parent's trap frame before taking the table lock again for
    // the child -- the table mutex guards the whole array, not one slot
    // at a time, so nesting two `with`/`with_mut` calls would deadlock.
    let mut child_tf = table.with(parent, |env| env.tf);
    child_tf.regs.eax = 0;
    child_tf.esp = USTACKTOP;

    table.with_mut(child, |child_env| {
        child_env.tf = child_tf;
        child_env.address_space = Some(address_space);
        child_env.status = EnvStatus::NotRunnable;
    });
    Ok(child)
}
