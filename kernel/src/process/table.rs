//! The fixed-capacity environment table. Grounded on the teacher's
//! `ProcessArray` no-alloc array-of-`Option` pattern -- here unconditional,
//! since a hard `NENV` cap (not heap growth) is the actual invariant being
//! modeled.

use spin::Mutex;

use crate::config::NENV;
use crate::error::{KernelError, KernelResult};

use super::pcb::{Env, EnvId, EnvStatus};

/// Whether an environment-id lookup is a plain existence check or is about
/// to act on the target (and so needs the sender-is-self-or-parent check).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvLookup {
    JustChecking,
    Privileged,
}

pub struct EnvTable {
    envs: Mutex<[Env; NENV]>,
}

impl EnvTable {
    pub const fn new() -> Self {
        Self {
            envs: Mutex::new([const { Env::empty() }; NENV]),
        }
    }

    /// Allocate a free slot, bump its generation, and return the new id.
    /// Always scans from index 0, so the lowest-indexed free slot is the
    /// one returned, never whichever one a stateful cursor happened to
    /// land on. The slot is left `NotRunnable` with no address space;
    /// callers finish setting it up (address space, trap frame) before
    /// making it `Runnable`.
    pub fn alloc(&self, parent_id: EnvId) -> KernelResult<EnvId> {
        let mut envs = self.envs.lock();
        for i in 0..NENV {
            if envs[i].status == EnvStatus::Free {
                let next_gen = envs[i].id.generation().wrapping_add(1).max(1);
                let id = EnvId::new(next_gen, i);
                envs[i] = Env::empty();
                envs[i].id = id;
                envs[i].parent_id = parent_id;
                envs[i].status = EnvStatus::NotRunnable;
                return Ok(id);
            }
        }
        Err(KernelError::NoFreeEnv)
    }

    /// Resolve an environment id to a table index, checking the
    /// generation so a stale id can never alias a slot's new occupant.
    /// `EnvId::NONE` always resolves to `current`.
    ///
    /// `mode` distinguishes a read-only existence check from a syscall
    /// that will act on the target: [`EnvLookup::Privileged`] additionally
    /// requires the target be `current` itself or a direct child of it
    /// (mirrors the reference kernel's single-level `checkperm`).
    pub fn lookup(&self, envid: EnvId, current: EnvId, mode: EnvLookup) -> KernelResult<EnvId> {
        if envid.is_none() {
            return Ok(current);
        }
        let envs = self.envs.lock();
        let slot = &envs[envid.index()];
        if slot.status == EnvStatus::Free || slot.id != envid {
            return Err(KernelError::BadEnv);
        }
        if mode == EnvLookup::Privileged && envid != current && slot.parent_id != current {
            return Err(KernelError::BadEnv);
        }
        Ok(envid)
    }

    pub fn with<R>(&self, id: EnvId, f: impl FnOnce(&Env) -> R) -> R {
        let envs = self.envs.lock();
        f(&envs[id.index()])
    }

    pub fn with_mut<R>(&self, id: EnvId, f: impl FnOnce(&mut Env) -> R) -> R {
        let mut envs = self.envs.lock();
        f(&mut envs[id.index()])
    }

    /// Mark a slot `Dying` (if it isn't already free). Actual teardown of
    /// its address space and frames happens when the scheduler next
    /// passes over it, never while it might still be `Running`.
    pub fn mark_dying(&self, id: EnvId) {
        let mut envs = self.envs.lock();
        let slot = &mut envs[id.index()];
        if slot.status != EnvStatus::Free {
            slot.status = EnvStatus::Dying;
        }
    }

    pub fn free_slot(&self, id: EnvId) {
        let mut envs = self.envs.lock();
        envs[id.index()] = Env::empty();
    }

    /// Find the next runnable environment at or after `after`, wrapping
    /// around the table once. Used by the round-robin scheduler.
    pub fn next_runnable_after(&self, after: usize) -> Option<EnvId> {
        let envs = self.envs.lock();
        for offset in 1..=NENV {
            let i = (after + offset) % NENV;
            if envs[i].status == EnvStatus::Runnable || envs[i].status == EnvStatus::Running {
                return Some(envs[i].id);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_assigns_increasing_generations_on_reuse() {
        let table = EnvTable::new();
        let a = table.alloc(EnvId::NONE).unwrap();
        table.free_slot(a);
        let b = table.alloc(EnvId::NONE).unwrap();
        assert_eq!(a.index(), b.index());
        assert_ne!(a.generation(), b.generation());
    }

    #[test]
    fn lookup_rejects_stale_generation() {
        let table = EnvTable::new();
        let a = table.alloc(EnvId::NONE).unwrap();
        table.free_slot(a);
        let _b = table.alloc(EnvId::NONE).unwrap();
        assert_eq!(
            table.lookup(a, EnvId::NONE, EnvLookup::JustChecking).unwrap_err(),
            KernelError::BadEnv
        );
    }

    #[test]
    fn privileged_lookup_requires_self_or_child() {
        let table = EnvTable::new();
        let parent = table.alloc(EnvId::NONE).unwrap();
        let child = table.alloc(parent).unwrap();
        let stranger = table.alloc(EnvId::NONE).unwrap();
        assert!(table.lookup(child, parent, EnvLookup::Privileged).is_ok());
        assert!(table.lookup(stranger, parent, EnvLookup::Privileged).is_err());
    }
}
