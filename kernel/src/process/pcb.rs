//! The environment control block: everything the kernel tracks about one
//! environment (this kernel's unit of isolation -- there is no separate
//! "thread"; an environment is one single-threaded address space plus one
//! saved register context).

use crate::arch::context::TrapFrame;
use crate::config::NENV;
use crate::mm::page_table::AddressSpace;

/// 32-bit environment id: a generation counter in the high bits and the
/// environment table index in the low bits. Reusing a table slot bumps the
/// generation, so a stale id from a destroyed environment can never alias
/// a later occupant of the same slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnvId(pub u32);

const ENVX_BITS: u32 = NENV.trailing_zeros();

impl EnvId {
    pub const NONE: EnvId = EnvId(0);

    pub fn new(generation: u32, index: usize) -> Self {
        debug_assert!(index < NENV);
        Self((generation << ENVX_BITS) | index as u32)
    }

    pub fn index(self) -> usize {
        (self.0 as usize) & (NENV - 1)
    }

    pub fn generation(self) -> u32 {
        self.0 >> ENVX_BITS
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvStatus {
    /// Slot is unused and available for `alloc`.
    Free,
    /// Exited or destroyed but not yet fully reclaimed by the scheduler.
    Dying,
    /// Eligible to be picked by the scheduler.
    Runnable,
    /// Currently loaded on the (single) CPU.
    Running,
    /// Exists but will not be scheduled (e.g. blocked in `ipc_recv`).
    NotRunnable,
}

/// One environment's full kernel-visible state.
pub struct Env {
    pub status: EnvStatus,
    pub id: EnvId,
    pub parent_id: EnvId,
    /// Incremented every time this environment is dispatched; exposed for
    /// diagnostics and as the JOS-style "make forward progress" counter.
    pub runs: u32,
    pub address_space: Option<AddressSpace>,
    pub tf: TrapFrame,
    /// User virtual address of the registered page-fault upcall, or 0 if
    /// none has been registered yet.
    pub pgfault_upcall: u32,

    /// True while blocked inside `ipc_recv`.
    pub ipc_recving: bool,
    /// Destination VA the receiver asked to map the sender's page at (0 if
    /// it doesn't want a page mapped).
    pub ipc_dstva: u32,
    /// One-word payload delivered by the most recent `ipc_try_send`.
    pub ipc_value: u32,
    /// Sender of the most recently delivered IPC message.
    pub ipc_from: EnvId,
    /// Permission bits the sender offered for the shared page, 0 if none.
    pub ipc_perm: u32,
}

impl Env {
    pub const fn empty() -> Self {
        Self {
            status: EnvStatus::Free,
            id: EnvId::NONE,
            parent_id: EnvId::NONE,
            runs: 0,
            address_space: None,
            tf: TrapFrame::zeroed(),
            pgfault_upcall: 0,
            ipc_recving: false,
            ipc_dstva: 0,
            ipc_value: 0,
            ipc_from: EnvId::NONE,
            ipc_perm: 0,
        }
    }
}
