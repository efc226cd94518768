//! NIC driver and the syscall-facing transmit/receive entry points. PCI
//! enumeration (vendor/device lookup, BAR mapping) is an external
//! collaborator per the design notes; this module only owns the device
//! once its MMIO region is already mapped.

mod e1000;

pub use e1000::E1000;

use spin::Mutex;

use crate::error::KernelResult;

static NIC: Mutex<Option<E1000>> = Mutex::new(None);

pub fn init() {}

/// Called once the (externally enumerated) NIC's MMIO BAR has been mapped
/// into kernel space, to bring the ring state up per §4.8. `Inval` if the
/// mapped region doesn't sanity-check as the expected device.
pub fn attach(mmio_base: *mut u32) -> KernelResult<()> {
    *NIC.lock() = Some(E1000::init(mmio_base)?);
    Ok(())
}

/// Kernel-side implementation of `net_transmit`.
pub fn transmit(data: &[u8]) -> KernelResult<()> {
    let mut guard = NIC.lock();
    let nic = guard.as_mut().expect("net_transmit before NIC attach");
    nic.transmit(data)
}

/// Kernel-side implementation of `net_recv`.
pub fn receive(buf: &mut [u8]) -> KernelResult<usize> {
    let mut guard = NIC.lock();
    let nic = guard.as_mut().expect("net_recv before NIC attach");
    nic.receive(buf)
}
