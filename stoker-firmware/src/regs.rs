//! Raw MMIO register bus

use stoker_core::traits::RegisterBus;

/// Performs register commands verbatim at whatever address the host
/// names - that is the loader contract, the stub is not a sandbox.
pub struct Mmio;

impl RegisterBus for Mmio {
    fn read(&mut self, addr: u32) -> u32 {
        // SAFETY: the host drives register commands against documented
        // peripheral addresses; a bad address faults the stub, which the
        // host recovers from by re-entering the loader
        unsafe { core::ptr::read_volatile(addr as *const u32) }
    }

    fn write(&mut self, addr: u32, value: u32) {
        // SAFETY: as above
        unsafe { core::ptr::write_volatile(addr as *mut u32, value) }
    }
}
