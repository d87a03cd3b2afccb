//! Serial link implementation over the buffered UART

use alloc::rc::Rc;
use core::cell::RefCell;

use embassy_rp::uart::BufferedUartTx;
use embassy_time::{block_for, Duration};
use embedded_io::Write;

use stoker_core::traits::SerialLink;
use stoker_protocol::slip::{END, ESC, ESC_END, ESC_ESC};

// PL011 divisor registers; a dummy LCR_H write latches the new value
const UART0_IBRD: u32 = 0x4003_4024;
const UART0_FBRD: u32 = 0x4003_4028;
const UART0_LCR_H: u32 = 0x4003_402C;

/// Transmit side of the link, shared between the dispatcher's responses
/// and the flash read streamer
pub struct UartOut {
    tx: BufferedUartTx,
}

impl UartOut {
    pub fn new(tx: BufferedUartTx) -> Self {
        Self { tx }
    }

    /// Blocking write of raw, already-encoded bytes
    pub fn write_all(&mut self, bytes: &[u8]) {
        let _ = Write::write_all(&mut self.tx, bytes);
    }

    pub fn flush(&mut self) {
        let _ = Write::flush(&mut self.tx);
    }

    /// SLIP-encode and send one complete frame
    pub fn send_frame(&mut self, payload: &[u8]) {
        self.write_all(&[END]);
        for &byte in payload {
            match byte {
                END => self.write_all(&[ESC, ESC_END]),
                ESC => self.write_all(&[ESC, ESC_ESC]),
                _ => self.write_all(&[byte]),
            }
        }
        self.write_all(&[END]);
    }
}

/// Shared handle to the transmit side
pub type SharedTx = Rc<RefCell<UartOut>>;

/// [`SerialLink`] over the UART the stub was loaded through
pub struct RpLink {
    out: SharedTx,
}

impl RpLink {
    pub fn new(out: SharedTx) -> Self {
        Self { out }
    }
}

impl SerialLink for RpLink {
    fn send(&mut self, bytes: &[u8]) {
        self.out.borrow_mut().write_all(bytes);
    }

    fn flush(&mut self) {
        self.out.borrow_mut().flush();
    }

    fn set_baud_divider(&mut self, divider: u32) {
        // The engine hands us clk/baud; the PL011 wants 16.6 fixed point
        let ibrd = divider >> 4;
        let fbrd = (divider & 0xF) * 4;
        // SAFETY: writes hit UART0's divisor registers only; the caller
        // guarantees the transmitter is idle
        unsafe {
            core::ptr::write_volatile(UART0_IBRD as *mut u32, ibrd);
            core::ptr::write_volatile(UART0_FBRD as *mut u32, fbrd);
            let lcr = core::ptr::read_volatile(UART0_LCR_H as *const u32);
            core::ptr::write_volatile(UART0_LCR_H as *mut u32, lcr);
        }
    }

    fn delay_us(&mut self, us: u32) {
        block_for(Duration::from_micros(u64::from(us)));
    }

    fn reboot(&mut self) {
        self.flush();
        cortex_m::peripheral::SCB::sys_reset();
    }
}
