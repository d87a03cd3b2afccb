//! Stoker - RP2040 serial flash loader stub
//!
//! Pushed into RAM by the resident loader, the stub takes over the same
//! UART, announces itself, and services flash programming commands until
//! the host sends the terminal flash-end, which reboots into the freshly
//! written application.

#![no_std]
#![no_main]

extern crate alloc;

use alloc::rc::Rc;
use core::cell::RefCell;

use defmt::*;
use embassy_executor::Spawner;
use embassy_rp::bind_interrupts;
use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::peripherals::UART0;
use embassy_rp::uart::{BufferedInterruptHandler, Config as UartConfig, Uart};
use embedded_alloc::LlffHeap as Heap;
use embedded_io_async::Read;
use static_cell::StaticCell;
use {defmt_rtt as _, panic_probe as _};

use stoker_core::{Session, SessionConfig};

use crate::flash::{QspiControl, StubFlash, FLASH_SIZE};
use crate::link::{RpLink, UartOut};
use crate::regs::Mmio;

mod flash;
mod link;
mod regs;

bind_interrupts!(struct Irqs {
    UART0_IRQ => BufferedInterruptHandler<UART0>;
});

#[global_allocator]
static HEAP: Heap = Heap::empty();

// The inflater state for compressed write sessions dominates heap use
const HEAP_SIZE: usize = 64 * 1024;

// UART ring buffers; RX is sized so a data block can keep streaming in
// while the previous one is being programmed
static TX_BUF: StaticCell<[u8; 512]> = StaticCell::new();
static RX_BUF: StaticCell<[u8; 2048]> = StaticCell::new();

/// Main entry point
#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    info!("Stoker stub starting...");

    init_heap();

    let p = embassy_rp::init(Default::default());

    // Same UART the loader used to push us; 115200 until the host asks
    // for more
    let uart_config = UartConfig::default();
    let tx_buf = TX_BUF.init([0u8; 512]);
    let rx_buf = RX_BUF.init([0u8; 2048]);
    let uart = Uart::new_blocking(p.UART0, p.PIN_0, p.PIN_1, uart_config);
    let uart = uart.into_buffered(Irqs, tx_buf, rx_buf);
    let (tx, mut rx) = uart.split();

    // The dispatcher's responses and the flash read streamer share the
    // transmit side
    let out = Rc::new(RefCell::new(UartOut::new(tx)));

    let flash = StubFlash::new(
        Flash::<_, Blocking, FLASH_SIZE>::new_blocking(p.FLASH),
        out.clone(),
    );
    let config = SessionConfig {
        // clk_peri follows the 125 MHz system clock on the default setup
        uart_clock_hz: 125_000_000,
        ..SessionConfig::default()
    };
    let mut session = Session::new(config, flash, QspiControl::default(), Mmio, RpLink::new(out));
    session.start();
    info!("session ready");

    let mut buf = [0u8; 256];
    loop {
        match rx.read(&mut buf).await {
            Ok(n) if n > 0 => {
                for &byte in &buf[..n] {
                    session.on_byte(byte);
                    // The ready slot has depth 1; drain it per byte so a
                    // burst of frames cannot overrun it
                    if let Some(end) = session.poll() {
                        // reboot() resets the chip before this is
                        // reached; defensive path only
                        warn!("session ended without reset: {:?}", end);
                        loop {
                            cortex_m::asm::wfe();
                        }
                    }
                }
            }
            Ok(_) => {}
            Err(e) => warn!("UART read error: {:?}", e),
        }
    }
}

fn init_heap() {
    use core::mem::MaybeUninit;
    static mut HEAP_MEM: [MaybeUninit<u8>; HEAP_SIZE] = [MaybeUninit::uninit(); HEAP_SIZE];
    #[allow(static_mut_refs)]
    unsafe {
        HEAP.init(HEAP_MEM.as_ptr() as usize, HEAP_SIZE)
    }
}
