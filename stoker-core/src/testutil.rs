//! Recording collaborator mocks and frame builders for engine tests

use std::vec::Vec;

use stoker_protocol::response::{CmdError, CmdResult, MD5_DIGEST_LEN};
use stoker_protocol::slip::{SlipAction, SlipDecoder, END, ESC, ESC_END, ESC_ESC};

use crate::dispatch::Dispatcher;
use crate::traits::{FlashOps, RegisterBus, SerialLink, SpiControl, SpiFault, SpiParams};

/// One recorded call into the flash pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashCall {
    EraseAll,
    EraseRegion {
        addr: u32,
        len: u32,
    },
    BeginWrite {
        total: u32,
        offset: u32,
    },
    BeginDeflated {
        uncompressed: u32,
        total: u32,
        offset: u32,
    },
    EndWrite,
    ReadFlash {
        offset: u32,
        len: u32,
        block_size: u32,
        max_in_flight: u32,
    },
    Md5 {
        addr: u32,
        len: u32,
    },
}

#[derive(Debug)]
pub struct MockFlash {
    pub calls: Vec<FlashCall>,
    pub written: Vec<u8>,
    pub deflated: Vec<u8>,
    pub write_mode: bool,
    pub latched: CmdResult,
    pub end_result: CmdResult,
    pub md5: [u8; MD5_DIGEST_LEN],
}

impl Default for MockFlash {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            written: Vec::new(),
            deflated: Vec::new(),
            write_mode: false,
            latched: Ok(()),
            end_result: Ok(()),
            md5: [0; MD5_DIGEST_LEN],
        }
    }
}

impl FlashOps for MockFlash {
    fn erase_all(&mut self) -> CmdResult {
        self.calls.push(FlashCall::EraseAll);
        Ok(())
    }

    fn erase_region(&mut self, addr: u32, len: u32) -> CmdResult {
        self.calls.push(FlashCall::EraseRegion { addr, len });
        Ok(())
    }

    fn begin_write(&mut self, total_size: u32, offset: u32) -> CmdResult {
        self.calls.push(FlashCall::BeginWrite {
            total: total_size,
            offset,
        });
        self.write_mode = true;
        self.latched = Ok(());
        Ok(())
    }

    fn begin_deflated_write(
        &mut self,
        uncompressed_size: u32,
        total_size: u32,
        offset: u32,
    ) -> CmdResult {
        self.calls.push(FlashCall::BeginDeflated {
            uncompressed: uncompressed_size,
            total: total_size,
            offset,
        });
        self.write_mode = true;
        self.latched = Ok(());
        Ok(())
    }

    fn write_block(&mut self, data: &[u8]) {
        self.written.extend_from_slice(data);
    }

    fn write_deflated_block(&mut self, data: &[u8]) {
        self.deflated.extend_from_slice(data);
    }

    fn end_write(&mut self) -> CmdResult {
        self.calls.push(FlashCall::EndWrite);
        self.write_mode = false;
        self.end_result
    }

    fn read_flash(&mut self, offset: u32, len: u32, block_size: u32, max_in_flight: u32) {
        self.calls.push(FlashCall::ReadFlash {
            offset,
            len,
            block_size,
            max_in_flight,
        });
    }

    fn compute_md5(&mut self, addr: u32, len: u32) -> Result<[u8; MD5_DIGEST_LEN], CmdError> {
        self.calls.push(FlashCall::Md5 { addr, len });
        Ok(self.md5)
    }

    fn in_write_mode(&self) -> bool {
        self.write_mode
    }

    fn last_error(&self) -> CmdResult {
        self.latched
    }
}

#[derive(Debug, Default)]
pub struct MockSpi {
    pub attaches: Vec<(u32, bool)>,
    pub params: Option<SpiParams>,
    pub fault: Option<SpiFault>,
}

impl SpiControl for MockSpi {
    fn attach(&mut self, arg: u32, is_legacy: bool) -> CmdResult {
        self.attaches.push((arg, is_legacy));
        Ok(())
    }

    fn set_params(&mut self, params: SpiParams) -> Result<(), SpiFault> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        self.params = Some(params);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MockRegs {
    /// Value returned for every read
    pub value: u32,
    pub reads: Vec<u32>,
    pub writes: Vec<(u32, u32)>,
}

impl RegisterBus for MockRegs {
    fn read(&mut self, addr: u32) -> u32 {
        self.reads.push(addr);
        self.value
    }

    fn write(&mut self, addr: u32, value: u32) {
        self.writes.push((addr, value));
    }
}

#[derive(Debug, Default)]
pub struct MockLink {
    pub sent: Vec<u8>,
    pub flushes: u32,
    pub dividers: Vec<u32>,
    pub delays: Vec<u32>,
    pub reboots: u32,
}

impl SerialLink for MockLink {
    fn send(&mut self, bytes: &[u8]) {
        self.sent.extend_from_slice(bytes);
    }

    fn flush(&mut self) {
        self.flushes += 1;
    }

    fn set_baud_divider(&mut self, divider: u32) {
        self.dividers.push(divider);
    }

    fn delay_us(&mut self, us: u32) {
        self.delays.push(us);
    }

    fn reboot(&mut self) {
        self.reboots += 1;
    }
}

/// Dispatcher over fresh mocks with a 52 MHz UART clock
pub fn new_dispatcher() -> Dispatcher<MockFlash, MockSpi, MockRegs, MockLink> {
    Dispatcher::new(
        MockFlash::default(),
        MockSpi::default(),
        MockRegs::default(),
        MockLink::default(),
        52_000_000,
    )
}

/// Concatenate u32 words little-endian
pub fn words(values: &[u32]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

/// Build a decoded (unframed) command: header plus payload
pub fn command(op: u8, checksum: u32, data: &[u8]) -> Vec<u8> {
    let mut frame = std::vec![0u8, op];
    frame.extend_from_slice(&(data.len() as u16).to_le_bytes());
    frame.extend_from_slice(&checksum.to_le_bytes());
    frame.extend_from_slice(data);
    frame
}

/// Build a decoded data-block command with its 16-byte sub-header
pub fn block_command(op: u8, payload: &[u8], checksum: u32) -> Vec<u8> {
    let mut data = words(&[payload.len() as u32, 0, 0, 0]);
    data.extend_from_slice(payload);
    command(op, checksum, &data)
}

/// SLIP-encode a byte sequence into one wire frame
pub fn slip_frame(payload: &[u8]) -> Vec<u8> {
    let mut out = std::vec![END];
    for &byte in payload {
        match byte {
            END => out.extend_from_slice(&[ESC, ESC_END]),
            ESC => out.extend_from_slice(&[ESC, ESC_ESC]),
            _ => out.push(byte),
        }
    }
    out.push(END);
    out
}

/// Decode a transmit capture back into frames
pub fn decode_frames(bytes: &[u8]) -> Vec<Vec<u8>> {
    let mut decoder = SlipDecoder::new();
    let mut frames = Vec::new();
    let mut current = Vec::new();
    for &b in bytes {
        match decoder.feed(b) {
            SlipAction::None => {}
            SlipAction::Byte(v) => current.push(v),
            SlipAction::FrameEnd => frames.push(core::mem::take(&mut current)),
        }
    }
    frames
}
