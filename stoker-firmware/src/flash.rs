//! Flash pipeline over the RP2040's QSPI flash
//!
//! Implements the engine's flash seams with embassy's blocking flash
//! driver: erase-ahead on session begin, page-granular programming,
//! streaming MD5 digests, and zlib inflation for compressed sessions.

use alloc::boxed::Box;

use embassy_rp::flash::{Blocking, Flash};
use embassy_rp::peripherals::FLASH;
use md5::{Digest, Md5};
use miniz_oxide::inflate::stream::{inflate, InflateState};
use miniz_oxide::{DataFormat, MZError, MZFlush, MZStatus};

use stoker_core::traits::{FlashOps, SpiControl, SpiFault, SpiParams};
use stoker_protocol::response::{CmdError, CmdResult, MD5_DIGEST_LEN};

use crate::link::SharedTx;

/// Onboard flash size (Pico-class boards)
pub const FLASH_SIZE: usize = 2 * 1024 * 1024;

const SECTOR_SIZE: u32 = 4096;
const PAGE_SIZE: usize = 256;
const READ_CHUNK: usize = 1024;

#[derive(Clone, Copy, PartialEq, Eq)]
enum WriteMode {
    Idle,
    Plain,
    Deflated,
}

/// [`FlashOps`] over the onboard QSPI flash
pub struct StubFlash<'d> {
    flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>,
    out: SharedTx,
    mode: WriteMode,
    /// Next byte to program
    offset: u32,
    /// Bytes the session still owes to flash
    remaining: u32,
    latched: CmdResult,
    inflater: Option<Box<InflateState>>,
}

impl<'d> StubFlash<'d> {
    pub fn new(flash: Flash<'d, FLASH, Blocking, FLASH_SIZE>, out: SharedTx) -> Self {
        Self {
            flash,
            out,
            mode: WriteMode::Idle,
            offset: 0,
            remaining: 0,
            latched: Ok(()),
            inflater: None,
        }
    }

    /// Erase every sector overlapping `[offset, offset + len)`
    fn erase_span(&mut self, offset: u32, len: u32) -> CmdResult {
        let end = offset.checked_add(len).ok_or(CmdError::InvalidCommand)?;
        let from = offset & !(SECTOR_SIZE - 1);
        let to = end
            .checked_add(SECTOR_SIZE - 1)
            .ok_or(CmdError::InvalidCommand)?
            & !(SECTOR_SIZE - 1);
        self.flash
            .blocking_erase(from, to)
            .map_err(|_| CmdError::FailedSpiOp)
    }

    /// Program `data` at the session offset, page by page
    ///
    /// A trailing partial page is padded with 0xFF, which is a no-op on
    /// freshly erased flash.
    fn program(&mut self, data: &[u8]) {
        let mut written = 0;
        while written < data.len() {
            let chunk = (data.len() - written).min(PAGE_SIZE);
            let mut page = [0xFFu8; PAGE_SIZE];
            page[..chunk].copy_from_slice(&data[written..written + chunk]);
            if self.flash.blocking_write(self.offset, &page).is_err() {
                self.latched = Err(CmdError::FailedSpiOp);
                return;
            }
            self.offset = self.offset.wrapping_add(chunk as u32);
            written += chunk;
        }
        self.remaining = self.remaining.saturating_sub(data.len() as u32);
    }
}

impl FlashOps for StubFlash<'_> {
    fn erase_all(&mut self) -> CmdResult {
        self.flash
            .blocking_erase(0, FLASH_SIZE as u32)
            .map_err(|_| CmdError::FailedSpiOp)
    }

    fn erase_region(&mut self, addr: u32, len: u32) -> CmdResult {
        if addr % SECTOR_SIZE != 0 || len % SECTOR_SIZE != 0 {
            return Err(CmdError::InvalidCommand);
        }
        self.erase_span(addr, len)
    }

    fn begin_write(&mut self, total_size: u32, offset: u32) -> CmdResult {
        self.erase_span(offset, total_size)?;
        self.mode = WriteMode::Plain;
        self.offset = offset;
        self.remaining = total_size;
        self.latched = Ok(());
        self.inflater = None;
        Ok(())
    }

    fn begin_deflated_write(
        &mut self,
        uncompressed_size: u32,
        _total_size: u32,
        offset: u32,
    ) -> CmdResult {
        self.erase_span(offset, uncompressed_size)?;
        self.mode = WriteMode::Deflated;
        self.offset = offset;
        self.remaining = uncompressed_size;
        self.latched = Ok(());
        self.inflater = Some(InflateState::new_boxed(DataFormat::Zlib));
        Ok(())
    }

    fn write_block(&mut self, data: &[u8]) {
        if self.mode != WriteMode::Plain {
            self.latched = Err(CmdError::NotInFlashMode);
            return;
        }
        self.program(data);
    }

    fn write_deflated_block(&mut self, data: &[u8]) {
        if self.mode != WriteMode::Deflated {
            self.latched = Err(CmdError::NotInFlashMode);
            return;
        }
        let Some(mut state) = self.inflater.take() else {
            self.latched = Err(CmdError::InflateError);
            return;
        };

        let mut out = [0u8; 1024];
        let mut consumed = 0;
        loop {
            let result = inflate(&mut state, &data[consumed..], &mut out, MZFlush::None);
            consumed += result.bytes_consumed;
            if result.bytes_written > 0 {
                self.program(&out[..result.bytes_written]);
            }
            match result.status {
                Ok(MZStatus::StreamEnd) => break,
                Ok(_) => {
                    // Done once the input is drained and the inflater
                    // stopped filling the whole output buffer
                    if consumed == data.len() && result.bytes_written < out.len() {
                        break;
                    }
                }
                // Needs the next block before it can make progress
                Err(MZError::Buf) => break,
                Err(_) => {
                    self.latched = Err(CmdError::InflateError);
                    break;
                }
            }
        }
        self.inflater = Some(state);
    }

    fn end_write(&mut self) -> CmdResult {
        if self.mode == WriteMode::Idle {
            return Err(CmdError::NotInFlashMode);
        }
        self.mode = WriteMode::Idle;
        self.inflater = None;
        let latched = self.latched;
        self.latched = Ok(());
        latched?;
        if self.remaining > 0 {
            return Err(CmdError::NotEnoughData);
        }
        Ok(())
    }

    fn read_flash(&mut self, offset: u32, len: u32, block_size: u32, _max_in_flight: u32) {
        // The blocking transmitter provides the backpressure; the window
        // the host requests is never exceeded by more than one block
        let block = (block_size as usize).clamp(1, READ_CHUNK);
        let mut buf = [0u8; READ_CHUNK];
        let mut digest = Md5::new();
        let mut sent: u32 = 0;
        while sent < len {
            let chunk = ((len - sent) as usize).min(block);
            if self
                .flash
                .blocking_read(offset.wrapping_add(sent), &mut buf[..chunk])
                .is_err()
            {
                return;
            }
            digest.update(&buf[..chunk]);
            self.out.borrow_mut().send_frame(&buf[..chunk]);
            sent += chunk as u32;
        }
        // Trailing digest frame lets the host verify the whole read
        let digest: [u8; MD5_DIGEST_LEN] = digest.finalize().into();
        self.out.borrow_mut().send_frame(&digest);
    }

    fn compute_md5(&mut self, addr: u32, len: u32) -> Result<[u8; MD5_DIGEST_LEN], CmdError> {
        let mut buf = [0u8; READ_CHUNK];
        let mut hasher = Md5::new();
        let mut done: u32 = 0;
        while done < len {
            let chunk = ((len - done) as usize).min(READ_CHUNK);
            self.flash
                .blocking_read(addr.wrapping_add(done), &mut buf[..chunk])
                .map_err(|_| CmdError::FailedSpiOp)?;
            hasher.update(&buf[..chunk]);
            done += chunk as u32;
        }
        Ok(hasher.finalize().into())
    }

    fn in_write_mode(&self) -> bool {
        self.mode != WriteMode::Idle
    }

    fn last_error(&self) -> CmdResult {
        self.latched
    }
}

/// The RP2040's QSPI flash hangs off dedicated pins, so attach has
/// nothing to do; geometry is recorded as-is.
#[derive(Default)]
pub struct QspiControl {
    pub params: Option<SpiParams>,
}

impl SpiControl for QspiControl {
    fn attach(&mut self, _arg: u32, _is_legacy: bool) -> CmdResult {
        Ok(())
    }

    fn set_params(&mut self, params: SpiParams) -> Result<(), SpiFault> {
        self.params = Some(params);
        Ok(())
    }
}
