//! Command validation, dispatch, and response emission
//!
//! Every command runs in two phases around its response frame:
//!
//! - **pre**: validation and any work whose result belongs in the
//!   response (register reads, erases, digest computation, block
//!   checksum checks)
//! - **post**: side effects that would disturb the transport if they ran
//!   before the response was out - baud changes, bulk read streaming,
//!   consuming an already-acknowledged data block, rebooting
//!
//! Data blocks are acknowledged before they are consumed so the host can
//! keep the next block in flight while the previous one is programmed.

use heapless::Vec;
use stoker_protocol::checksum::payload_checksum;
use stoker_protocol::command::{CommandFrame, Op, DATA_CMD_HEADER_LEN, MAX_DATA_LEN};
use stoker_protocol::response::{
    encode_response, CmdError, CmdResult, ResponseHeader, MD5_DIGEST_LEN, OVERSIZE_STATUS,
};

use crate::traits::{FlashOps, RegisterBus, SerialLink, SpiControl, SpiParams};

/// Why the dispatch loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionEnd {
    /// Terminal boot command: control goes to the application
    BootApp,
    /// Defensive fallback; no command produces this today
    ReturnToLoader,
}

/// Command dispatcher over the four hardware seams
pub struct Dispatcher<F, S, R, L> {
    pub(crate) flash: F,
    pub(crate) spi: S,
    pub(crate) regs: R,
    pub(crate) link: L,
    /// UART source clock, for divider math on baud changes
    pub(crate) uart_clock_hz: u32,
}

impl<F, S, R, L> Dispatcher<F, S, R, L>
where
    F: FlashOps,
    S: SpiControl,
    R: RegisterBus,
    L: SerialLink,
{
    pub fn new(flash: F, spi: S, regs: R, link: L, uart_clock_hz: u32) -> Self {
        Self {
            flash,
            spi,
            regs,
            link,
            uart_clock_hz,
        }
    }

    /// Process one completed frame
    ///
    /// Always answers with a single response frame, except for frames
    /// too short to carry an op byte worth echoing. Returns `Some` only
    /// for the terminal boot command.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Option<SessionEnd> {
        let cmd = CommandFrame::parse(frame)?;

        let mut header = ResponseHeader {
            op: cmd.op,
            value: 0,
        };
        // READ_REG is the only command that fills the response value
        // before the header goes out
        if cmd.op == Op::ReadReg.to_byte() && cmd.data_len == 4 {
            if let Some(addr) = cmd.arg(0) {
                header.value = self.regs.read(addr);
            }
        }

        if usize::from(cmd.data_len) > MAX_DATA_LEN {
            self.send_response(&header, &[], CmdError::BadDataLen.code(), OVERSIZE_STATUS);
            return None;
        }
        if cmd.data.len() != usize::from(cmd.data_len) {
            // Truncated in transit, or force-terminated by the receiver
            self.send_response(&header, &[], CmdError::BadDataLen.code(), 0);
            return None;
        }

        let mut inline = Vec::<u8, MD5_DIGEST_LEN>::new();
        let mut status: u8 = 0;
        let result = self.pre_action(&cmd, &mut inline, &mut status);

        let error = match result {
            Ok(()) => 0,
            Err(e) => e.code(),
        };
        self.send_response(&header, &inline, error, status);

        if result.is_ok() {
            self.post_action(&cmd)
        } else {
            None
        }
    }

    /// First phase: validate and execute everything that must finish
    /// before the response is sent
    fn pre_action(
        &mut self,
        cmd: &CommandFrame<'_>,
        inline: &mut Vec<u8, MD5_DIGEST_LEN>,
        status: &mut u8,
    ) -> CmdResult {
        let Some(op) = Op::from_byte(cmd.op) else {
            return Err(CmdError::NotImplemented);
        };

        match op {
            Op::EraseFlash => {
                cmd.verify_data_len(0)?;
                self.flash.erase_all()
            }
            Op::EraseRegion => {
                // args: addr, len
                cmd.verify_data_len(8)?;
                self.flash
                    .erase_region(cmd.arg(0).unwrap_or(0), cmd.arg(1).unwrap_or(0))
            }
            Op::ChangeBaud => {
                // two args, the second ignored; the divider moves only
                // after the reply is out
                cmd.verify_data_len(8)
            }
            Op::ReadFlash => {
                // data is streamed after the reply
                cmd.verify_data_len(16)
            }
            Op::FlashMd5 => {
                // four args on the wire, only addr and len are used
                cmd.verify_data_len(16)?;
                let digest = self
                    .flash
                    .compute_md5(cmd.arg(0).unwrap_or(0), cmd.arg(1).unwrap_or(0))?;
                inline
                    .extend_from_slice(&digest)
                    .map_err(|_| CmdError::InvalidCommand)?;
                Ok(())
            }
            Op::FlashBegin => {
                // args: erase_size (ignored), num_blocks, block_size, offset
                cmd.verify_data_len(16)?;
                let total = cmd.arg(1).unwrap_or(0).wrapping_mul(cmd.arg(2).unwrap_or(0));
                self.flash.begin_write(total, cmd.arg(3).unwrap_or(0))
            }
            Op::FlashDeflBegin => {
                // args: uncompressed_size, num_blocks, block_size, offset
                cmd.verify_data_len(16)?;
                let total = cmd.arg(1).unwrap_or(0).wrapping_mul(cmd.arg(2).unwrap_or(0));
                self.flash
                    .begin_deflated_write(cmd.arg(0).unwrap_or(0), total, cmd.arg(3).unwrap_or(0))
            }
            Op::FlashData | Op::FlashDeflData => self.check_data_block(cmd),
            Op::FlashEnd | Op::FlashDeflEnd => self.flash.end_write(),
            Op::SpiSetParams => {
                // args: id, total_size, block_size, sector_size, page_size, status_mask
                cmd.verify_data_len(24)?;
                let params = SpiParams {
                    id: cmd.arg(0).unwrap_or(0),
                    total_size: cmd.arg(1).unwrap_or(0),
                    block_size: cmd.arg(2).unwrap_or(0),
                    sector_size: cmd.arg(3).unwrap_or(0),
                    page_size: cmd.arg(4).unwrap_or(0),
                    status_mask: cmd.arg(5).unwrap_or(0),
                };
                self.spi.set_params(params).map_err(|fault| {
                    *status = fault.status;
                    fault.error
                })
            }
            Op::SpiAttach => {
                // args: pin configuration word, legacy flag
                cmd.verify_data_len(8)?;
                self.spi
                    .attach(cmd.arg(0).unwrap_or(0), cmd.arg(1).unwrap_or(0) & 0xFF != 0)
            }
            Op::WriteReg => {
                // args: addr, value, mask (ignored), delay_us (ignored)
                cmd.verify_data_len(16)?;
                self.regs
                    .write(cmd.arg(0).unwrap_or(0), cmd.arg(1).unwrap_or(0));
                Ok(())
            }
            Op::ReadReg => {
                // the register was read into the header up front
                cmd.verify_data_len(4)
            }
        }
    }

    /// Validate a streamed data block against its sub-header and the
    /// command checksum; the block itself is consumed post-response
    fn check_data_block(&mut self, cmd: &CommandFrame<'_>) -> CmdResult {
        if !self.flash.in_write_mode() {
            return Err(CmdError::NotInFlashMode);
        }
        let mut result = self.flash.last_error();
        let payload = cmd.block_payload();
        // The first sub-header word repeats the payload length
        if usize::from(cmd.data_len) < DATA_CMD_HEADER_LEN
            || cmd.arg(0) != Some(payload.len() as u32)
        {
            result = Err(CmdError::BadDataLen);
        }
        if u32::from(payload_checksum(payload)) != cmd.checksum {
            result = Err(CmdError::BadDataChecksum);
        }
        result
    }

    /// Second phase: side effects that must wait for the response frame
    fn post_action(&mut self, cmd: &CommandFrame<'_>) -> Option<SessionEnd> {
        match Op::from_byte(cmd.op)? {
            Op::ChangeBaud => {
                if let Some(baud) = cmd.arg(0).filter(|&b| b != 0) {
                    // let the acknowledgement drain at the old rate
                    self.link.delay_us(10_000);
                    let divider = baud_to_divider(self.uart_clock_hz, baud);
                    self.link.set_baud_divider(divider);
                    self.link.delay_us(1_000);
                }
                None
            }
            Op::ReadFlash => {
                // args: offset, length, block_size, max_in_flight
                self.flash.read_flash(
                    cmd.arg(0).unwrap_or(0),
                    cmd.arg(1).unwrap_or(0),
                    cmd.arg(2).unwrap_or(0),
                    cmd.arg(3).unwrap_or(0),
                );
                None
            }
            Op::FlashData => {
                self.flash.write_block(cmd.block_payload());
                None
            }
            Op::FlashDeflData => {
                self.flash.write_deflated_block(cmd.block_payload());
                None
            }
            Op::FlashEnd | Op::FlashDeflEnd => {
                // arg0 == 0 asks for an immediate reboot into the
                // application; a missing or nonzero arg stays in the stub
                if cmd.arg(0) == Some(0) {
                    self.link.flush();
                    self.link.reboot();
                    return Some(SessionEnd::BootApp);
                }
                None
            }
            _ => None,
        }
    }

    fn send_response(&mut self, header: &ResponseHeader, inline: &[u8], error: u8, status: u8) {
        // Capacity failure is unreachable: inline is bounded by the
        // digest length the payload maximum already accounts for
        if let Ok(frame) = encode_response(header, inline, error, status) {
            self.link.send(&frame);
        }
    }
}

/// Divider for the UART source clock, rounded to nearest
fn baud_to_divider(clock_hz: u32, baud: u32) -> u32 {
    (clock_hz.wrapping_add(baud / 2)) / baud
}
