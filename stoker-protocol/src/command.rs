//! Command frame layout and operation codes

use crate::response::{CmdError, CmdResult};

/// Fixed command header length
pub const CMD_HEADER_LEN: usize = 8;

/// Sub-header carried by streamed data blocks: four u32 words
/// (payload length repeated, sequence number, two zeros)
pub const DATA_CMD_HEADER_LEN: usize = 16;

/// Largest block the write pipeline accepts
pub const MAX_WRITE_BLOCK: usize = 0x4000;

/// Largest `data_len` accepted before the fixed oversize rejection
pub const MAX_DATA_LEN: usize = MAX_WRITE_BLOCK + DATA_CMD_HEADER_LEN;

// Wire values for the operation selector
const OP_FLASH_BEGIN: u8 = 0x02;
const OP_FLASH_DATA: u8 = 0x03;
const OP_FLASH_END: u8 = 0x04;
const OP_WRITE_REG: u8 = 0x09;
const OP_READ_REG: u8 = 0x0A;
const OP_SPI_SET_PARAMS: u8 = 0x0B;
const OP_SPI_ATTACH: u8 = 0x0D;
const OP_CHANGE_BAUD: u8 = 0x0F;
const OP_FLASH_DEFL_BEGIN: u8 = 0x10;
const OP_FLASH_DEFL_DATA: u8 = 0x11;
const OP_FLASH_DEFL_END: u8 = 0x12;
const OP_FLASH_MD5: u8 = 0x13;
const OP_ERASE_FLASH: u8 = 0xD0;
const OP_ERASE_REGION: u8 = 0xD1;
const OP_READ_FLASH: u8 = 0xD2;

/// Operations the stub implements
///
/// The mask-ROM loader handles more (memory upload, sync); once the stub
/// is running those answer "not implemented" like any unknown byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Op {
    /// Open a plain write session
    FlashBegin,
    /// One checksummed block for the write session
    FlashData,
    /// Close the write session; arg0 == 0 reboots into the application
    FlashEnd,
    /// Raw register write (addr, value; mask and delay args ignored)
    WriteReg,
    /// Raw register read, returned in the response header value
    ReadReg,
    /// Program flash geometry
    SpiSetParams,
    /// Attach the SPI flash peripheral
    SpiAttach,
    /// Switch the link baud rate after the response is flushed
    ChangeBaud,
    /// Open a compressed write session
    FlashDeflBegin,
    /// One checksummed compressed block
    FlashDeflData,
    /// Close the compressed write session
    FlashDeflEnd,
    /// MD5 digest of a flash region, appended to the response
    FlashMd5,
    /// Erase the entire chip
    EraseFlash,
    /// Erase a region
    EraseRegion,
    /// Stream a flash region back to the host
    ReadFlash,
}

impl Op {
    /// Parse an operation from its wire byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            OP_FLASH_BEGIN => Some(Op::FlashBegin),
            OP_FLASH_DATA => Some(Op::FlashData),
            OP_FLASH_END => Some(Op::FlashEnd),
            OP_WRITE_REG => Some(Op::WriteReg),
            OP_READ_REG => Some(Op::ReadReg),
            OP_SPI_SET_PARAMS => Some(Op::SpiSetParams),
            OP_SPI_ATTACH => Some(Op::SpiAttach),
            OP_CHANGE_BAUD => Some(Op::ChangeBaud),
            OP_FLASH_DEFL_BEGIN => Some(Op::FlashDeflBegin),
            OP_FLASH_DEFL_DATA => Some(Op::FlashDeflData),
            OP_FLASH_DEFL_END => Some(Op::FlashDeflEnd),
            OP_FLASH_MD5 => Some(Op::FlashMd5),
            OP_ERASE_FLASH => Some(Op::EraseFlash),
            OP_ERASE_REGION => Some(Op::EraseRegion),
            OP_READ_FLASH => Some(Op::ReadFlash),
            _ => None,
        }
    }

    /// Convert to the wire byte
    pub fn to_byte(self) -> u8 {
        match self {
            Op::FlashBegin => OP_FLASH_BEGIN,
            Op::FlashData => OP_FLASH_DATA,
            Op::FlashEnd => OP_FLASH_END,
            Op::WriteReg => OP_WRITE_REG,
            Op::ReadReg => OP_READ_REG,
            Op::SpiSetParams => OP_SPI_SET_PARAMS,
            Op::SpiAttach => OP_SPI_ATTACH,
            Op::ChangeBaud => OP_CHANGE_BAUD,
            Op::FlashDeflBegin => OP_FLASH_DEFL_BEGIN,
            Op::FlashDeflData => OP_FLASH_DEFL_DATA,
            Op::FlashDeflEnd => OP_FLASH_DEFL_END,
            Op::FlashMd5 => OP_FLASH_MD5,
            Op::EraseFlash => OP_ERASE_FLASH,
            Op::EraseRegion => OP_ERASE_REGION,
            Op::ReadFlash => OP_READ_FLASH,
        }
    }
}

/// Borrowed view of one decoded command frame
///
/// `data_len` is the header's claim; [`CommandFrame::parse`] does not
/// require it to match the physical payload, so the dispatcher can still
/// echo an error for truncated frames.
#[derive(Debug, Clone, Copy)]
pub struct CommandFrame<'a> {
    /// Direction byte, 0 for host requests (accepted and ignored)
    pub direction: u8,
    /// Raw operation byte (may be unknown)
    pub op: u8,
    /// Payload length claimed by the header
    pub data_len: u16,
    /// Header checksum field; low byte covers streamed block payloads
    pub checksum: u32,
    /// Physical payload bytes
    pub data: &'a [u8],
}

impl<'a> CommandFrame<'a> {
    /// Parse a decoded frame; `None` if it cannot hold the fixed header
    pub fn parse(frame: &'a [u8]) -> Option<Self> {
        if frame.len() < CMD_HEADER_LEN {
            return None;
        }
        Some(Self {
            direction: frame[0],
            op: frame[1],
            data_len: u16::from_le_bytes([frame[2], frame[3]]),
            checksum: u32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]),
            data: &frame[CMD_HEADER_LEN..],
        })
    }

    /// Exact-length validation; every sized command requires an exact
    /// match, not a maximum
    pub fn verify_data_len(&self, expected: u16) -> CmdResult {
        if self.data_len == expected {
            Ok(())
        } else {
            Err(CmdError::BadDataLen)
        }
    }

    /// The i-th little-endian argument word of the payload
    pub fn arg(&self, idx: usize) -> Option<u32> {
        let start = idx.checked_mul(4)?;
        let bytes = self.data.get(start..start.checked_add(4)?)?;
        let mut word = [0u8; 4];
        word.copy_from_slice(bytes);
        Some(u32::from_le_bytes(word))
    }

    /// Streamed block payload after the 16-byte sub-header
    pub fn block_payload(&self) -> &'a [u8] {
        self.data.get(DATA_CMD_HEADER_LEN..).unwrap_or(&[])
    }
}
