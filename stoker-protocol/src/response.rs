//! Response frame layout and status codes

use heapless::Vec;

use crate::slip::{self, EncodeError};

/// Fixed response header length
pub const RESPONSE_HEADER_LEN: usize = 8;

/// First byte of every response
pub const RESPONSE_FLAG: u8 = 1;

/// MD5 digest length, the only inline data a response carries
pub const MD5_DIGEST_LEN: usize = 16;

/// Status byte paired with `BadDataLen` when a command is rejected for
/// exceeding the maximum supported size
pub const OVERSIZE_STATUS: u8 = 0xEE;

/// Raw response payload bound: header, digest, error/status pair
pub const RESPONSE_PAYLOAD_MAX: usize = RESPONSE_HEADER_LEN + MD5_DIGEST_LEN + 2;

/// Encoded response bound: worst case every byte escapes, plus delimiters
pub const RESPONSE_FRAME_MAX: usize = 2 * RESPONSE_PAYLOAD_MAX + 2;

// Wire values for the error byte
const ERR_BAD_DATA_LEN: u8 = 0xC0;
const ERR_BAD_DATA_CHECKSUM: u8 = 0xC1;
const ERR_BAD_BLOCKSIZE: u8 = 0xC2;
const ERR_INVALID_COMMAND: u8 = 0xC3;
const ERR_FAILED_SPI_OP: u8 = 0xC4;
const ERR_FAILED_SPI_UNLOCK: u8 = 0xC5;
const ERR_NOT_IN_FLASH_MODE: u8 = 0xC6;
const ERR_INFLATE: u8 = 0xC7;
const ERR_NOT_ENOUGH_DATA: u8 = 0xC8;
const ERR_TOO_MUCH_DATA: u8 = 0xC9;
const ERR_NOT_IMPLEMENTED: u8 = 0xFF;

/// Protocol error codes carried in the trailing pair of a response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CmdError {
    /// Payload length disagrees with what the operation requires
    BadDataLen,
    /// Streamed payload checksum mismatch
    BadDataChecksum,
    /// Unacceptable block size
    BadBlocksize,
    /// Arguments rejected by the handler
    InvalidCommand,
    /// SPI flash operation failed
    FailedSpiOp,
    /// SPI flash would not unlock
    FailedSpiUnlock,
    /// Data command outside an open write session
    NotInFlashMode,
    /// Compressed stream could not be inflated
    InflateError,
    /// Write session closed before all promised bytes arrived
    NotEnoughData,
    /// Write session received more bytes than promised
    TooMuchData,
    /// Unknown operation byte
    NotImplemented,
    /// Collaborator-specific failure, reported verbatim (nonzero)
    Device(u8),
}

impl CmdError {
    /// Wire value for the error byte
    pub fn code(self) -> u8 {
        match self {
            CmdError::BadDataLen => ERR_BAD_DATA_LEN,
            CmdError::BadDataChecksum => ERR_BAD_DATA_CHECKSUM,
            CmdError::BadBlocksize => ERR_BAD_BLOCKSIZE,
            CmdError::InvalidCommand => ERR_INVALID_COMMAND,
            CmdError::FailedSpiOp => ERR_FAILED_SPI_OP,
            CmdError::FailedSpiUnlock => ERR_FAILED_SPI_UNLOCK,
            CmdError::NotInFlashMode => ERR_NOT_IN_FLASH_MODE,
            CmdError::InflateError => ERR_INFLATE,
            CmdError::NotEnoughData => ERR_NOT_ENOUGH_DATA,
            CmdError::TooMuchData => ERR_TOO_MUCH_DATA,
            CmdError::NotImplemented => ERR_NOT_IMPLEMENTED,
            CmdError::Device(code) => code,
        }
    }
}

/// What every command handler produces: success or a wire error code
pub type CmdResult = Result<(), CmdError>;

/// Response header, sent before the trailing error/status pair
///
/// `len_ret` is always encoded as zero; the host tooling ignores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ResponseHeader {
    /// Echo of the command's operation byte
    pub op: u8,
    /// Command-specific value (register contents for register reads)
    pub value: u32,
}

impl ResponseHeader {
    /// Encode the fixed 8-byte header
    pub fn encode(&self) -> [u8; RESPONSE_HEADER_LEN] {
        let mut out = [0u8; RESPONSE_HEADER_LEN];
        out[0] = RESPONSE_FLAG;
        out[1] = self.op;
        // bytes 2..4 are len_ret, left zero
        out[4..8].copy_from_slice(&self.value.to_le_bytes());
        out
    }
}

/// Assemble and SLIP-encode one complete response frame
///
/// `inline` is the op-specific data placed between the header and the
/// trailing pair (the MD5 digest today).
pub fn encode_response(
    header: &ResponseHeader,
    inline: &[u8],
    error: u8,
    status: u8,
) -> Result<Vec<u8, RESPONSE_FRAME_MAX>, EncodeError> {
    let mut payload = Vec::<u8, RESPONSE_PAYLOAD_MAX>::new();
    payload
        .extend_from_slice(&header.encode())
        .map_err(|_| EncodeError::BufferFull)?;
    payload
        .extend_from_slice(inline)
        .map_err(|_| EncodeError::BufferFull)?;
    payload.push(error).map_err(|_| EncodeError::BufferFull)?;
    payload.push(status).map_err(|_| EncodeError::BufferFull)?;
    slip::encode_frame(&payload)
}
