//! SPI flash attachment and geometry trait

use stoker_protocol::response::{CmdError, CmdResult};

/// Default geometry programmed at session start; the host usually
/// replaces it with the detected chip's real layout.
pub const DEFAULT_TOTAL_SIZE: u32 = 16 * 1024 * 1024;
pub const DEFAULT_BLOCK_SIZE: u32 = 64 * 1024;
pub const DEFAULT_SECTOR_SIZE: u32 = 4 * 1024;
pub const DEFAULT_PAGE_SIZE: u32 = 256;
pub const DEFAULT_STATUS_MASK: u32 = 0xFFFF;

/// Flash geometry as sent by SPI_SET_PARAMS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiParams {
    /// Flash chip id (informational)
    pub id: u32,
    pub total_size: u32,
    pub block_size: u32,
    pub sector_size: u32,
    pub page_size: u32,
    /// Mask applied when polling the chip's status register
    pub status_mask: u32,
}

impl Default for SpiParams {
    fn default() -> Self {
        Self {
            id: 0,
            total_size: DEFAULT_TOTAL_SIZE,
            block_size: DEFAULT_BLOCK_SIZE,
            sector_size: DEFAULT_SECTOR_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            status_mask: DEFAULT_STATUS_MASK,
        }
    }
}

/// A geometry failure carries the auxiliary status byte alongside the
/// protocol error code; both travel in the response's trailing pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiFault {
    pub error: CmdError,
    pub status: u8,
}

/// SPI peripheral configuration consumed by the dispatcher
pub trait SpiControl {
    /// Attach the SPI flash peripheral
    ///
    /// `arg` selects the pin configuration; `is_legacy` requests the
    /// older attach path on chips that have one.
    fn attach(&mut self, arg: u32, is_legacy: bool) -> CmdResult;

    /// Program the flash geometry
    fn set_params(&mut self, params: SpiParams) -> Result<(), SpiFault>;
}
