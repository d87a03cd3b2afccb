//! Flash programming pipeline trait

use stoker_protocol::response::{CmdError, CmdResult, MD5_DIGEST_LEN};

/// Flash operations consumed by the command dispatcher
///
/// A write session is opened by one of the begin calls and closed by
/// [`FlashOps::end_write`]. Block writes are deliberately infallible at
/// the call site: they run after the block has already been acknowledged
/// to the host, so failures latch into the session and surface through
/// [`FlashOps::last_error`] on the next data command (or at end-of-session).
pub trait FlashOps {
    /// Erase the entire chip
    fn erase_all(&mut self) -> CmdResult;

    /// Erase `len` bytes starting at `addr`
    fn erase_region(&mut self, addr: u32, len: u32) -> CmdResult;

    /// Open a plain write session of `total_size` bytes at `offset`
    fn begin_write(&mut self, total_size: u32, offset: u32) -> CmdResult;

    /// Open a compressed write session
    ///
    /// `total_size` counts compressed bytes on the wire;
    /// `uncompressed_size` is what lands in flash.
    fn begin_deflated_write(
        &mut self,
        uncompressed_size: u32,
        total_size: u32,
        offset: u32,
    ) -> CmdResult;

    /// Queue one verified block for the open plain session
    fn write_block(&mut self, data: &[u8]);

    /// Queue one verified compressed block for the open session
    fn write_deflated_block(&mut self, data: &[u8]);

    /// Close the write session
    fn end_write(&mut self) -> CmdResult;

    /// Stream `len` bytes from `offset` back to the host
    ///
    /// The implementation owns its side of the link and emits its own
    /// frames (data blocks in `block_size` chunks, then a digest frame),
    /// honoring `max_in_flight` as its flow-control window.
    fn read_flash(&mut self, offset: u32, len: u32, block_size: u32, max_in_flight: u32);

    /// MD5 digest of `len` bytes starting at `addr`
    fn compute_md5(&mut self, addr: u32, len: u32) -> Result<[u8; MD5_DIGEST_LEN], CmdError>;

    /// Whether a write session is currently open
    fn in_write_mode(&self) -> bool;

    /// Error latched by the block pipeline since the session opened
    fn last_error(&self) -> CmdResult;
}
