//! Double-buffered frame reception
//!
//! Bytes arrive asynchronously (an interrupt-fed ring buffer on real
//! hardware); completed frames are consumed by the dispatch loop. Two
//! fixed buffers alternate so the next command can stream in while the
//! previous one is still being processed - that overlap is what keeps
//! the write pipeline fed during flashing.
//!
//! The handoff slot has depth 1. If a second frame completes before the
//! first is taken, the first is dropped; with only two buffers, bursts
//! deeper than one pending command are not supported.

use stoker_protocol::command::MAX_DATA_LEN;
use stoker_protocol::slip::{SlipAction, SlipDecoder};
use stoker_protocol::CMD_HEADER_LEN;

/// Receive buffer size: the largest accepted command plus slack
pub const RX_BUF_SIZE: usize = CMD_HEADER_LEN + MAX_DATA_LEN + 40;

/// Double-buffered receiver with a depth-1 ready slot
#[derive(Debug)]
pub struct FrameReceiver {
    bufs: [[u8; RX_BUF_SIZE]; 2],
    decoder: SlipDecoder,
    /// Which buffer decoded bytes currently land in
    active: usize,
    /// Bytes written into the active buffer so far
    written: usize,
    /// Completed command: (buffer index, frame length)
    ready: Option<(usize, usize)>,
}

impl Default for FrameReceiver {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameReceiver {
    /// Create a receiver with both buffers zeroed and idle
    pub fn new() -> Self {
        Self {
            bufs: [[0; RX_BUF_SIZE]; 2],
            decoder: SlipDecoder::new(),
            active: 0,
            written: 0,
            ready: None,
        }
    }

    /// Feed one raw byte from the link
    ///
    /// Called from the receive path; must never block.
    pub fn on_byte(&mut self, raw: u8) {
        match self.decoder.feed(raw) {
            SlipAction::None => {}
            SlipAction::Byte(byte) => {
                self.bufs[self.active][self.written] = byte;
                self.written += 1;
                if self.written == RX_BUF_SIZE {
                    // No valid command is this long. Terminate the frame
                    // here so the dispatcher's length check rejects it;
                    // whatever follows lands in the other buffer as a
                    // second malformed command.
                    self.publish();
                }
            }
            SlipAction::FrameEnd => self.publish(),
        }
    }

    /// Publish the active buffer as a completed command and swap
    fn publish(&mut self) {
        // Overwrites an unconsumed command, losing the older one
        self.ready = Some((self.active, self.written));
        self.active ^= 1;
        self.written = 0;
    }

    /// Take the pending command, if any
    ///
    /// Clears the ready slot before handing out the buffer; the borrow
    /// keeps the receiver idle while the dispatcher works on the frame.
    pub fn take_command(&mut self) -> Option<&[u8]> {
        let (index, len) = self.ready.take()?;
        Some(&self.bufs[index][..len])
    }

    /// Whether a completed command is waiting
    pub fn pending(&self) -> bool {
        self.ready.is_some()
    }
}
