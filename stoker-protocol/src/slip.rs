//! SLIP framing for the loader serial link.
//!
//! Frames are delimited by [`END`] (0xC0). An in-frame 0xC0 is sent as
//! `ESC ESC_END` and an in-frame 0xDB as `ESC ESC_ESC`, so the delimiter
//! can never appear inside a frame on the wire.

use heapless::Vec;

/// Frame delimiter
pub const END: u8 = 0xC0;

/// Escape introducer
pub const ESC: u8 = 0xDB;

/// Escaped stand-in for an in-frame END byte
pub const ESC_END: u8 = 0xDC;

/// Escaped stand-in for an in-frame ESC byte
pub const ESC_ESC: u8 = 0xDD;

/// Errors that can occur while encoding a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum EncodeError {
    /// Output buffer cannot hold the escaped frame
    BufferFull,
}

/// Result of feeding one raw byte to the decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SlipAction {
    /// Byte consumed, nothing decoded yet
    None,
    /// One decoded in-frame byte
    Byte(u8),
    /// The current frame is complete
    FrameEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Between frames; bytes are discarded until a delimiter opens one
    NoFrame,
    /// Inside a frame
    InFrame,
    /// Saw ESC, waiting for the escaped code
    Escaping,
}

/// Byte-at-a-time SLIP decoder
///
/// Holds no data of its own; the caller owns the buffer that decoded
/// bytes accumulate into.
#[derive(Debug, Clone)]
pub struct SlipDecoder {
    state: DecodeState,
}

impl Default for SlipDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SlipDecoder {
    /// Create a decoder waiting for the opening delimiter
    pub fn new() -> Self {
        Self {
            state: DecodeState::NoFrame,
        }
    }

    /// Reset to the between-frames state
    pub fn reset(&mut self) {
        self.state = DecodeState::NoFrame;
    }

    /// Feed a single raw byte from the link
    pub fn feed(&mut self, raw: u8) -> SlipAction {
        match self.state {
            DecodeState::NoFrame => {
                if raw == END {
                    self.state = DecodeState::InFrame;
                }
                // Anything else is line noise between frames
                SlipAction::None
            }
            DecodeState::InFrame => match raw {
                END => {
                    self.state = DecodeState::NoFrame;
                    SlipAction::FrameEnd
                }
                ESC => {
                    self.state = DecodeState::Escaping;
                    SlipAction::None
                }
                _ => SlipAction::Byte(raw),
            },
            DecodeState::Escaping => {
                self.state = DecodeState::InFrame;
                match raw {
                    ESC_END => SlipAction::Byte(END),
                    ESC_ESC => SlipAction::Byte(ESC),
                    // Not a legal escape; pass the raw byte through so the
                    // command-level length check decides the frame's fate
                    _ => SlipAction::Byte(raw),
                }
            }
        }
    }
}

/// Encode `payload` into a complete delimited frame
pub fn encode_frame<const N: usize>(payload: &[u8]) -> Result<Vec<u8, N>, EncodeError> {
    let mut out = Vec::new();
    out.push(END).map_err(|_| EncodeError::BufferFull)?;
    for &byte in payload {
        match byte {
            END => {
                out.push(ESC).map_err(|_| EncodeError::BufferFull)?;
                out.push(ESC_END).map_err(|_| EncodeError::BufferFull)?;
            }
            ESC => {
                out.push(ESC).map_err(|_| EncodeError::BufferFull)?;
                out.push(ESC_ESC).map_err(|_| EncodeError::BufferFull)?;
            }
            _ => out.push(byte).map_err(|_| EncodeError::BufferFull)?,
        }
    }
    out.push(END).map_err(|_| EncodeError::BufferFull)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decode_all(bytes: &[u8]) -> (std::vec::Vec<u8>, usize) {
        let mut decoder = SlipDecoder::new();
        let mut decoded = std::vec::Vec::new();
        let mut frames = 0;
        for &b in bytes {
            match decoder.feed(b) {
                SlipAction::None => {}
                SlipAction::Byte(v) => decoded.push(v),
                SlipAction::FrameEnd => frames += 1,
            }
        }
        (decoded, frames)
    }

    #[test]
    fn test_decode_plain_frame() {
        let (decoded, frames) = decode_all(&[END, 1, 2, 3, END]);
        assert_eq!(decoded, [1, 2, 3]);
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_decode_ignores_interframe_noise() {
        let (decoded, frames) = decode_all(&[0x55, 0xAA, END, 7, END]);
        assert_eq!(decoded, [7]);
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_decode_escape_sequences() {
        let (decoded, frames) = decode_all(&[END, ESC, ESC_END, ESC, ESC_ESC, END]);
        assert_eq!(decoded, [END, ESC]);
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_decode_unmapped_escape_passes_raw_byte() {
        // Not a legal escape code; the decoder stays in-frame and keeps
        // the byte rather than silently shortening the frame
        let (decoded, frames) = decode_all(&[END, ESC, 0x42, 9, END]);
        assert_eq!(decoded, [0x42, 9]);
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_decode_empty_frame() {
        let (decoded, frames) = decode_all(&[END, END]);
        assert!(decoded.is_empty());
        assert_eq!(frames, 1);
    }

    #[test]
    fn test_encode_escapes_reserved_bytes() {
        let frame = encode_frame::<16>(&[1, END, 2, ESC, 3]).unwrap();
        assert_eq!(frame, [END, 1, ESC, ESC_END, 2, ESC, ESC_ESC, 3, END]);
    }

    #[test]
    fn test_encode_empty_payload() {
        let frame = encode_frame::<4>(&[]).unwrap();
        assert_eq!(frame, [END, END]);
    }

    #[test]
    fn test_encode_overflow() {
        assert_eq!(encode_frame::<4>(&[1, 2, 3]), Err(EncodeError::BufferFull));
    }

    proptest! {
        #[test]
        fn prop_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..256)) {
            // Worst case every byte escapes: 2 * 256 + 2 delimiters
            let encoded = encode_frame::<514>(&payload).unwrap();
            let (decoded, frames) = decode_all(&encoded);
            prop_assert_eq!(decoded, payload);
            prop_assert_eq!(frames, 1);
        }

        #[test]
        fn prop_no_bare_delimiter_inside_frame(payload in prop::collection::vec(any::<u8>(), 0..256)) {
            let encoded = encode_frame::<514>(&payload).unwrap();
            for &b in &encoded[1..encoded.len() - 1] {
                prop_assert_ne!(b, END);
            }
        }
    }
}
