//! Session entry and teardown
//!
//! A session begins when the loader jumps into the stub and ends when a
//! terminal flash-end command reboots into the application. All engine
//! state lives in the [`Session`] object, built fresh at entry and
//! implicitly discarded at handoff.

use stoker_protocol::slip;

use crate::dispatch::{Dispatcher, SessionEnd};
use crate::rx::FrameReceiver;
use crate::traits::{FlashOps, RegisterBus, SerialLink, SpiControl, SpiParams};

/// Greeting magic ("OHAI" in little-endian), sent unsolicited so the
/// host knows the stub is running
pub const GREETING_MAGIC: u32 = 0x4941_484F;

/// Settle time before and after handing the link over
const SETTLE_US: u32 = 10_000;

/// Per-board session parameters
#[derive(Debug, Clone, Copy)]
pub struct SessionConfig {
    /// UART source clock; boards override with their real clock so baud
    /// divider math comes out right
    pub uart_clock_hz: u32,
    /// Geometry programmed before the host takes over
    pub default_spi_params: SpiParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            uart_clock_hz: 52_000_000,
            default_spi_params: SpiParams::default(),
        }
    }
}

/// Asynchronous byte supply for [`Session::run`]
pub trait ByteSource {
    /// Next raw byte if one is waiting; must not block
    fn poll_byte(&mut self) -> Option<u8>;
}

/// One loader session: receiver plus dispatcher
pub struct Session<F, S, R, L> {
    config: SessionConfig,
    rx: FrameReceiver,
    dispatcher: Dispatcher<F, S, R, L>,
}

impl<F, S, R, L> Session<F, S, R, L>
where
    F: FlashOps,
    S: SpiControl,
    R: RegisterBus,
    L: SerialLink,
{
    pub fn new(config: SessionConfig, flash: F, spi: S, regs: R, link: L) -> Self {
        let uart_clock_hz = config.uart_clock_hz;
        Self {
            config,
            rx: FrameReceiver::new(),
            dispatcher: Dispatcher::new(flash, spi, regs, link, uart_clock_hz),
        }
    }

    /// Announce readiness and program default flash geometry
    ///
    /// Call once, before feeding any bytes.
    pub fn start(&mut self) {
        let greeting = GREETING_MAGIC.to_le_bytes();
        if let Ok(frame) = slip::encode_frame::<10>(&greeting) {
            self.dispatcher.link.send(&frame);
        }
        // Nobody is listening for errors this early; the host reprograms
        // the geometry once it has probed the actual chip
        let _ = self.dispatcher.spi.attach(0, false);
        let _ = self.dispatcher.spi.set_params(self.config.default_spi_params);
    }

    /// Receive-path entry point; feed every raw link byte here
    pub fn on_byte(&mut self, raw: u8) {
        self.rx.on_byte(raw);
    }

    /// Dispatch the pending command, if one has completed
    pub fn poll(&mut self) -> Option<SessionEnd> {
        let frame = self.rx.take_command()?;
        self.dispatcher.handle_frame(frame)
    }

    /// Run the session to completion
    ///
    /// Spin-polls `source` - there is no blocking wait in the target
    /// environment - dispatching each command as its frame completes,
    /// until the terminal boot command hands control back.
    pub fn run<B: ByteSource>(&mut self, source: &mut B) -> SessionEnd {
        self.start();
        loop {
            while let Some(byte) = source.poll_byte() {
                self.on_byte(byte);
                // Drain the ready slot per byte: it has depth 1 and a
                // burst of frames must not overrun it
                if let Some(end) = self.poll() {
                    return self.finish(end);
                }
            }
            if let Some(end) = self.poll() {
                return self.finish(end);
            }
        }
    }

    fn finish(&mut self, end: SessionEnd) -> SessionEnd {
        // Let the final response clear the shifter before the handoff
        self.dispatcher.link.delay_us(SETTLE_US);
        end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{
        block_command, command, decode_frames, slip_frame, words, FlashCall, MockFlash, MockLink,
        MockRegs, MockSpi,
    };
    use stoker_protocol::payload_checksum;

    struct ScriptSource {
        data: std::vec::Vec<u8>,
        pos: usize,
    }

    impl ScriptSource {
        fn new(frames: &[std::vec::Vec<u8>]) -> Self {
            let mut data = std::vec::Vec::new();
            for frame in frames {
                data.extend_from_slice(frame);
            }
            Self { data, pos: 0 }
        }
    }

    impl ByteSource for ScriptSource {
        fn poll_byte(&mut self) -> Option<u8> {
            let byte = *self.data.get(self.pos)?;
            self.pos += 1;
            Some(byte)
        }
    }

    fn new_session() -> Session<MockFlash, MockSpi, MockRegs, MockLink> {
        Session::new(
            SessionConfig::default(),
            MockFlash::default(),
            MockSpi::default(),
            MockRegs::default(),
            MockLink::default(),
        )
    }

    #[test]
    fn test_start_sends_greeting_before_anything() {
        let mut session = new_session();
        session.start();

        let frames = decode_frames(&session.dispatcher.link.sent);
        assert_eq!(frames[0], [0x4F, 0x48, 0x41, 0x49]);
    }

    #[test]
    fn test_start_programs_default_geometry() {
        let mut session = new_session();
        session.start();

        assert_eq!(&session.dispatcher.spi.attaches[..], [(0, false)]);
        assert_eq!(
            session.dispatcher.spi.params,
            Some(SpiParams::default())
        );
    }

    #[test]
    fn test_run_full_write_session() {
        let payload = [0xA5u8; 128];
        let script = [
            slip_frame(&command(0xD1, 0, &words(&[0x1000, 0x1000]))),
            slip_frame(&command(0x02, 0, &words(&[0, 1, 128, 0x1000]))),
            slip_frame(&block_command(
                0x03,
                &payload,
                u32::from(payload_checksum(&payload)),
            )),
            slip_frame(&command(0x04, 0, &words(&[0]))),
        ];
        let mut source = ScriptSource::new(&script);

        let mut session = new_session();
        let end = session.run(&mut source);

        assert_eq!(end, SessionEnd::BootApp);
        assert_eq!(session.dispatcher.link.reboots, 1);
        assert_eq!(&session.dispatcher.flash.written[..], &payload[..]);
        assert!(session
            .dispatcher
            .flash
            .calls
            .contains(&FlashCall::EraseRegion {
                addr: 0x1000,
                len: 0x1000
            }));

        // Greeting plus one response per command
        let frames = decode_frames(&session.dispatcher.link.sent);
        assert_eq!(frames.len(), 5);
        // Every response reported success
        for response in &frames[1..] {
            assert_eq!(response[response.len() - 2], 0);
        }
        // Teardown settle after the terminal command
        assert_eq!(session.dispatcher.link.delays.last(), Some(&SETTLE_US));
    }

    #[test]
    fn test_commands_dispatch_in_arrival_order() {
        let script = [
            slip_frame(&command(0x09, 0, &words(&[0x4000_0000, 7, 0, 0]))),
            slip_frame(&command(0x0A, 0, &words(&[0x4000_0000]))),
            slip_frame(&command(0x04, 0, &words(&[0]))),
        ];
        let mut source = ScriptSource::new(&script);

        let mut session = new_session();
        session.run(&mut source);

        assert_eq!(&session.dispatcher.regs.writes[..], [(0x4000_0000, 7)]);
        assert_eq!(&session.dispatcher.regs.reads[..], [0x4000_0000]);
    }

    #[test]
    fn test_errors_do_not_end_the_session() {
        let script = [
            // Bad length: ERASE_REGION wants exactly 8 bytes
            slip_frame(&command(0xD1, 0, &words(&[0x1000]))),
            slip_frame(&command(0x04, 0, &words(&[0]))),
        ];
        let mut source = ScriptSource::new(&script);

        let mut session = new_session();
        let end = session.run(&mut source);

        assert_eq!(end, SessionEnd::BootApp);
        assert!(session.dispatcher.flash.calls.contains(&FlashCall::EndWrite));
    }
}
