//! Serial link and platform control trait

/// The stub's side of the serial link, plus the platform controls that
/// ride on it
///
/// Writes are blocking and infallible; the protocol has no transport
/// error path, a host that stops listening simply stalls the stub.
pub trait SerialLink {
    /// Transmit bytes, blocking until queued
    fn send(&mut self, bytes: &[u8]);

    /// Block until every queued byte has left the wire
    fn flush(&mut self);

    /// Reprogram the UART clock divider
    ///
    /// Only called after the in-flight response has been given time to
    /// drain; changing the divider mid-frame would corrupt it.
    fn set_baud_divider(&mut self, divider: u32);

    /// Busy-wait for `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// End-of-session handoff into the application
    ///
    /// On hardware this resets the chip and never returns; test doubles
    /// record the call and return so the harness can observe it.
    fn reboot(&mut self);
}
