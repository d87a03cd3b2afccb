//! Board-agnostic protocol engine for the Stoker flash loader stub
//!
//! This crate contains everything between the raw serial bytes and the
//! hardware collaborators:
//!
//! - Collaborator traits (flash pipeline, SPI geometry, register bus,
//!   serial link)
//! - Double-buffered frame reception with a depth-1 handoff slot
//! - Command validation, dispatch, and response emission
//! - Session entry and teardown
//!
//! The hardware side lives in the firmware crate; host tests drive the
//! engine with recording mocks.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod dispatch;
pub mod rx;
pub mod session;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use dispatch::{Dispatcher, SessionEnd};
pub use rx::FrameReceiver;
pub use session::{ByteSource, Session, SessionConfig};
