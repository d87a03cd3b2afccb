//! Serial wire protocol for the Stoker flash loader stub
//!
//! The stub speaks a SLIP-framed command/response protocol over the UART
//! it was loaded through. The host sends one command per frame; the stub
//! answers every command with exactly one response frame (bulk flash
//! reads follow as additional frames).
//!
//! # Frame contents
//!
//! ```text
//! Command  ┌───────────┬────┬──────────┬─────────────┬──────────────┐
//!          │ direction │ op │ data_len │ checksum    │ payload      │
//!          │ 1B (0)    │ 1B │ 2B LE    │ 4B LE (low) │ data_len B   │
//!          └───────────┴────┴──────────┴─────────────┴──────────────┘
//! Response ┌──────┬─────────┬─────────┬───────┬────────┬───────┬────────┐
//!          │ resp │ op_echo │ len_ret │ value │ inline │ error │ status │
//!          │ 1B=1 │ 1B      │ 2B LE   │ 4B LE │ 0-16B  │ 1B    │ 1B     │
//!          └──────┴─────────┴─────────┴───────┴────────┴───────┴────────┘
//! ```
//!
//! Everything is little-endian and SLIP-escaped on the wire. The
//! `checksum` field is only meaningful for streamed data commands, where
//! it covers the payload after the 16-byte block sub-header.

#![no_std]
#![deny(unsafe_code)]

#[cfg(test)]
extern crate std;

pub mod checksum;
pub mod command;
pub mod response;
pub mod slip;

pub use checksum::payload_checksum;
pub use command::{CommandFrame, Op, CMD_HEADER_LEN, MAX_DATA_LEN, MAX_WRITE_BLOCK};
pub use response::{CmdError, CmdResult, ResponseHeader};
pub use slip::{encode_frame, EncodeError, SlipAction, SlipDecoder};
