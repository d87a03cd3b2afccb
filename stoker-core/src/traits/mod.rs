//! Hardware collaborator traits
//!
//! The dispatcher drives everything through these seams; the firmware
//! crate provides the real implementations and the test suite provides
//! recording mocks.

pub mod flash;
pub mod link;
pub mod regs;
pub mod spi;

pub use flash::FlashOps;
pub use link::SerialLink;
pub use regs::RegisterBus;
pub use spi::{SpiControl, SpiFault, SpiParams};
