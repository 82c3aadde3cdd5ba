//! STK500v2 programmer implementation
//!
//! The STK500v2 protocol is spoken by the bootloader of the ATmega2560
//! based printer mainboards this tool targets (and a few other Arduino
//! platforms). Firmware is transferred over a plain serial port: the host
//! frames commands with a sequence number and XOR checksum, resets the
//! board by pulsing DTR, and programs flash page by page.

mod chips;
mod error;
mod frame;
mod ports;
mod programmer;

pub use chips::{AvrChip, find_chip};
pub use error::IspError;
pub use ports::detect_port;
pub use programmer::{Stk500v2, open};
