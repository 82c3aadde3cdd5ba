//! USB Device Firmware Upgrade (DFU) host implementation based on [`nusb`]
//!
//! Implements enough of the DFU 1.1 protocol with the STM32 extensions
//! ("DfuSe") to program STM32 bootloaders without dfu-util, plus a parser
//! for the DfuSe container format those bootloaders are shipped in.
//!
//! Useful references:
//! - DFU: [USB Device Firmware Upgrade Specification, Revision 1.1](https://www.usb.org/sites/default/files/DFU_1.1.pdf)
//! - DfuSe protocol: STMicroelectronics AN3156
//! - DfuSe file format: STMicroelectronics UM0391
//!
//! # Example
//!
//! ```no_run
//! use dfu::find_dfu_devices;
//!
//! match find_dfu_devices(None, None) {
//!     Ok(devices) => println!("Found {} DFU devices", devices.len()),
//!     Err(e) => println!("Error: {e}"),
//! }
//! ```
//!
//! [`nusb`]: https://docs.rs/nusb

use std::time::Duration;

pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_millis(4000u64);
pub(crate) const FALLBACK_TRANSFER_SIZE: u16 = 2048;

mod connection;
mod descriptor;
mod device;
mod dfuse;
mod error;
mod flash;
mod memory;

// Re-exports
pub use connection::{DfuConnection, DfuStatus, state_name};
pub use descriptor::{DFUSE_VERSION_NUMBER, FunctionalDescriptor};
pub use device::{DfuAltSetting, DfuDevice, find_dfu_devices};
pub use dfuse::{
    DfuseElement, DfuseFile, DfuseFormatError, DfuseTarget, is_dfuse_file,
    parse_dfuse,
};
pub use error::DfuError;
pub use flash::flash_elements;
pub use memory::{DfuMemory, DfuSegment};
