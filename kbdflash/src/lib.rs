//! # kbdflash
//!
//! A library for reading and writing the flash of USB keyboard controllers
//! that speak a vendor-specific 64-byte frame protocol.
//!
//! This crate provides:
//!
//! - CRC16-XMODEM frame checksums
//! - The 64-byte command frame builder
//! - A transport adapter with the protocol's pacing and length contract
//! - Flash operations (bump, flash mode, region read/write/check, full dump)
//!
//! ## Features
//!
//! - `native` (default): libusb access via the `rusb` crate
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use kbdflash::{KeyboardFlasher, UsbConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut flasher = KeyboardFlasher::open(&UsbConfig::default())?;
//!
//!         let version = flasher.read_version()?;
//!         println!("Version: {}", kbdflash::hex::to_hex(&version));
//!
//!         flasher.dump_firmware("flash.img", &mut |current, total| {
//!             println!("Reading {current}/{total}");
//!         })?;
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod device;
pub mod error;
pub mod hex;
pub mod image;
pub mod port;
pub mod protocol;
pub mod target;
pub mod transport;

#[cfg(feature = "native")]
pub use port::NativeUsbPort;
pub use {
    device::{DetectedDevice, DeviceKind, KNOWN_KEYBOARDS, detect_devices},
    error::{Error, ErrorKind, Result},
    image::FirmwareImage,
    port::{ControlRequest, MockPort, UsbConfig, UsbPort},
    protocol::{Command, Frame, Region, checksum},
    target::{KeyboardFlasher, ProgressFn},
    transport::Transport,
};
