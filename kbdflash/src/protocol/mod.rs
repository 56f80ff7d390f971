//! Keyboard flash protocol implementation.
//!
//! Every request is a fixed 64-byte frame sent on the bulk OUT endpoint:
//!
//! ```text
//! +-----+------+--------+--------------+--------------+------------------+
//! | CMD | SCMD | CRC16  | Region start | Region end   |     Payload      |
//! +-----+------+--------+--------------+--------------+------------------+
//! | 1   | 1    | 2 (LE) | 4 (MSB first)| 4 (MSB first)| 52 (zero-padded) |
//! +-----+------+--------+--------------+--------------+------------------+
//! ```
//!
//! The CRC is computed over the whole 64-byte frame while the CRC slot is
//! still zero, then written into bytes 2..4.

pub mod address;
pub mod crc;
pub mod frame;

pub use address::{decode_address, encode_address};
pub use crc::{checksum, crc16};
pub use frame::{Command, Frame, Region, verify_checksum};

/// Size of every command and response frame.
pub const FRAME_SIZE: usize = 64;

/// Offset of the checksum field inside a frame.
pub const CHECKSUM_OFFSET: usize = 2;

/// Offset of the region start address.
pub const AREA_START_OFFSET: usize = 4;

/// Offset of the region end address.
pub const AREA_END_OFFSET: usize = 8;

/// Offset of the payload window.
pub const PAYLOAD_OFFSET: usize = 12;

/// Size of the payload window.
pub const PAYLOAD_SIZE: usize = FRAME_SIZE - PAYLOAD_OFFSET;

/// Size of one addressed flash region.
pub const REGION_SIZE: u32 = 64;

/// Size of the controller flash address space (128 KiB).
pub const FLASH_SIZE: u32 = 0x20000;

/// Flash offset of the firmware version block.
pub const VERSION_ADDRESS: u32 = 0x0000_2800;

/// HID class control-transfer constants.
pub mod hid {
    /// Direction bit: host to device.
    pub const HOST_TO_DEVICE: u8 = 0x00;
    /// Direction bit: device to host.
    pub const DEVICE_TO_HOST: u8 = 0x80;
    /// Request type: class.
    pub const CLASS: u8 = 0x20;
    /// Recipient: interface.
    pub const INTERFACE: u8 = 0x01;

    /// HID SET_REPORT request code.
    pub const SET_REPORT: u8 = 0x09;
    /// HID GET_REPORT request code.
    pub const GET_REPORT: u8 = 0x01;

    /// wValue used for SET_REPORT.
    pub const SET_REPORT_VALUE: u16 = 0x0200;
    /// wIndex used for SET_REPORT.
    pub const SET_REPORT_INDEX: u16 = 0;
    /// wValue used for GET_REPORT.
    pub const GET_REPORT_VALUE: u16 = 0x0100;
    /// wIndex used for GET_REPORT.
    pub const GET_REPORT_INDEX: u16 = 1;
    /// Number of bytes returned by GET_REPORT.
    pub const GET_REPORT_LEN: usize = 64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout_constants() {
        assert_eq!(PAYLOAD_SIZE, 52);
        assert_eq!(PAYLOAD_OFFSET, AREA_END_OFFSET + 4);
        assert_eq!(FLASH_SIZE / REGION_SIZE, 2048);
    }

    #[test]
    fn test_hid_request_types() {
        assert_eq!(hid::HOST_TO_DEVICE | hid::CLASS | hid::INTERFACE, 0x21);
        assert_eq!(hid::DEVICE_TO_HOST | hid::CLASS | hid::INTERFACE, 0xA1);
    }
}
