//! Command frame builder.

use crate::error::{Error, Result};
use crate::protocol::address::{AddressBytes, encode_address};
use crate::protocol::crc::checksum;
use crate::protocol::{
    AREA_END_OFFSET, AREA_START_OFFSET, CHECKSUM_OFFSET, FRAME_SIZE, PAYLOAD_OFFSET, PAYLOAD_SIZE,
    REGION_SIZE,
};
use std::fmt;

/// Commands understood by the keyboard controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Handshake / identification (3, 0). Answered with 64 bytes.
    Bump,
    /// Enter flash mode (4, 1).
    EnterFlashMode,
    /// Leave flash mode (4, 0).
    LeaveFlashMode,
    /// Read one region (1, 2). Answered with 64 bytes.
    ReadFlash,
    /// Write one region (1, 1).
    WriteFlash,
    /// Check one region against a payload (1, 0).
    CheckFlash,
}

impl Command {
    /// Command code (frame byte 0).
    pub fn code(self) -> u8 {
        match self {
            Self::Bump => 3,
            Self::EnterFlashMode | Self::LeaveFlashMode => 4,
            Self::ReadFlash | Self::WriteFlash | Self::CheckFlash => 1,
        }
    }

    /// Subcommand code (frame byte 1).
    pub fn subcode(self) -> u8 {
        match self {
            Self::Bump | Self::LeaveFlashMode | Self::CheckFlash => 0,
            Self::EnterFlashMode | Self::WriteFlash => 1,
            Self::ReadFlash => 2,
        }
    }

    /// Look up a command from its code pair.
    pub fn from_codes(code: u8, subcode: u8) -> Option<Self> {
        match (code, subcode) {
            (3, 0) => Some(Self::Bump),
            (4, 1) => Some(Self::EnterFlashMode),
            (4, 0) => Some(Self::LeaveFlashMode),
            (1, 2) => Some(Self::ReadFlash),
            (1, 1) => Some(Self::WriteFlash),
            (1, 0) => Some(Self::CheckFlash),
            _ => None,
        }
    }

    /// Whether the device answers this command with a 64-byte frame.
    pub fn expects_response(self) -> bool {
        matches!(self, Self::Bump | Self::ReadFlash)
    }
}

/// Addressed flash window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// First address of the window.
    pub start: u32,
    /// One past the last address of the window.
    pub end: u32,
}

impl Region {
    /// The 64-byte region starting at `start`.
    pub fn block(start: u32) -> Result<Self> {
        let end = start
            .checked_add(REGION_SIZE)
            .ok_or(Error::AddressOverflow { start })?;
        Ok(Self { start, end })
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}..0x{:08X}", self.start, self.end)
    }
}

/// A 64-byte command frame under construction.
///
/// Setters write their fields in place; [`Frame::finalize`] injects the
/// checksum and hands back the raw bytes, after which the frame is gone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    bytes: [u8; FRAME_SIZE],
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl Frame {
    /// A zeroed frame.
    pub fn new() -> Self {
        Self {
            bytes: [0; FRAME_SIZE],
        }
    }

    /// Build a complete request for `cmd`.
    ///
    /// `region` and `payload` are written only when present / non-empty.
    pub fn request(cmd: Command, region: Option<Region>, payload: &[u8]) -> Result<Self> {
        let mut frame = Self::new();
        frame.set_command(cmd.code(), cmd.subcode());
        if let Some(region) = region {
            frame.define_area(encode_address(region.start), encode_address(region.end));
        }
        if !payload.is_empty() {
            frame.set_payload(payload)?;
        }
        Ok(frame)
    }

    /// Write the command and subcommand bytes.
    pub fn set_command(&mut self, cmd: u8, subcmd: u8) {
        self.bytes[0] = cmd;
        self.bytes[1] = subcmd;
    }

    /// Write the region start (bytes 4..8) and end (bytes 8..12).
    ///
    /// Both addresses go out most-significant byte first, as produced by
    /// [`encode_address`]. Older host tools for this controller wrote the
    /// four bytes in reverse order, so a read of 0x2800 looks like
    /// `00 28 00 00 40 28 00 00` on their wire. If a device only answers
    /// that tool, the byte order here is the first thing to check.
    pub fn define_area(&mut self, start: AddressBytes, end: AddressBytes) {
        self.bytes[AREA_START_OFFSET..AREA_END_OFFSET].copy_from_slice(&start);
        self.bytes[AREA_END_OFFSET..PAYLOAD_OFFSET].copy_from_slice(&end);
    }

    /// Write the payload window, zero-filling whatever `data` does not cover.
    pub fn set_payload(&mut self, data: &[u8]) -> Result<()> {
        if data.len() > PAYLOAD_SIZE {
            return Err(Error::PayloadTooLong {
                len: data.len(),
                max: PAYLOAD_SIZE,
            });
        }
        let window = &mut self.bytes[PAYLOAD_OFFSET..];
        window.fill(0);
        window[..data.len()].copy_from_slice(data);
        Ok(())
    }

    /// Current frame contents.
    pub fn as_bytes(&self) -> &[u8; FRAME_SIZE] {
        &self.bytes
    }

    /// Inject the checksum and return the wire bytes.
    ///
    /// The CRC runs over all 64 bytes as they stand, checksum slot included.
    pub fn finalize(mut self) -> [u8; FRAME_SIZE] {
        let crc = checksum(&self.bytes);
        self.bytes[CHECKSUM_OFFSET..CHECKSUM_OFFSET + 2].copy_from_slice(&crc);
        self.bytes
    }
}

/// Check the embedded checksum of a finalized frame.
pub fn verify_checksum(frame: &[u8; FRAME_SIZE]) -> bool {
    let mut cleared = *frame;
    cleared[CHECKSUM_OFFSET] = 0;
    cleared[CHECKSUM_OFFSET + 1] = 0;
    checksum(&cleared) == [frame[CHECKSUM_OFFSET], frame[CHECKSUM_OFFSET + 1]]
}
