//! Error types for kbdflash.

use std::io;
use thiserror::Error;

/// Result type for kbdflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for kbdflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (output image, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Raw USB error reported by libusb.
    #[cfg(feature = "native")]
    #[error("USB error: {0}")]
    Usb(#[from] rusb::Error),

    /// No device with the requested VID/PID is attached.
    #[error("Device {vid:04x}:{pid:04x} not found")]
    DeviceNotFound {
        /// USB vendor ID that was searched for.
        vid: u16,
        /// USB product ID that was searched for.
        pid: u16,
    },

    /// Device setup failed (kernel driver detach, configuration, claim).
    #[error("Setup failed: {0}")]
    Setup(String),

    /// Payload does not fit into the frame payload window.
    #[error("Payload too long: {len} bytes (max {max})")]
    PayloadTooLong {
        /// Length of the rejected payload.
        len: usize,
        /// Size of the payload window.
        max: usize,
    },

    /// Region end address does not fit in 32 bits.
    #[error("Region starting at {start:#010x} overflows the address space")]
    AddressOverflow {
        /// Region start address.
        start: u32,
    },

    /// The output channel accepted fewer bytes than were sent.
    #[error("Short write: sent {expected} bytes, device accepted {actual}")]
    ShortWrite {
        /// Number of bytes handed to the channel.
        expected: usize,
        /// Number of bytes the channel accepted.
        actual: usize,
    },

    /// The input channel returned fewer bytes than requested.
    #[error("Short read: requested {expected} bytes, received {actual}")]
    ShortRead {
        /// Number of bytes requested.
        expected: usize,
        /// Number of bytes received.
        actual: usize,
    },

    /// Communication timeout.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// I/O was attempted on a port that has been closed.
    #[error("Port is closed")]
    PortClosed,

    /// Firmware image has the wrong size or cannot be used.
    #[error("Invalid firmware image: {0}")]
    InvalidImage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Device could not be found or prepared; nothing was sent.
    Setup,
    /// A frame could not be built; nothing was sent.
    Framing,
    /// A transfer failed or came back short.
    Transport,
    /// Local file I/O failed.
    Io,
    /// Invalid configuration or input.
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DeviceNotFound { .. } | Self::Setup(_) => ErrorKind::Setup,
            Self::PayloadTooLong { .. } | Self::AddressOverflow { .. } => ErrorKind::Framing,
            Self::ShortWrite { .. }
            | Self::ShortRead { .. }
            | Self::Timeout(_)
            | Self::PortClosed => ErrorKind::Transport,
            #[cfg(feature = "native")]
            Self::Usb(_) => ErrorKind::Transport,
            Self::Io(_) | Self::InvalidImage(_) => ErrorKind::Io,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this error came from the transport layer.
    pub fn is_transport(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }
}
