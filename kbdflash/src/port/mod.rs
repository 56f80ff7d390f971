//! Port abstraction over the USB link to the keyboard.
//!
//! The protocol layer only needs four primitives from the device: a bulk
//! write, a bulk read with timeout, and HID class control transfers in each
//! direction. The `UsbPort` trait captures exactly that, so the flasher is
//! independent of how the device was found and configured.
//!
//! ```text
//! +---------------------+     +---------------------+
//! |  KeyboardFlasher    |     |  KeyboardFlasher    |
//! +----------+----------+     +----------+----------+
//!            |                           |
//!            v                           v
//! +----------+----------+     +----------+----------+
//! |     Transport       |     |     Transport       |
//! +----------+----------+     +----------+----------+
//!            |                           |
//!            v                           v
//! +----------+----------+     +----------+----------+
//! |   NativeUsbPort     |     |      MockPort       |
//! |      (rusb)         |     |   (in-memory sim)   |
//! +---------------------+     +---------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use kbdflash::port::{ControlRequest, UsbPort};
//! use std::time::Duration;
//!
//! fn example<P: UsbPort>(port: &mut P) -> kbdflash::Result<()> {
//!     port.write_control(ControlRequest::set_report())?;
//!
//!     let mut buf = [0u8; 64];
//!     let n = port.read_bulk(&mut buf, Duration::from_millis(1000))?;
//!     println!("Received: {:02x?}", &buf[..n]);
//!     Ok(())
//! }
//! ```

pub mod mock;

#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::Result;
use crate::protocol::hid;

/// Default USB vendor ID (Holtek).
pub const DEFAULT_VID: u16 = 0x04D9;

/// Default USB product ID.
pub const DEFAULT_PID: u16 = 0x0141;

/// Default bulk OUT endpoint.
pub const DEFAULT_OUT_ENDPOINT: u8 = 0x04;

/// Default bulk IN endpoint.
pub const DEFAULT_IN_ENDPOINT: u8 = 0x83;

/// Interfaces the keyboard exposes and that must be taken from the kernel.
pub const DEFAULT_INTERFACES: [u8; 3] = [0, 1, 2];

/// Delay between a request and reading its response.
pub const DEFAULT_PACING: Duration = Duration::from_millis(10);

/// USB link configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbConfig {
    /// USB vendor ID.
    pub vid: u16,
    /// USB product ID.
    pub pid: u16,
    /// Interfaces to detach from the kernel and claim.
    pub interfaces: Vec<u8>,
    /// Bulk OUT endpoint for command frames.
    pub out_endpoint: u8,
    /// Bulk IN endpoint for response frames.
    pub in_endpoint: u8,
    /// Bulk transfer timeout.
    pub timeout: Duration,
    /// Control transfer timeout.
    pub control_timeout: Duration,
    /// Delay inserted before every read.
    pub pacing: Duration,
}

impl Default for UsbConfig {
    fn default() -> Self {
        Self {
            vid: DEFAULT_VID,
            pid: DEFAULT_PID,
            interfaces: DEFAULT_INTERFACES.to_vec(),
            out_endpoint: DEFAULT_OUT_ENDPOINT,
            in_endpoint: DEFAULT_IN_ENDPOINT,
            timeout: Duration::from_millis(1000),
            control_timeout: Duration::from_millis(5000),
            pacing: DEFAULT_PACING,
        }
    }
}

impl UsbConfig {
    /// Create a configuration for the given VID/PID with default endpoints.
    pub fn new(vid: u16, pid: u16) -> Self {
        Self {
            vid,
            pid,
            ..Default::default()
        }
    }

    /// Set the bulk endpoints.
    #[must_use]
    pub fn with_endpoints(mut self, out_endpoint: u8, in_endpoint: u8) -> Self {
        self.out_endpoint = out_endpoint;
        self.in_endpoint = in_endpoint;
        self
    }

    /// Set the interfaces to claim.
    #[must_use]
    pub fn with_interfaces(mut self, interfaces: impl Into<Vec<u8>>) -> Self {
        self.interfaces = interfaces.into();
        self
    }

    /// Set the bulk transfer timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the pre-read pacing delay.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }
}

/// Setup packet of a zero-payload-stage control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlRequest {
    /// bmRequestType.
    pub request_type: u8,
    /// bRequest.
    pub request: u8,
    /// wValue.
    pub value: u16,
    /// wIndex.
    pub index: u16,
}

impl ControlRequest {
    /// HID SET_REPORT to the keyboard interface.
    pub fn set_report() -> Self {
        Self {
            request_type: hid::HOST_TO_DEVICE | hid::CLASS | hid::INTERFACE,
            request: hid::SET_REPORT,
            value: hid::SET_REPORT_VALUE,
            index: hid::SET_REPORT_INDEX,
        }
    }

    /// HID GET_REPORT from the keyboard interface.
    pub fn get_report() -> Self {
        Self {
            request_type: hid::DEVICE_TO_HOST | hid::CLASS | hid::INTERFACE,
            request: hid::GET_REPORT,
            value: hid::GET_REPORT_VALUE,
            index: hid::GET_REPORT_INDEX,
        }
    }

    /// Whether the data stage flows from device to host.
    pub fn is_device_to_host(&self) -> bool {
        self.request_type & hid::DEVICE_TO_HOST != 0
    }
}

/// Raw USB primitives required by the protocol layer.
///
/// Implementations own device discovery, configuration and endpoint
/// selection; callers only move bytes.
pub trait UsbPort: Send {
    /// Write `data` to the bulk OUT endpoint, returning the accepted count.
    fn write_bulk(&mut self, data: &[u8]) -> Result<usize>;

    /// Read up to `buf.len()` bytes from the bulk IN endpoint.
    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Issue a control transfer without a data stage.
    fn write_control(&mut self, request: ControlRequest) -> Result<()>;

    /// Issue a device-to-host control transfer into `buf`.
    fn read_control(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize>;

    /// Human-readable name of the link (e.g. `04d9:0141 bus 1 addr 5`).
    fn name(&self) -> &str;

    /// Release the device.
    ///
    /// After calling this method, further I/O fails.
    fn close(&mut self) -> Result<()>;
}

impl<P: UsbPort + ?Sized> UsbPort for Box<P> {
    fn write_bulk(&mut self, data: &[u8]) -> Result<usize> {
        (**self).write_bulk(data)
    }

    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        (**self).read_bulk(buf, timeout)
    }

    fn write_control(&mut self, request: ControlRequest) -> Result<()> {
        (**self).write_control(request)
    }

    fn read_control(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        (**self).read_control(request, buf, timeout)
    }

    fn name(&self) -> &str {
        (**self).name()
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

pub use mock::MockPort;
#[cfg(feature = "native")]
pub use native::NativeUsbPort;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usb_config_default() {
        let config = UsbConfig::default();
        assert_eq!(config.vid, 0x04D9);
        assert_eq!(config.pid, 0x0141);
        assert_eq!(config.interfaces, vec![0, 1, 2]);
        assert_eq!(config.out_endpoint, 0x04);
        assert_eq!(config.in_endpoint, 0x83);
        assert_eq!(config.pacing, Duration::from_millis(10));
    }

    #[test]
    fn test_usb_config_builder() {
        let config = UsbConfig::new(0x1234, 0x5678)
            .with_endpoints(0x02, 0x81)
            .with_interfaces([0])
            .with_timeout(Duration::from_secs(2))
            .with_pacing(Duration::ZERO);

        assert_eq!(config.vid, 0x1234);
        assert_eq!(config.pid, 0x5678);
        assert_eq!(config.out_endpoint, 0x02);
        assert_eq!(config.in_endpoint, 0x81);
        assert_eq!(config.interfaces, vec![0]);
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert_eq!(config.pacing, Duration::ZERO);
    }

    #[test]
    fn test_report_requests() {
        let set = ControlRequest::set_report();
        assert_eq!(
            (set.request_type, set.request, set.value, set.index),
            (0x21, 0x09, 0x0200, 0)
        );
        assert!(!set.is_device_to_host());

        let get = ControlRequest::get_report();
        assert_eq!(
            (get.request_type, get.request, get.value, get.index),
            (0xA1, 0x01, 0x0100, 1)
        );
        assert!(get.is_device_to_host());
    }
}
