//! Native USB port implementation using the `rusb` crate.
//!
//! Opening the port performs the device setup the protocol assumes has
//! already happened: locate the keyboard by VID/PID, take its interfaces
//! away from the kernel HID driver, select the configuration and claim the
//! interfaces. Closing undoes the claim and hands interfaces back.

use {
    crate::{
        error::{Error, Result},
        port::{ControlRequest, UsbConfig, UsbPort},
    },
    log::{debug, info, trace, warn},
    rusb::{DeviceHandle, GlobalContext},
    std::time::Duration,
};

/// Native USB port.
pub struct NativeUsbPort {
    handle: Option<DeviceHandle<GlobalContext>>,
    name: String,
    config: UsbConfig,
    claimed: Vec<u8>,
    detached: Vec<u8>,
}

impl NativeUsbPort {
    /// Open and prepare the device described by `config`.
    ///
    /// If any setup step fails, whatever was already done is undone before
    /// the error is returned.
    pub fn open(config: &UsbConfig) -> Result<Self> {
        let handle = rusb::open_device_with_vid_pid(config.vid, config.pid).ok_or(
            Error::DeviceNotFound {
                vid: config.vid,
                pid: config.pid,
            },
        )?;

        let device = handle.device();
        let name = format!(
            "{:04x}:{:04x} bus {} addr {}",
            config.vid,
            config.pid,
            device.bus_number(),
            device.address()
        );
        debug!("Opened {name}");

        let mut port = Self {
            handle: Some(handle),
            name,
            config: config.clone(),
            claimed: Vec::new(),
            detached: Vec::new(),
        };
        port.prepare()?;
        Ok(port)
    }

    /// Detach kernel drivers, select the configuration and claim interfaces.
    fn prepare(&mut self) -> Result<()> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(Error::PortClosed);
        };

        for &iface in &self.config.interfaces {
            match handle.kernel_driver_active(iface) {
                Ok(true) => {
                    handle.detach_kernel_driver(iface).map_err(|e| {
                        Error::Setup(format!(
                            "could not detach kernel driver for interface {iface}: {e}"
                        ))
                    })?;
                    self.detached.push(iface);
                    info!("Kernel driver detached for interface {iface}");
                },
                Ok(false) => debug!("No kernel driver attached for interface {iface}"),
                Err(rusb::Error::NotSupported) => {
                    trace!("Kernel driver query not supported on this platform");
                },
                Err(e) => {
                    return Err(Error::Setup(format!(
                        "could not query kernel driver for interface {iface}: {e}"
                    )));
                },
            }
        }

        let configuration = handle
            .device()
            .config_descriptor(0)
            .map_err(|e| Error::Setup(format!("could not read configuration descriptor: {e}")))?
            .number();
        handle
            .set_active_configuration(configuration)
            .map_err(|e| Error::Setup(format!("could not set configuration: {e}")))?;
        debug!("Configuration {configuration} active");

        for &iface in &self.config.interfaces {
            handle
                .claim_interface(iface)
                .map_err(|e| Error::Setup(format!("could not claim interface {iface}: {e}")))?;
            self.claimed.push(iface);
            trace!("Claimed interface {iface}");
        }

        Ok(())
    }

    fn handle(&self) -> Result<&DeviceHandle<GlobalContext>> {
        self.handle.as_ref().ok_or(Error::PortClosed)
    }
}

/// Map libusb timeouts onto the transport timeout error.
fn map_usb_error(err: rusb::Error, what: &str) -> Error {
    match err {
        rusb::Error::Timeout => Error::Timeout(format!("{what} timed out")),
        other => Error::Usb(other),
    }
}

impl UsbPort for NativeUsbPort {
    fn write_bulk(&mut self, data: &[u8]) -> Result<usize> {
        let endpoint = self.config.out_endpoint;
        let timeout = self.config.timeout;
        self.handle()?
            .write_bulk(endpoint, data, timeout)
            .map_err(|e| map_usb_error(e, "bulk write"))
    }

    fn read_bulk(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let endpoint = self.config.in_endpoint;
        self.handle()?
            .read_bulk(endpoint, buf, timeout)
            .map_err(|e| map_usb_error(e, "bulk read"))
    }

    fn write_control(&mut self, request: ControlRequest) -> Result<()> {
        let timeout = self.config.control_timeout;
        self.handle()?
            .write_control(
                request.request_type,
                request.request,
                request.value,
                request.index,
                &[],
                timeout,
            )
            .map_err(|e| map_usb_error(e, "control write"))?;
        Ok(())
    }

    fn read_control(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        timeout: Duration,
    ) -> Result<usize> {
        self.handle()?
            .read_control(
                request.request_type,
                request.request,
                request.value,
                request.index,
                buf,
                timeout,
            )
            .map_err(|e| map_usb_error(e, "control read"))
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn close(&mut self) -> Result<()> {
        let Some(mut handle) = self.handle.take() else {
            return Ok(());
        };

        for iface in self.claimed.drain(..) {
            if let Err(e) = handle.release_interface(iface) {
                warn!("Failed to release interface {iface}: {e}");
            }
        }
        for iface in self.detached.drain(..) {
            match handle.attach_kernel_driver(iface) {
                Ok(()) => debug!("Kernel driver reattached for interface {iface}"),
                Err(e) => warn!("Failed to reattach kernel driver for interface {iface}: {e}"),
            }
        }
        Ok(())
    }
}

impl Drop for NativeUsbPort {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::hid;

    #[test]
    fn test_hid_constants_match_rusb() {
        let set = rusb::request_type(
            rusb::Direction::Out,
            rusb::RequestType::Class,
            rusb::Recipient::Interface,
        );
        let get = rusb::request_type(
            rusb::Direction::In,
            rusb::RequestType::Class,
            rusb::Recipient::Interface,
        );
        assert_eq!(set, hid::HOST_TO_DEVICE | hid::CLASS | hid::INTERFACE);
        assert_eq!(get, hid::DEVICE_TO_HOST | hid::CLASS | hid::INTERFACE);
        assert_eq!(ControlRequest::set_report().request_type, set);
        assert_eq!(ControlRequest::get_report().request_type, get);
    }

    #[test]
    fn test_timeout_maps_to_transport_timeout() {
        let err = map_usb_error(rusb::Error::Timeout, "bulk read");
        assert!(matches!(err, Error::Timeout(ref msg) if msg == "bulk read timed out"));
        assert!(matches!(
            map_usb_error(rusb::Error::Pipe, "bulk read"),
            Error::Usb(rusb::Error::Pipe)
        ));
    }
}
