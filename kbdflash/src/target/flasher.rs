//! Keyboard flasher implementation.
//!
//! Every operation is one frame out and, for bump and region reads, one
//! 64-byte frame back. The controller tolerates exactly one request in
//! flight, which the `&mut self` receivers guarantee.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kbdflash::{KeyboardFlasher, UsbConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut flasher = KeyboardFlasher::open(&UsbConfig::default())?;
//!
//!     let ident = flasher.bump()?;
//!     println!("{}", kbdflash::hex::to_hex(&ident));
//!
//!     flasher.dump_firmware("flash.img", &mut |current, total| {
//!         println!("Reading {current}/{total}");
//!     })?;
//!
//!     Ok(())
//! }
//! ```

use crate::error::{Error, Result};
use crate::image::{FirmwareImage, REGION_COUNT};
use crate::port::{ControlRequest, UsbPort};
use crate::protocol::{
    Command, FLASH_SIZE, FRAME_SIZE, Frame, REGION_SIZE, Region, VERSION_ADDRESS, hid,
};
use crate::transport::Transport;
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

#[cfg(feature = "native")]
use crate::port::{NativeUsbPort, UsbConfig};

/// Default response timeout for bulk reads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default response timeout for control reads.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_millis(5000);

/// Progress callback for multi-region operations: `(current, total)`.
pub type ProgressFn<'a> = &'a mut dyn FnMut(usize, usize);

/// Keyboard flasher.
///
/// Generic over the port type `P`, so the same sequencing drives real
/// hardware and the in-memory simulator.
pub struct KeyboardFlasher<P: UsbPort> {
    transport: Transport<P>,
    read_timeout: Duration,
    control_timeout: Duration,
}

#[cfg(feature = "native")]
impl KeyboardFlasher<NativeUsbPort> {
    /// Open the device described by `config` and wrap it in a flasher.
    pub fn open(config: &UsbConfig) -> Result<Self> {
        let port = NativeUsbPort::open(config)?;
        info!("Connected to {}", port.name());
        Ok(Self::new(port)
            .with_pacing(config.pacing)
            .with_read_timeout(config.timeout)
            .with_control_timeout(config.control_timeout))
    }
}

impl<P: UsbPort> KeyboardFlasher<P> {
    /// Create a flasher over an already prepared port.
    pub fn new(port: P) -> Self {
        Self {
            transport: Transport::new(port),
            read_timeout: DEFAULT_READ_TIMEOUT,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
        }
    }

    /// Set the delay inserted before each response read.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.transport = self.transport.with_pacing(pacing);
        self
    }

    /// Set the bulk response timeout.
    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the control transfer timeout.
    #[must_use]
    pub fn with_control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        self.transport.port()
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        self.transport.port_mut()
    }

    /// Consume the flasher and return the underlying port.
    pub fn into_port(self) -> P {
        self.transport.into_port()
    }

    /// Release the device.
    pub fn close(&mut self) -> Result<()> {
        self.transport.port_mut().close()
    }

    fn send(&mut self, cmd: Command, region: Option<Region>, payload: &[u8]) -> Result<()> {
        let frame = Frame::request(cmd, region, payload)?;
        self.transport.send(frame.finalize())
    }

    fn recv_frame(&mut self) -> Result<[u8; FRAME_SIZE]> {
        let data = self.transport.recv(FRAME_SIZE, self.read_timeout)?;
        <[u8; FRAME_SIZE]>::try_from(data.as_slice()).map_err(|_| Error::ShortRead {
            expected: FRAME_SIZE,
            actual: data.len(),
        })
    }

    /// Send one request and read the reply if `cmd` has one.
    fn exchange(
        &mut self,
        cmd: Command,
        region: Option<Region>,
        payload: &[u8],
    ) -> Result<Option<[u8; FRAME_SIZE]>> {
        self.send(cmd, region, payload)?;
        if cmd.expects_response() {
            self.recv_frame().map(Some)
        } else {
            Ok(None)
        }
    }

    /// [`exchange`](Self::exchange) for commands that must be answered.
    fn query(&mut self, cmd: Command, region: Option<Region>) -> Result<[u8; FRAME_SIZE]> {
        self.exchange(cmd, region, &[])?.ok_or(Error::ShortRead {
            expected: FRAME_SIZE,
            actual: 0,
        })
    }

    /// Handshake. Returns the controller's 64-byte identification block.
    pub fn bump(&mut self) -> Result<[u8; FRAME_SIZE]> {
        debug!("Sending bump");
        self.query(Command::Bump, None)
    }

    /// Put the controller into flash mode.
    pub fn enter_flash_mode(&mut self) -> Result<()> {
        info!("Entering flash mode");
        self.exchange(Command::EnterFlashMode, None, &[]).map(drop)
    }

    /// Return the controller to normal operation.
    pub fn leave_flash_mode(&mut self) -> Result<()> {
        info!("Leaving flash mode");
        self.exchange(Command::LeaveFlashMode, None, &[]).map(drop)
    }

    /// Read the 64-byte region starting at `addr`.
    pub fn read_region(&mut self, addr: u32) -> Result<[u8; FRAME_SIZE]> {
        let region = Region::block(addr)?;
        self.query(Command::ReadFlash, Some(region))
    }

    /// Write up to 52 bytes to the region starting at `addr`.
    ///
    /// Send-only: nothing is read back.
    pub fn write_region(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let region = Region::block(addr)?;
        debug!("Writing {} bytes to {region}", data.len());
        self.exchange(Command::WriteFlash, Some(region), data).map(drop)
    }

    /// Ask the controller to check the region at `addr` against `data`.
    ///
    /// The controller sends no verdict back, so this only transmits the
    /// request. Confirm contents with [`read_region`](Self::read_region)
    /// when real verification is needed.
    pub fn check_region(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        let region = Region::block(addr)?;
        debug!("Checking {} bytes at {region}", data.len());
        self.exchange(Command::CheckFlash, Some(region), data).map(drop)
    }

    /// Read the region holding the firmware version.
    pub fn read_version(&mut self) -> Result<[u8; FRAME_SIZE]> {
        self.read_region(VERSION_ADDRESS)
    }

    /// HID SET_REPORT with no data stage.
    pub fn set_report(&mut self) -> Result<()> {
        self.transport.send_control(ControlRequest::set_report())
    }

    /// HID GET_REPORT returning one 64-byte report.
    pub fn get_report(&mut self) -> Result<Vec<u8>> {
        self.transport.recv_control(
            ControlRequest::get_report(),
            hid::GET_REPORT_LEN,
            self.control_timeout,
        )
    }

    /// Read the whole flash in ascending 64-byte steps.
    ///
    /// Any failure aborts the dump; nothing is retried and no partial image
    /// is returned.
    pub fn read_firmware_image(&mut self, progress: ProgressFn<'_>) -> Result<FirmwareImage> {
        info!("Reading {FLASH_SIZE:#x} bytes of flash");
        let mut regions = Vec::with_capacity(REGION_COUNT);
        for (index, addr) in (0..FLASH_SIZE).step_by(REGION_SIZE as usize).enumerate() {
            regions.push(self.read_region(addr)?);
            progress(index + 1, REGION_COUNT);
        }
        FirmwareImage::from_regions(regions)
    }

    /// Read the whole flash and write it to `path`.
    ///
    /// The file is only created once every region has been read.
    pub fn dump_firmware<Q: AsRef<Path>>(
        &mut self,
        path: Q,
        progress: ProgressFn<'_>,
    ) -> Result<FirmwareImage> {
        let image = self.read_firmware_image(progress)?;
        image.write_to_file(&path)?;
        info!("Firmware written to {}", path.as_ref().display());
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::IMAGE_SIZE;
    use crate::port::MockPort;
    use crate::port::mock::MOCK_IDENTITY;
    use crate::protocol::{PAYLOAD_SIZE, decode_address};
    use tempfile::tempdir;

    fn flasher(port: MockPort) -> KeyboardFlasher<MockPort> {
        let _ = env_logger::builder().is_test(true).try_init();
        KeyboardFlasher::new(port).with_pacing(Duration::ZERO)
    }

    fn patterned_flash() -> Vec<u8> {
        (0..IMAGE_SIZE)
            .map(|i| ((i / FRAME_SIZE) as u8) ^ (i as u8))
            .collect()
    }

    #[test]
    fn test_bump_returns_identity() {
        let mut flasher = flasher(MockPort::new());
        let ident = flasher.bump().unwrap();
        assert_eq!(&ident[..MOCK_IDENTITY.len()], MOCK_IDENTITY);
        assert_eq!(&flasher.port().sent_frames()[0][..4], &[0x03, 0x00, 0xD7, 0x72]);
    }

    #[test]
    fn test_flash_mode_frames() {
        let mut flasher = flasher(MockPort::new());
        flasher.enter_flash_mode().unwrap();
        assert!(flasher.port().is_flash_mode());
        flasher.leave_flash_mode().unwrap();
        assert!(!flasher.port().is_flash_mode());

        let sent = flasher.port().sent_frames();
        assert_eq!(&sent[0][..4], &[0x04, 0x01, 0xD7, 0x5A]);
        assert_eq!(&sent[1][..4], &[0x04, 0x00, 0x2B, 0x49]);
        assert_eq!(flasher.port().pending_responses(), 0);
    }

    #[test]
    fn test_read_version_frame() {
        let flash = patterned_flash();
        let mut flasher = flasher(MockPort::with_flash(flash.clone()));
        let version = flasher.read_version().unwrap();
        assert_eq!(&version[..], &flash[0x2800..0x2840]);

        let frame = flasher.port().sent_frames()[0];
        assert_eq!(&frame[..4], &[0x01, 0x02, 0x22, 0x3D]);
        assert_eq!(&frame[4..12], &[0, 0, 0x28, 0, 0, 0, 0x28, 0x40]);
    }

    #[test]
    fn test_write_then_read_echoes_payload() {
        let mut flasher = flasher(MockPort::new());
        let payload: Vec<u8> = (0..PAYLOAD_SIZE as u8).collect();
        flasher.enter_flash_mode().unwrap();
        flasher.write_region(0x1000, &payload).unwrap();
        flasher.leave_flash_mode().unwrap();

        let block = flasher.read_region(0x1000).unwrap();
        assert_eq!(&block[..PAYLOAD_SIZE], &payload[..]);
    }

    #[test]
    fn test_write_region_frame() {
        let mut flasher = flasher(MockPort::new());
        flasher
            .write_region(0x100, &[0xDE, 0xAD, 0xBE, 0xEF])
            .unwrap();
        let frame = flasher.port().sent_frames()[0];
        assert_eq!(&frame[..4], &[0x01, 0x01, 0x62, 0xE7]);
        assert_eq!(&frame[12..16], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(frame[16..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_region_rejects_long_payload_before_sending() {
        let mut flasher = flasher(MockPort::new());
        let err = flasher.write_region(0, &[0u8; 53]).unwrap_err();
        assert!(matches!(err, Error::PayloadTooLong { len: 53, max: 52 }));
        assert!(flasher.port().sent_frames().is_empty());
    }

    #[test]
    fn test_check_region_is_send_only() {
        let mut flasher = flasher(MockPort::new());
        flasher.check_region(0x40, &[1, 2, 3]).unwrap();
        let frame = flasher.port().sent_frames()[0];
        assert_eq!((frame[0], frame[1]), (1, 0));
        assert_eq!(decode_address(&frame[4..8]), Some(0x40));
        assert_eq!(flasher.port().pending_responses(), 0);
        assert_eq!(flasher.port().flash()[0x40], 0xFF);
    }

    #[test]
    fn test_short_write_aborts_before_reading() {
        let mut flasher = flasher(MockPort::new().with_accept_limit(63));
        let err = flasher.read_region(0).unwrap_err();
        assert!(matches!(
            err,
            Error::ShortWrite {
                expected: 64,
                actual: 63
            }
        ));
        assert!(flasher.port().sent_frames().is_empty());
    }

    #[test]
    fn test_region_overflow_is_framing_error() {
        let mut flasher = flasher(MockPort::new());
        let err = flasher.read_region(u32::MAX - 10).unwrap_err();
        assert!(matches!(err, Error::AddressOverflow { .. }));
        assert!(flasher.port().sent_frames().is_empty());
    }

    #[test]
    fn test_read_firmware_image_ascending() {
        let flash = patterned_flash();
        let mut flasher = flasher(MockPort::with_flash(flash.clone()));
        let mut calls = Vec::new();
        let image = flasher
            .read_firmware_image(&mut |current, total| calls.push((current, total)))
            .unwrap();

        assert_eq!(image.as_bytes(), &flash[..]);
        assert_eq!(calls.len(), REGION_COUNT);
        assert_eq!(calls.first(), Some(&(1, REGION_COUNT)));
        assert_eq!(calls.last(), Some(&(REGION_COUNT, REGION_COUNT)));

        let addrs: Vec<u32> = flasher
            .port()
            .sent_frames()
            .iter()
            .map(|f| decode_address(&f[4..8]).unwrap())
            .collect();
        let expected: Vec<u32> = (0..FLASH_SIZE).step_by(64).collect();
        assert_eq!(addrs, expected);
    }

    #[test]
    fn test_dump_failure_writes_nothing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");
        let mut flasher = flasher(MockPort::new().fail_reads_after(100));

        let err = flasher.dump_firmware(&path, &mut |_, _| {}).unwrap_err();
        assert!(matches!(err, Error::Timeout(_)));
        assert!(!path.exists());
        assert_eq!(flasher.port().sent_frames().len(), 101);
    }

    #[test]
    fn test_dump_firmware_writes_image() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flash.img");
        let flash = patterned_flash();
        let mut flasher = flasher(MockPort::with_flash(flash.clone()));

        flasher.dump_firmware(&path, &mut |_, _| {}).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), flash);
    }

    #[test]
    fn test_report_requests() {
        let mut flasher = flasher(MockPort::new());
        flasher.set_report().unwrap();
        let report = flasher.get_report().unwrap();
        assert_eq!(report.len(), 64);
        assert_eq!(
            flasher.port().control_requests(),
            &[ControlRequest::set_report(), ControlRequest::get_report()]
        );
    }

    #[test]
    fn test_close_releases_port() {
        let mut flasher = flasher(MockPort::new());
        flasher.close().unwrap();
        assert!(flasher.port().is_closed());
        assert!(matches!(flasher.bump(), Err(Error::PortClosed)));
    }
}
