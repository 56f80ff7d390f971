//! In-memory keyboard simulator.
//!
//! `MockPort` decodes every frame it receives, checks its CRC and answers the
//! way the controller does: bump and region reads queue a 64-byte response,
//! writes land in a simulated flash array, everything else is send-only.
//! Fault injection covers the transport failure modes the flasher must
//! surface (short writes, short reads, timeouts).

use std::collections::VecDeque;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::port::{ControlRequest, UsbPort};
use crate::protocol::{
    AREA_START_OFFSET, Command, FLASH_SIZE, FRAME_SIZE, PAYLOAD_OFFSET, decode_address,
    verify_checksum,
};
use log::trace;

/// Identification block returned for bump and GET_REPORT.
pub const MOCK_IDENTITY: &[u8] = b"kbdflash mock keyboard";

/// Simulated keyboard controller.
#[derive(Debug)]
pub struct MockPort {
    flash: Vec<u8>,
    identity: [u8; FRAME_SIZE],
    responses: VecDeque<Vec<u8>>,
    sent: Vec<[u8; FRAME_SIZE]>,
    controls: Vec<ControlRequest>,
    flash_mode: bool,
    rejected: usize,
    reads: usize,
    accept_limit: Option<usize>,
    fail_reads_after: Option<usize>,
    short_read: Option<usize>,
    closed: bool,
}

impl Default for MockPort {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPort {
    /// A simulator with erased (0xFF) flash.
    pub fn new() -> Self {
        Self::with_flash(vec![0xFF; FLASH_SIZE as usize])
    }

    /// A simulator backed by the given flash contents.
    ///
    /// Reads past the end of `flash` return 0xFF.
    pub fn with_flash(flash: Vec<u8>) -> Self {
        let mut identity = [0u8; FRAME_SIZE];
        identity[..MOCK_IDENTITY.len()].copy_from_slice(MOCK_IDENTITY);
        Self {
            flash,
            identity,
            responses: VecDeque::new(),
            sent: Vec::new(),
            controls: Vec::new(),
            flash_mode: false,
            rejected: 0,
            reads: 0,
            accept_limit: None,
            fail_reads_after: None,
            short_read: None,
            closed: false,
        }
    }

    /// Accept at most `limit` bytes per bulk write.
    #[must_use]
    pub fn with_accept_limit(mut self, limit: usize) -> Self {
        self.accept_limit = Some(limit);
        self
    }

    /// Time out every bulk read after the first `reads` succeed.
    #[must_use]
    pub fn fail_reads_after(mut self, reads: usize) -> Self {
        self.fail_reads_after = Some(reads);
        self
    }

    /// Return at most `len` bytes per bulk read.
    #[must_use]
    pub fn with_short_reads(mut self, len: usize) -> Self {
        self.short_read = Some(len);
        self
    }

    /// Simulated flash contents.
    pub fn flash(&self) -> &[u8] {
        &self.flash
    }

    /// Frames that passed the length and checksum checks, in arrival order.
    pub fn sent_frames(&self) -> &[[u8; FRAME_SIZE]] {
        &self.sent
    }

    /// Control transfers seen, in arrival order.
    pub fn control_requests(&self) -> &[ControlRequest] {
        &self.controls
    }

    /// Number of frames dropped for bad length, checksum or command.
    pub fn rejected_frames(&self) -> usize {
        self.rejected
    }

    /// Whether the simulated controller is in flash mode.
    pub fn is_flash_mode(&self) -> bool {
        self.flash_mode
    }

    /// Responses queued but not yet read.
    pub fn pending_responses(&self) -> usize {
        self.responses.len()
    }

    /// Whether [`UsbPort::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn region_start(frame: &[u8; FRAME_SIZE]) -> usize {
        decode_address(&frame[AREA_START_OFFSET..]).map_or(usize::MAX, |a| a as usize)
    }

    fn read_block(&self, start: usize) -> Vec<u8> {
        (0..FRAME_SIZE)
            .map(|i| {
                start
                    .checked_add(i)
                    .and_then(|addr| self.flash.get(addr))
                    .copied()
                    .unwrap_or(0xFF)
            })
            .collect()
    }

    fn handle_frame(&mut self, frame: [u8; FRAME_SIZE]) {
        let Some(cmd) = Command::from_codes(frame[0], frame[1]) else {
            trace!("mock: unknown command {:02x}/{:02x}", frame[0], frame[1]);
            self.rejected += 1;
            return;
        };
        self.sent.push(frame);

        match cmd {
            Command::Bump => self.responses.push_back(self.identity.to_vec()),
            Command::EnterFlashMode => self.flash_mode = true,
            Command::LeaveFlashMode => self.flash_mode = false,
            Command::ReadFlash => {
                let block = self.read_block(Self::region_start(&frame));
                self.responses.push_back(block);
            },
            Command::WriteFlash => {
                let start = Self::region_start(&frame);
                for (i, &byte) in frame[PAYLOAD_OFFSET..].iter().enumerate() {
                    if let Some(slot) = start
                        .checked_add(i)
                        .and_then(|addr| self.flash.get_mut(addr))
                    {
                        *slot = byte;
                    }
                }
            },
            Command::CheckFlash => {},
        }
    }
}

impl UsbPort for MockPort {
    fn write_bulk(&mut self, data: &[u8]) -> Result<usize> {
        if self.closed {
            return Err(Error::PortClosed);
        }

        let accepted = self
            .accept_limit
            .map_or(data.len(), |limit| limit.min(data.len()));
        if accepted < data.len() {
            trace!("mock: accepting {accepted} of {} bytes", data.len());
            return Ok(accepted);
        }

        match <[u8; FRAME_SIZE]>::try_from(data) {
            Ok(frame) if verify_checksum(&frame) => self.handle_frame(frame),
            _ => {
                trace!("mock: rejecting {} byte frame", data.len());
                self.rejected += 1;
            },
        }
        Ok(data.len())
    }

    fn read_bulk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        if self.closed {
            return Err(Error::PortClosed);
        }

        self.reads += 1;
        if self
            .fail_reads_after
            .is_some_and(|limit| self.reads > limit)
        {
            return Err(Error::Timeout("mock: injected read timeout".into()));
        }

        let response = self
            .responses
            .pop_front()
            .ok_or_else(|| Error::Timeout("mock: no response pending".into()))?;
        let len = self
            .short_read
            .map_or(response.len(), |limit| limit.min(response.len()))
            .min(buf.len());
        buf[..len].copy_from_slice(&response[..len]);
        Ok(len)
    }

    fn write_control(&mut self, request: ControlRequest) -> Result<()> {
        if self.closed {
            return Err(Error::PortClosed);
        }
        self.controls.push(request);
        Ok(())
    }

    fn read_control(
        &mut self,
        request: ControlRequest,
        buf: &mut [u8],
        _timeout: Duration,
    ) -> Result<usize> {
        if self.closed {
            return Err(Error::PortClosed);
        }
        self.controls.push(request);
        let len = buf.len().min(FRAME_SIZE);
        buf[..len].copy_from_slice(&self.identity[..len]);
        Ok(len)
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Frame, Region};

    fn read_frame(addr: u32) -> [u8; FRAME_SIZE] {
        Frame::request(Command::ReadFlash, Some(Region::block(addr).unwrap()), &[])
            .unwrap()
            .finalize()
    }

    #[test]
    fn test_mock_serves_reads_from_flash() {
        let flash: Vec<u8> = (0..FLASH_SIZE).map(|i| (i % 251) as u8).collect();
        let mut port = MockPort::with_flash(flash.clone());

        assert_eq!(port.write_bulk(&read_frame(0x40)).unwrap(), 64);
        let mut buf = [0u8; 64];
        assert_eq!(port.read_bulk(&mut buf, Duration::ZERO).unwrap(), 64);
        assert_eq!(&buf[..], &flash[0x40..0x80]);
    }

    #[test]
    fn test_mock_rejects_bad_checksum() {
        let mut port = MockPort::new();
        let mut frame = read_frame(0);
        frame[2] ^= 0xFF;
        assert_eq!(port.write_bulk(&frame).unwrap(), 64);
        assert_eq!(port.rejected_frames(), 1);
        assert_eq!(port.pending_responses(), 0);
    }

    #[test]
    fn test_mock_accept_limit() {
        let mut port = MockPort::new().with_accept_limit(63);
        assert_eq!(port.write_bulk(&read_frame(0)).unwrap(), 63);
        assert!(port.sent_frames().is_empty());
    }

    #[test]
    fn test_mock_read_without_request_times_out() {
        let mut port = MockPort::new();
        let mut buf = [0u8; 64];
        assert!(matches!(
            port.read_bulk(&mut buf, Duration::ZERO),
            Err(Error::Timeout(_))
        ));
    }

    #[test]
    fn test_mock_closed() {
        let mut port = MockPort::new();
        port.close().unwrap();
        assert!(port.is_closed());
        assert!(matches!(
            port.write_bulk(&read_frame(0)),
            Err(Error::PortClosed)
        ));
    }
}
