//! Transport adapter between the flasher and a [`UsbPort`].
//!
//! Enforces the framing contract on the raw primitives: every write must be
//! accepted in full, every read must return exactly the requested length,
//! and every read is preceded by a fixed pacing delay so the controller has
//! time to prepare its answer. Nothing here retries.

use crate::error::{Error, Result};
use crate::port::{ControlRequest, DEFAULT_PACING, UsbPort};
use crate::protocol::FRAME_SIZE;
use log::trace;
use std::thread;
use std::time::Duration;

/// Frame transport over a USB port.
pub struct Transport<P: UsbPort> {
    port: P,
    pacing: Duration,
}

impl<P: UsbPort> Transport<P> {
    /// Wrap `port` with the default pacing delay.
    pub fn new(port: P) -> Self {
        Self {
            port,
            pacing: DEFAULT_PACING,
        }
    }

    /// Override the delay inserted before each read.
    #[must_use]
    pub fn with_pacing(mut self, pacing: Duration) -> Self {
        self.pacing = pacing;
        self
    }

    /// Current pacing delay.
    pub fn pacing(&self) -> Duration {
        self.pacing
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the transport and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Transmit a finalized frame.
    pub fn send(&mut self, frame: [u8; FRAME_SIZE]) -> Result<()> {
        trace!("-> {frame:02x?}");
        let accepted = self.port.write_bulk(&frame)?;
        if accepted != FRAME_SIZE {
            return Err(Error::ShortWrite {
                expected: FRAME_SIZE,
                actual: accepted,
            });
        }
        Ok(())
    }

    /// Wait out the pacing delay, then read exactly `len` bytes.
    pub fn recv(&mut self, len: usize, timeout: Duration) -> Result<Vec<u8>> {
        thread::sleep(self.pacing);
        let mut buf = vec![0u8; len];
        let received = self.port.read_bulk(&mut buf, timeout)?;
        if received != len {
            return Err(Error::ShortRead {
                expected: len,
                actual: received,
            });
        }
        trace!("<- {buf:02x?}");
        Ok(buf)
    }

    /// Issue a control transfer without a data stage.
    pub fn send_control(&mut self, request: ControlRequest) -> Result<()> {
        trace!("ctrl -> {request:?}");
        self.port.write_control(request)
    }

    /// Issue a device-to-host control transfer returning exactly `len` bytes.
    pub fn recv_control(
        &mut self,
        request: ControlRequest,
        len: usize,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        trace!("ctrl <- {request:?}");
        let mut buf = vec![0u8; len];
        let received = self.port.read_control(request, &mut buf, timeout)?;
        if received != len {
            return Err(Error::ShortRead {
                expected: len,
                actual: received,
            });
        }
        Ok(buf)
    }
}
