//! Device discovery and classification utilities.
//!
//! Enumerates the USB bus and marks devices whose VID/PID pair matches a
//! keyboard controller that speaks the flash protocol.

#[cfg(feature = "native")]
use log::{debug, trace};

/// Known keyboard controller kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DeviceKind {
    /// Holtek-based keyboard controller (04D9:0141).
    Holtek,
    /// Unknown device.
    Unknown,
}

/// Known VID/PID pairs. An empty PID list matches any product of the vendor.
pub const KNOWN_KEYBOARDS: &[(u16, &[u16], DeviceKind)] =
    &[(0x04D9, &[0x0141], DeviceKind::Holtek)];

impl DeviceKind {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, kind) in KNOWN_KEYBOARDS {
            if vid == *known_vid && (pids.is_empty() || pids.contains(&pid)) {
                return *kind;
            }
        }
        Self::Unknown
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Holtek => "Holtek keyboard",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known keyboard.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// A device found on the USB bus.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DetectedDevice {
    /// Bus number.
    pub bus: u8,
    /// Device address on the bus.
    pub address: u8,
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
    /// Classified device kind.
    pub kind: DeviceKind,
}

impl DetectedDevice {
    /// Whether this device is a keyboard the flasher can talk to.
    pub fn is_keyboard(&self) -> bool {
        self.kind.is_known()
    }
}

/// Enumerate every device on the USB bus.
///
/// Devices whose descriptor cannot be read are skipped.
#[cfg(feature = "native")]
pub fn detect_devices() -> Vec<DetectedDevice> {
    let devices = match rusb::devices() {
        Ok(devices) => devices,
        Err(e) => {
            debug!("Failed to enumerate USB devices: {e}");
            return Vec::new();
        },
    };

    let mut result = Vec::new();
    for device in devices.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(e) => {
                trace!(
                    "Skipping bus {} addr {}: {e}",
                    device.bus_number(),
                    device.address()
                );
                continue;
            },
        };

        let detected = DetectedDevice {
            bus: device.bus_number(),
            address: device.address(),
            vid: desc.vendor_id(),
            pid: desc.product_id(),
            kind: DeviceKind::from_vid_pid(desc.vendor_id(), desc.product_id()),
        };
        trace!(
            "Found USB device: bus {} addr {} (VID: {:04X}, PID: {:04X}, Kind: {:?})",
            detected.bus, detected.address, detected.vid, detected.pid, detected.kind
        );
        result.push(detected);
    }
    result
}

/// Enumerate every device on the USB bus (no USB backend compiled in).
#[cfg(not(feature = "native"))]
pub fn detect_devices() -> Vec<DetectedDevice> {
    Vec::new()
}

/// Format a list of detected devices for display.
pub fn format_device_list(devices: &[DetectedDevice]) -> Vec<String> {
    devices
        .iter()
        .map(|d| {
            let kind = if d.kind.is_known() {
                format!(" [{}]", d.kind.name())
            } else {
                String::new()
            };
            format!(
                "Bus {:03} Device {:03}: ID {:04x}:{:04x}{kind}",
                d.bus, d.address, d.vid, d.pid
            )
        })
        .collect()
}
