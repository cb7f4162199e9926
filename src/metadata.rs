//! Controller metadata snapshot.
//!
//! [`ControllerMeta`] is a lightweight, cloneable description of a controller suitable
//! for UI display, logging, and diagnostics. Backends populate what they know;
//! unknown fields remain `None`.
//!
//! # Conventions
//! - `bus` is a short, human-readable bus hint like `"usb"`, `"bluetooth"`, or `"virtual"`.
//! - `product_string` should be a friendly, user-facing name when available.
//! - `path` is an OS/topology path (opaque string) useful for diagnostics.
//!
//! The registry never interprets these fields. It only carries them into
//! [`Snapshot`](crate::snapshot::Snapshot)s.

use serde::{Deserialize, Serialize};

/// Descriptive metadata for a single controller.
///
/// All fields are optional; populate what is known on the current platform.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerMeta {
    /// High-level bus classification (e.g., `"usb"`, `"bluetooth"`, `"virtual"`).
    pub bus: Option<String>,

    /// USB Vendor ID (VID), if known.
    pub vid: Option<u16>,

    /// USB Product ID (PID), if known.
    pub pid: Option<u16>,

    /// Human-readable product name from the driver/firmware.
    pub product_string: Option<String>,

    /// Device serial number supplied by firmware/OS, if present.
    pub serial_number: Option<String>,

    /// OS/topological path to the device.
    ///
    /// Format is platform-specific and should be treated as opaque.
    pub path: Option<String>,
}

impl ControllerMeta {
    /// `"vvvv:pppp"` in lowercase hex when both ids are known.
    pub fn vid_pid(&self) -> Option<String> {
        match (self.vid, self.pid) {
            (Some(vid), Some(pid)) => Some(format!("{vid:04x}:{pid:04x}")),
            _ => None,
        }
    }
}
