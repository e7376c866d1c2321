//! Session lifecycle states and the small mutable control block.

use std::fmt;

use super::types::DevicePosition;

/// Lifecycle of a [`CaptureSession`](super::CaptureSession).
///
/// ```text
/// Uninitialized -> Configuring -> Active <-> Suspended
///        \______________\____________\__________\____-> Terminated
/// ```
///
/// Only `Active` delivers delegate callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no device open yet
    Uninitialized,
    /// Device being opened on the capture thread
    Configuring,
    /// Streaming frames and accepting still requests
    Active,
    /// Device open but frame emission paused
    Suspended,
    /// Device released, no further callbacks
    Terminated,
}

impl SessionState {
    /// Whether the capture thread currently owns an open device.
    pub fn has_device(self) -> bool {
        matches!(self, SessionState::Active | SessionState::Suspended)
    }

    pub fn is_terminal(self) -> bool {
        self == SessionState::Terminated
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialized => "uninitialized",
            SessionState::Configuring => "configuring",
            SessionState::Active => "active",
            SessionState::Suspended => "suspended",
            SessionState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// Device position and flash, changed only through the toggle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionControls {
    pub position: DevicePosition,
    pub flash: bool,
}

impl SessionControls {
    pub fn new(position: DevicePosition) -> Self {
        Self {
            position,
            flash: false,
        }
    }
}
