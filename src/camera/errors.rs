//! Error types for capture sessions.
//!
//! [`CameraError`] is what the delegate sees through `on_error`; it travels
//! through the notification queue so it is `Clone`. [`SessionError`] is the
//! synchronous rejection returned to the caller when an operation is not
//! valid in the current state.

use super::state::SessionState;
use super::types::{DevicePosition, StillRequestId};

/// Coarse classification of failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Hardware lacks the requested feature; state left unchanged
    Capability,
    /// A still capture could not be produced; the session stays usable
    CaptureFailure,
    /// Backend query/open/stream problems
    Device,
    /// Caller used the API out of order
    ContractViolation,
}

/// Errors reported by camera devices and delivered to the delegate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CameraError {
    #[error("No {0} camera available on this device")]
    NoDevice(DevicePosition),

    #[error("The {0} camera has no flash")]
    NoFlash(DevicePosition),

    #[error("Still capture {request} failed: {reason}")]
    CaptureFailed {
        request: StillRequestId,
        reason: String,
    },

    #[error("Failed to query cameras: {0}")]
    QueryFailed(String),

    #[error("Failed to open camera: {0}")]
    OpenFailed(String),

    #[error("Camera permission denied. On macOS, grant access in System Settings > Privacy & Security > Camera")]
    PermissionDenied,

    #[error("Camera stream failed: {0}")]
    StreamFailed(String),

    #[error("Capture thread is not responding")]
    Unresponsive,
}

impl CameraError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::NoDevice(_) | CameraError::NoFlash(_) => ErrorKind::Capability,
            CameraError::CaptureFailed { .. } => ErrorKind::CaptureFailure,
            CameraError::QueryFailed(_)
            | CameraError::OpenFailed(_)
            | CameraError::PermissionDenied
            | CameraError::StreamFailed(_)
            | CameraError::Unresponsive => ErrorKind::Device,
        }
    }

    pub fn is_capability(&self) -> bool {
        self.kind() == ErrorKind::Capability
    }
}

/// Rejections returned directly from [`CaptureSession`](super::CaptureSession) calls.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Capture session is not active (state: {0})")]
    NotActive(SessionState),

    #[error("Capture session is already running")]
    AlreadyRunning,

    #[error("Cancel was already requested for this session")]
    AlreadyCancelled,

    #[error("Capture session has been terminated")]
    Terminated,

    #[error(transparent)]
    Camera(#[from] CameraError),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Camera(e) => e.kind(),
            _ => ErrorKind::ContractViolation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            CameraError::NoDevice(DevicePosition::Back).kind(),
            ErrorKind::Capability
        );
        assert_eq!(
            CameraError::NoFlash(DevicePosition::Front).kind(),
            ErrorKind::Capability
        );
        assert_eq!(
            CameraError::CaptureFailed {
                request: StillRequestId(3),
                reason: "busy".to_string()
            }
            .kind(),
            ErrorKind::CaptureFailure
        );
        assert_eq!(CameraError::Unresponsive.kind(), ErrorKind::Device);
        assert_eq!(SessionError::Terminated.kind(), ErrorKind::ContractViolation);
        assert_eq!(
            SessionError::from(CameraError::PermissionDenied).kind(),
            ErrorKind::Device
        );
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            CameraError::NoDevice(DevicePosition::Back).to_string(),
            "No back camera available on this device"
        );
        assert_eq!(
            CameraError::CaptureFailed {
                request: StillRequestId(7),
                reason: "sensor fault".to_string()
            }
            .to_string(),
            "Still capture #7 failed: sensor fault"
        );
        assert!(CameraError::PermissionDenied
            .to_string()
            .contains("permission denied"));
        assert_eq!(
            SessionError::NotActive(SessionState::Uninitialized).to_string(),
            "Capture session is not active (state: uninitialized)"
        );
    }
}
