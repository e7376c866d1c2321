//! Camera capture module: device access, the capture session state machine
//! and its delegate protocol.
//!
//! - Device enumeration via [`list_devices`] on a [`DeviceProvider`]
//! - Live capture via [`CaptureSession`] and [`CaptureDelegate`]
//! - Configuration via [`CameraSettings`] and [`Resolution`]

mod capture_loop;
mod delegate;
mod device;
mod errors;
mod frame_utils;
#[cfg(feature = "native")]
mod native;
mod session;
mod simulated;
mod state;
mod types;

pub use capture_loop::MAX_FRAMES_IN_FLIGHT;
pub use delegate::CaptureDelegate;
pub use device::{find_device, list_devices, CameraDevice, DeviceProvider};
pub use errors::{CameraError, ErrorKind, SessionError};
pub use frame_utils::{frame_to_image, mirror_horizontal};
#[cfg(feature = "native")]
pub use native::NativeProvider;
pub use session::CaptureSession;
pub use simulated::{SimulatedProvider, SIMULATED_STILL_RESOLUTION};
pub use state::{SessionControls, SessionState};
pub use types::{
    CameraInfo, CameraSettings, DevicePosition, Frame, FrameFormat, Resolution, StillImage,
    StillRequestId, TriggerPolicy, DEFAULT_TRIGGER_APPEAR_DELAY,
};
