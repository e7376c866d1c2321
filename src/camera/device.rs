//! Camera device abstraction and enumeration.
//!
//! A [`DeviceProvider`] describes the cameras on the host and opens them.
//! Opening happens on the capture thread, so a [`CameraDevice`] does not
//! need to be `Send`; only the provider is shared across threads.

use image::RgbImage;

use super::errors::CameraError;
use super::types::{CameraInfo, CameraSettings, DevicePosition, Frame, Resolution};

/// Source of camera devices.
pub trait DeviceProvider: Send + Sync {
    /// Enumerate the cameras present on the host.
    fn devices(&self) -> Result<Vec<CameraInfo>, CameraError>;

    /// Open and start streaming the camera at `position`.
    fn open(
        &self,
        position: DevicePosition,
        settings: &CameraSettings,
    ) -> Result<Box<dyn CameraDevice>, CameraError>;
}

/// An open, streaming camera.
pub trait CameraDevice {
    /// Description of the underlying device.
    fn info(&self) -> &CameraInfo;

    /// Resolution the device actually negotiated.
    fn resolution(&self) -> Resolution;

    /// Frame rate the device actually negotiated.
    fn frame_rate(&self) -> u32;

    /// Block until the next preview frame is available.
    ///
    /// `sequence` is assigned by the caller; implementations may leave it 0.
    fn next_frame(&mut self) -> Result<Frame, CameraError>;

    /// Start one full-resolution still capture.
    ///
    /// Must not block on the exposure; the preview stream keeps flowing
    /// while the still is in progress. Only one still may be in progress.
    fn begin_still(&mut self) -> Result<(), CameraError>;

    /// Result of the still started by [`begin_still`](Self::begin_still),
    /// or `None` while it is still in progress or none was started.
    fn poll_still(&mut self) -> Option<Result<RgbImage, CameraError>>;

    /// Switch the flash/torch on or off.
    fn set_flash(&mut self, enabled: bool) -> Result<(), CameraError>;

    /// Stop streaming and release the hardware.
    fn stop(&mut self);
}

/// List all available camera devices.
///
/// If no cameras are found, returns an empty vector (not an error).
pub fn list_devices(provider: &dyn DeviceProvider) -> Result<Vec<CameraInfo>, CameraError> {
    provider.devices()
}

/// Find the first camera facing `position`.
pub fn find_device(
    provider: &dyn DeviceProvider,
    position: DevicePosition,
) -> Result<Option<CameraInfo>, CameraError> {
    Ok(provider
        .devices()?
        .into_iter()
        .find(|d| d.position == position))
}
