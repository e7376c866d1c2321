//! Webcam backend built on nokhwa.
//!
//! Desktop webcams do not report which way they face or whether they have a
//! torch, so the position is guessed from the device name (first unknown
//! camera is treated as front-facing, the next as back-facing) and flash is
//! never available.

use std::time::Instant;

use image::RgbImage;
use nokhwa::pixel_format::RgbFormat;
use nokhwa::query;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat as NokhwaFrameFormat, RequestedFormat,
    RequestedFormatType,
};
use nokhwa::Camera;

use super::device::{CameraDevice, DeviceProvider};
use super::errors::CameraError;
use super::frame_utils::decode_rgb;
use super::types::{
    CameraInfo, CameraSettings, DevicePosition, Frame, FrameFormat, Resolution, StillRequestId,
};

/// Provider for the host's real cameras.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeProvider;

impl NativeProvider {
    pub fn new() -> Self {
        Self
    }
}

fn guess_position(name: &str, ordinal: usize) -> DevicePosition {
    let lower = name.to_lowercase();
    if ["back", "rear", "environment", "world"]
        .iter()
        .any(|k| lower.contains(k))
    {
        DevicePosition::Back
    } else if ["front", "facetime", "user", "integrated"]
        .iter()
        .any(|k| lower.contains(k))
    {
        DevicePosition::Front
    } else if ordinal == 0 {
        DevicePosition::Front
    } else {
        DevicePosition::Back
    }
}

impl DeviceProvider for NativeProvider {
    fn devices(&self) -> Result<Vec<CameraInfo>, CameraError> {
        let devices =
            query(ApiBackend::Auto).map_err(|e| CameraError::QueryFailed(e.to_string()))?;

        Ok(devices
            .into_iter()
            .enumerate()
            .map(|(ordinal, d)| {
                let name = d.human_name();
                CameraInfo {
                    index: d.index().as_index().unwrap_or(ordinal as u32),
                    position: guess_position(&name, ordinal),
                    name,
                    description: d.description().to_string(),
                    has_flash: false,
                }
            })
            .collect())
    }

    fn open(
        &self,
        position: DevicePosition,
        settings: &CameraSettings,
    ) -> Result<Box<dyn CameraDevice>, CameraError> {
        let info = self
            .devices()?
            .into_iter()
            .find(|d| d.position == position)
            .ok_or(CameraError::NoDevice(position))?;

        let mut camera = open_camera_with_fallback(&CameraIndex::Index(info.index), settings)?;
        camera
            .open_stream()
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;

        Ok(Box::new(NativeDevice {
            info,
            camera,
            still_pending: false,
            stopped: false,
        }))
    }
}

struct NativeDevice {
    info: CameraInfo,
    camera: Camera,
    still_pending: bool,
    stopped: bool,
}

impl NativeDevice {
    fn grab(&mut self) -> Result<RgbImage, CameraError> {
        let buffer = self
            .camera
            .frame()
            .map_err(|e| CameraError::StreamFailed(e.to_string()))?;
        decode_rgb(&buffer)
            .ok_or_else(|| CameraError::StreamFailed("could not decode camera frame".to_string()))
    }
}

impl CameraDevice for NativeDevice {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn resolution(&self) -> Resolution {
        let res = self.camera.resolution();
        Resolution {
            width: res.width(),
            height: res.height(),
        }
    }

    fn frame_rate(&self) -> u32 {
        self.camera.frame_rate()
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        let image = self.grab()?;
        let (width, height) = image.dimensions();
        Ok(Frame {
            data: image.into_raw(),
            width,
            height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
            sequence: 0,
            position: self.info.position,
        })
    }

    // Webcams have no separate still pipeline; the next full frame is the still.
    fn begin_still(&mut self) -> Result<(), CameraError> {
        if self.still_pending {
            return Err(CameraError::CaptureFailed {
                request: StillRequestId(0),
                reason: "a still is already in progress".to_string(),
            });
        }
        self.still_pending = true;
        Ok(())
    }

    fn poll_still(&mut self) -> Option<Result<RgbImage, CameraError>> {
        if !std::mem::take(&mut self.still_pending) {
            return None;
        }
        Some(self.grab())
    }

    fn set_flash(&mut self, enabled: bool) -> Result<(), CameraError> {
        if enabled {
            Err(CameraError::NoFlash(self.info.position))
        } else {
            Ok(())
        }
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            let _ = self.camera.stop_stream();
        }
    }
}

impl Drop for NativeDevice {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Try to open a camera with multiple format fallback strategies.
fn open_camera_with_fallback(
    index: &CameraIndex,
    settings: &CameraSettings,
) -> Result<Camera, CameraError> {
    let resolution =
        nokhwa::utils::Resolution::new(settings.resolution.width, settings.resolution.height);
    // NV12 (native macOS format), then MJPEG (widely supported), then
    // whatever the camera offers at its highest resolution.
    let format_attempts: Vec<RequestedFormat> = vec![
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            resolution,
            NokhwaFrameFormat::NV12,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::Closest(CameraFormat::new(
            resolution,
            NokhwaFrameFormat::MJPEG,
            settings.fps,
        ))),
        RequestedFormat::new::<RgbFormat>(RequestedFormatType::AbsoluteHighestResolution),
    ];

    let mut last_error = None;
    for requested in format_attempts {
        match Camera::new(index.clone(), requested) {
            Ok(cam) => return Ok(cam),
            Err(e) => last_error = Some(e),
        }
    }

    let message = last_error
        .map(|e| e.to_string())
        .unwrap_or_else(|| "no usable format".to_string());
    let lower = message.to_lowercase();
    if lower.contains("permission")
        || lower.contains("denied")
        || lower.contains("authorization")
        || lower.contains("access")
    {
        Err(CameraError::PermissionDenied)
    } else {
        Err(CameraError::OpenFailed(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess_position() {
        assert_eq!(guess_position("FaceTime HD Camera", 0), DevicePosition::Front);
        assert_eq!(guess_position("USB Rear Camera", 0), DevicePosition::Back);
        assert_eq!(guess_position("Generic UVC", 0), DevicePosition::Front);
        assert_eq!(guess_position("Generic UVC", 1), DevicePosition::Back);
    }

    #[test]
    fn test_list_devices_does_not_error() {
        // Should not error even if no cameras are present
        let result = NativeProvider::new().devices();
        assert!(result.is_ok());
    }
}
