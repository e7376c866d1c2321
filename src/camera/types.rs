//! Camera types and data structures.

use std::fmt;
use std::time::{Duration, Instant};

use image::{DynamicImage, RgbImage};
use serde::Deserialize;

/// Which physical sensor a camera device faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePosition {
    /// User-facing camera (selfie side)
    Front,
    /// Scene-facing camera, the usual choice for documents
    #[default]
    Back,
}

impl DevicePosition {
    /// The opposite position, used by camera toggling.
    pub fn flipped(self) -> Self {
        match self {
            DevicePosition::Front => DevicePosition::Back,
            DevicePosition::Back => DevicePosition::Front,
        }
    }
}

impl fmt::Display for DevicePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DevicePosition::Front => write!(f, "front"),
            DevicePosition::Back => write!(f, "back"),
        }
    }
}

/// Information about an available camera device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraInfo {
    /// Device index for selection
    pub index: u32,
    /// Human-readable device name
    pub name: String,
    /// Device description
    pub description: String,
    /// Sensor position
    pub position: DevicePosition,
    /// Whether the device can fire a flash / torch
    pub has_flash: bool,
}

impl fmt::Display for CameraInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} ({}, {}{})",
            self.index,
            self.name,
            self.description,
            self.position,
            if self.has_flash { ", flash" } else { "" }
        )
    }
}

/// Camera resolution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Low resolution (320x240) - cheap preview
    pub const LOW: Resolution = Resolution {
        width: 320,
        height: 240,
    };

    /// Medium resolution (640x480) - balanced, recommended for preview
    pub const MEDIUM: Resolution = Resolution {
        width: 640,
        height: 480,
    };

    /// High resolution (1280x720)
    pub const HIGH: Resolution = Resolution {
        width: 1280,
        height: 720,
    };

    /// Parse a `WIDTHxHEIGHT` string such as `"640x480"`.
    pub fn parse(s: &str) -> Option<Resolution> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        let width = w.trim().parse().ok()?;
        let height = h.trim().parse().ok()?;
        if width == 0 || height == 0 {
            return None;
        }
        Some(Resolution { width, height })
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Self::MEDIUM
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Pixel format of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameFormat {
    /// RGB format (3 bytes per pixel)
    Rgb,
}

/// A preview frame from the live feed.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Raw pixel data in RGB format
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format
    pub format: FrameFormat,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
    /// Capture order within a session, starting at 1
    pub sequence: u64,
    /// Position of the device that produced this frame
    pub position: DevicePosition,
}

impl Frame {
    /// Get the number of bytes per pixel (3 for RGB).
    pub fn bytes_per_pixel(&self) -> usize {
        match self.format {
            FrameFormat::Rgb => 3,
        }
    }
}

/// Identifies one `request_still_capture` call within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StillRequestId(pub u64);

impl fmt::Display for StillRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Result of a successful still capture.
#[derive(Debug, Clone)]
pub struct StillImage {
    /// The request this image answers
    pub request: StillRequestId,
    /// Full-resolution RGB image
    pub image: RgbImage,
    /// Position of the device that took it
    pub position: DevicePosition,
    /// Flash state at the moment of capture
    pub flash: bool,
    /// When the device delivered the image
    pub captured_at: Instant,
}

impl StillImage {
    /// Convert into the image type the rotation editor works on.
    pub fn into_dynamic(self) -> DynamicImage {
        DynamicImage::ImageRgb8(self.image)
    }
}

/// When the manual capture trigger becomes available to the user.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TriggerPolicy {
    /// Trigger never appears
    Never,
    /// Trigger visible from the start
    Immediately,
    /// Trigger appears after the session has been active this long
    After(Duration),
}

impl TriggerPolicy {
    /// Map a delay in seconds: negative means never, zero immediately.
    pub fn from_delay(seconds: f64) -> Self {
        if seconds.is_nan() || seconds < 0.0 {
            TriggerPolicy::Never
        } else if seconds == 0.0 {
            TriggerPolicy::Immediately
        } else {
            TriggerPolicy::After(Duration::from_secs_f64(seconds.min(u32::MAX as f64)))
        }
    }

    /// Whether the trigger shows after `active_for` of session activity.
    pub fn is_visible(&self, active_for: Duration) -> bool {
        match self {
            TriggerPolicy::Never => false,
            TriggerPolicy::Immediately => true,
            TriggerPolicy::After(delay) => active_for >= *delay,
        }
    }
}

/// Default trigger delay in seconds when none is configured.
pub const DEFAULT_TRIGGER_APPEAR_DELAY: f64 = 5.0;

/// Construction-time settings for a capture session.
#[derive(Debug, Clone)]
pub struct CameraSettings {
    /// Camera position on startup
    pub initial_position: DevicePosition,
    /// Preview resolution
    pub resolution: Resolution,
    /// Target FPS (actual may vary)
    pub fps: u32,
    /// Mirror front-camera preview frames horizontally (selfie mode)
    pub mirror_front: bool,
    /// Seconds before the manual trigger appears (<0 never, 0 immediately)
    pub trigger_appear_delay: f64,
}

impl CameraSettings {
    pub fn trigger_policy(&self) -> TriggerPolicy {
        TriggerPolicy::from_delay(self.trigger_appear_delay)
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            initial_position: DevicePosition::Back,
            resolution: Resolution::default(),
            fps: 30,
            mirror_front: true,
            trigger_appear_delay: DEFAULT_TRIGGER_APPEAR_DELAY,
        }
    }
}
