//! Deterministic in-process camera backend.
//!
//! Produces synthetic test-pattern frames at the requested cadence and lets
//! callers shape the "hardware": which positions exist, which have a flash,
//! whether opening or still capture fails. Used by the test suite and by the
//! demo binary when no native backend is compiled in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};

use super::device::{CameraDevice, DeviceProvider};
use super::errors::CameraError;
use super::types::{
    CameraInfo, CameraSettings, DevicePosition, Frame, FrameFormat, Resolution, StillRequestId,
};

/// Default still resolution, deliberately non-square so rotations are visible.
pub const SIMULATED_STILL_RESOLUTION: Resolution = Resolution {
    width: 1600,
    height: 1200,
};

#[derive(Debug, Default)]
struct Counters {
    open: AtomicUsize,
    opened_total: AtomicUsize,
    stills_taken: AtomicUsize,
    still_failures_pending: AtomicUsize,
}

/// Simulated host with a configurable set of cameras.
#[derive(Debug, Clone)]
pub struct SimulatedProvider {
    cameras: Vec<CameraInfo>,
    still_resolution: Resolution,
    still_delay: Duration,
    failing_positions: Vec<DevicePosition>,
    counters: Arc<Counters>,
}

impl SimulatedProvider {
    /// A host with no cameras at all.
    pub fn empty() -> Self {
        Self {
            cameras: Vec::new(),
            still_resolution: SIMULATED_STILL_RESOLUTION,
            still_delay: Duration::ZERO,
            failing_positions: Vec::new(),
            counters: Arc::new(Counters::default()),
        }
    }

    /// A phone-like host: flashless front camera plus back camera with flash.
    pub fn dual() -> Self {
        Self::empty()
            .with_camera(DevicePosition::Front, false)
            .with_camera(DevicePosition::Back, true)
    }

    /// A host with a single camera at `position` and no flash.
    pub fn single(position: DevicePosition) -> Self {
        Self::empty().with_camera(position, false)
    }

    /// Add a camera facing `position`.
    pub fn with_camera(mut self, position: DevicePosition, has_flash: bool) -> Self {
        let index = self.cameras.len() as u32;
        self.cameras.push(CameraInfo {
            index,
            name: format!("Simulated {} camera", position),
            description: "synthetic test pattern".to_string(),
            position,
            has_flash,
        });
        self
    }

    /// Resolution of still images.
    pub fn with_still_resolution(mut self, resolution: Resolution) -> Self {
        self.still_resolution = resolution;
        self
    }

    /// Exposure time of each still. Preview frames keep flowing meanwhile.
    pub fn with_still_delay(mut self, delay: Duration) -> Self {
        self.still_delay = delay;
        self
    }

    /// Make opening the camera at `position` fail.
    pub fn with_open_failure(mut self, position: DevicePosition) -> Self {
        self.failing_positions.push(position);
        self
    }

    /// Make the next `count` still captures fail.
    pub fn fail_next_stills(&self, count: usize) {
        self.counters
            .still_failures_pending
            .fetch_add(count, Ordering::SeqCst);
    }

    /// Number of devices currently open.
    pub fn open_devices(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Number of times any device has been opened.
    pub fn total_opened(&self) -> usize {
        self.counters.opened_total.load(Ordering::SeqCst)
    }

    /// Number of still captures attempted, successful or not.
    pub fn stills_taken(&self) -> usize {
        self.counters.stills_taken.load(Ordering::SeqCst)
    }
}

impl DeviceProvider for SimulatedProvider {
    fn devices(&self) -> Result<Vec<CameraInfo>, CameraError> {
        Ok(self.cameras.clone())
    }

    fn open(
        &self,
        position: DevicePosition,
        settings: &CameraSettings,
    ) -> Result<Box<dyn CameraDevice>, CameraError> {
        let info = self
            .cameras
            .iter()
            .find(|c| c.position == position)
            .cloned()
            .ok_or(CameraError::NoDevice(position))?;

        if self.failing_positions.contains(&position) {
            return Err(CameraError::OpenFailed(format!(
                "{} is unavailable",
                info.name
            )));
        }

        let fps = if settings.fps == 0 { 30 } else { settings.fps };
        self.counters.open.fetch_add(1, Ordering::SeqCst);
        self.counters.opened_total.fetch_add(1, Ordering::SeqCst);
        log::debug!("Opened {} at {} @ {}fps", info.name, settings.resolution, fps);

        Ok(Box::new(SimulatedDevice {
            info,
            resolution: settings.resolution,
            still_resolution: self.still_resolution,
            still_delay: self.still_delay,
            interval: Duration::from_secs(1) / fps,
            next_due: Instant::now(),
            frames: 0,
            flash: false,
            pending_still: None,
            stopped: false,
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct SimulatedDevice {
    info: CameraInfo,
    resolution: Resolution,
    still_resolution: Resolution,
    still_delay: Duration,
    interval: Duration,
    next_due: Instant,
    frames: u64,
    flash: bool,
    pending_still: Option<PendingStill>,
    stopped: bool,
    counters: Arc<Counters>,
}

/// A still in progress: its outcome is fixed when it starts, delivered once
/// the exposure delay has passed.
struct PendingStill {
    attempt: u64,
    ready_at: Instant,
    fails: bool,
    flash: bool,
}

impl SimulatedDevice {
    fn position_marker(&self) -> u8 {
        match self.info.position {
            DevicePosition::Front => 0,
            DevicePosition::Back => 255,
        }
    }
}

impl CameraDevice for SimulatedDevice {
    fn info(&self) -> &CameraInfo {
        &self.info
    }

    fn resolution(&self) -> Resolution {
        self.resolution
    }

    fn frame_rate(&self) -> u32 {
        (Duration::from_secs(1).as_nanos() / self.interval.as_nanos().max(1)) as u32
    }

    fn next_frame(&mut self) -> Result<Frame, CameraError> {
        if self.stopped {
            return Err(CameraError::StreamFailed("device stopped".to_string()));
        }

        // Natural cadence
        let now = Instant::now();
        if self.next_due > now {
            thread::sleep(self.next_due - now);
        }
        self.next_due = self.next_due.max(now) + self.interval;

        self.frames += 1;
        let shift = self.frames as usize;
        let marker = self.position_marker();
        let width = self.resolution.width as usize;
        let height = self.resolution.height as usize;
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.push(((x + shift) % 256) as u8);
                data.push((y % 256) as u8);
                data.push(marker);
            }
        }

        Ok(Frame {
            data,
            width: self.resolution.width,
            height: self.resolution.height,
            format: FrameFormat::Rgb,
            timestamp: Instant::now(),
            sequence: 0,
            position: self.info.position,
        })
    }

    fn begin_still(&mut self) -> Result<(), CameraError> {
        if self.pending_still.is_some() {
            return Err(CameraError::CaptureFailed {
                request: StillRequestId(0),
                reason: "a still is already in progress".to_string(),
            });
        }
        let attempt = self.counters.stills_taken.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        let fails = self
            .counters
            .still_failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        self.pending_still = Some(PendingStill {
            attempt,
            ready_at: Instant::now() + self.still_delay,
            fails,
            flash: self.flash,
        });
        Ok(())
    }

    fn poll_still(&mut self) -> Option<Result<RgbImage, CameraError>> {
        let pending = self.pending_still.take()?;
        if Instant::now() < pending.ready_at {
            self.pending_still = Some(pending);
            return None;
        }
        if pending.fails {
            // The session replaces the request id with its own.
            return Some(Err(CameraError::CaptureFailed {
                request: StillRequestId(pending.attempt),
                reason: "simulated sensor fault".to_string(),
            }));
        }

        let boost = if pending.flash { 40 } else { 0 };
        let marker = self.position_marker();
        Some(Ok(RgbImage::from_fn(
            self.still_resolution.width,
            self.still_resolution.height,
            |x, y| {
                Rgb([
                    ((x % 256) as u8).saturating_add(boost),
                    ((y % 256) as u8).saturating_add(boost),
                    marker,
                ])
            },
        )))
    }

    fn set_flash(&mut self, enabled: bool) -> Result<(), CameraError> {
        if enabled && !self.info.has_flash {
            return Err(CameraError::NoFlash(self.info.position));
        }
        self.flash = enabled;
        Ok(())
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.counters.open.fetch_sub(1, Ordering::SeqCst);
            log::debug!("Released {}", self.info.name);
        }
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.stop();
    }
}
