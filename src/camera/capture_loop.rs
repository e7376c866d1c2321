//! Background capture thread implementation.
//!
//! The thread owns the open device. Device operations (stills and toggles)
//! run strictly in the order they were sent: a toggle issued after a still
//! request waits until that still has finished. A still in progress does not
//! hold up the preview; frames keep flowing at the device's cadence while the
//! thread polls for the still's result between them.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use image::RgbImage;

use super::device::{CameraDevice, DeviceProvider};
use super::errors::CameraError;
use super::frame_utils::mirror_horizontal;
use super::state::SessionControls;
use super::types::{
    CameraSettings, DevicePosition, Frame, Resolution, StillImage, StillRequestId,
};

/// Undelivered frames allowed in the queue before new ones are dropped.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// How often a suspended thread wakes up to check the stop flag.
const SUSPENDED_POLL: Duration = Duration::from_millis(20);

/// Operations on the device, executed in the order they were sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeviceOp {
    Still(StillRequestId),
    /// Switch to the camera facing the other way
    ToggleCamera,
    ToggleFlash,
}

/// Commands sent to the capture thread.
#[derive(Debug)]
pub(crate) enum CaptureCommand {
    Device(DeviceOp),
    Suspend,
    Resume,
    Stop,
}

/// Notifications queued for the owner thread.
#[derive(Debug)]
pub(crate) enum SessionEvent {
    Frame(Frame),
    StillImage(StillImage),
    Error(CameraError),
    /// A toggle took effect on the live device; session bookkeeping only
    ControlsChanged(SessionControls),
    Cancelled,
    HelpRequested,
}

/// Thread side of the session's channels.
pub(crate) struct WorkerChannels {
    pub commands: Receiver<CaptureCommand>,
    pub events: Sender<SessionEvent>,
    pub frames_in_flight: Arc<AtomicUsize>,
    pub stop: Arc<AtomicBool>,
}

/// What the thread reports once the device is open.
pub(crate) type StartupInfo = Result<(Resolution, u32), CameraError>;

/// The still currently being exposed, with the controls it was started under.
struct StillJob {
    request: StillRequestId,
    position: DevicePosition,
    flash: bool,
}

struct Worker {
    device: Box<dyn CameraDevice>,
    settings: CameraSettings,
    flash: bool,
    suspended: bool,
    sequence: u64,
    failing_frames: bool,
    backlog: VecDeque<DeviceOp>,
    still: Option<StillJob>,
    channels: WorkerChannels,
}

/// Run the capture loop in a background thread.
pub(crate) fn run_capture_loop(
    provider: Arc<dyn DeviceProvider>,
    settings: CameraSettings,
    controls: SessionControls,
    channels: WorkerChannels,
    info_tx: Sender<StartupInfo>,
) {
    let mut device = match provider.open(controls.position, &settings) {
        Ok(device) => device,
        Err(e) => {
            let _ = info_tx.send(Err(e));
            return;
        }
    };

    if controls.flash {
        if let Err(e) = device.set_flash(true) {
            device.stop();
            let _ = info_tx.send(Err(e));
            return;
        }
    }

    let _ = info_tx.send(Ok((device.resolution(), device.frame_rate())));
    log::info!(
        "Capture started on {} ({} @ {}fps)",
        device.info().name,
        device.resolution(),
        device.frame_rate()
    );

    let mut worker = Worker {
        device,
        settings,
        flash: controls.flash,
        suspended: false,
        sequence: 0,
        failing_frames: false,
        backlog: VecDeque::new(),
        still: None,
        channels,
    };
    worker.run(provider.as_ref());
    worker.device.stop();
    log::info!("Capture stopped");
}

impl Worker {
    fn run(&mut self, provider: &dyn DeviceProvider) {
        while !self.stopped() {
            if !self.receive_commands() {
                return;
            }
            self.poll_still();
            self.run_backlog(provider);
            if !self.suspended && !self.stopped() {
                self.pump_frame();
            }
        }
    }

    fn stopped(&self) -> bool {
        self.channels.stop.load(Ordering::SeqCst)
    }

    /// Move everything the owner has sent into the backlog. Lifecycle
    /// commands take effect at once. Returns `false` when the thread should exit.
    fn receive_commands(&mut self) -> bool {
        let mut wait = self.suspended;
        loop {
            let next = if std::mem::take(&mut wait) {
                match self.channels.commands.recv_timeout(SUSPENDED_POLL) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return false,
                }
            } else {
                match self.channels.commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return false,
                }
            };
            match next {
                None => return true,
                Some(CaptureCommand::Device(op)) => self.backlog.push_back(op),
                Some(CaptureCommand::Suspend) => self.suspended = true,
                Some(CaptureCommand::Resume) => self.suspended = false,
                Some(CaptureCommand::Stop) => return false,
            }
        }
    }

    /// Execute queued device operations until one of them starts a still.
    fn run_backlog(&mut self, provider: &dyn DeviceProvider) {
        while self.still.is_none() && !self.stopped() {
            let Some(op) = self.backlog.pop_front() else {
                break;
            };
            match op {
                DeviceOp::Still(request) => {
                    self.begin_still(request);
                    // Instant stills finish here so the next op can run
                    self.poll_still();
                }
                DeviceOp::ToggleCamera => {
                    let event = self.toggle_camera(provider);
                    self.emit(event);
                }
                DeviceOp::ToggleFlash => {
                    let event = self.toggle_flash();
                    self.emit(event);
                }
            }
        }
    }

    fn controls(&self) -> SessionControls {
        SessionControls {
            position: self.device.info().position,
            flash: self.flash,
        }
    }

    fn begin_still(&mut self, request: StillRequestId) {
        match self.device.begin_still() {
            Ok(()) => {
                log::debug!("Still {} started", request);
                self.still = Some(StillJob {
                    request,
                    position: self.device.info().position,
                    flash: self.flash,
                });
            }
            Err(e) => self.emit(still_failed(request, e)),
        }
    }

    fn poll_still(&mut self) {
        let Some(job) = self.still.as_ref() else {
            return;
        };
        let Some(result) = self.device.poll_still() else {
            return;
        };
        let request = job.request;
        let event = match result {
            Ok(image) => still_captured(job, image),
            Err(e) => still_failed(request, e),
        };
        self.still = None;
        self.emit(event);
    }

    fn toggle_camera(&mut self, provider: &dyn DeviceProvider) -> SessionEvent {
        let target = self.device.info().position.flipped();
        match self.switch_device(provider, target, self.flash) {
            Ok(()) => SessionEvent::ControlsChanged(self.controls()),
            Err(e) => {
                log::warn!("Cannot switch to {} camera: {}", target, e);
                SessionEvent::Error(e)
            }
        }
    }

    fn toggle_flash(&mut self) -> SessionEvent {
        let enabled = !self.flash;
        match self.device.set_flash(enabled) {
            Ok(()) => {
                self.flash = enabled;
                log::debug!("Flash {}", if enabled { "on" } else { "off" });
                SessionEvent::ControlsChanged(self.controls())
            }
            Err(e) => {
                log::warn!("Cannot toggle flash: {}", e);
                SessionEvent::Error(e)
            }
        }
    }

    /// Open the camera at `position` and swap it in. The old device keeps
    /// running if the new one cannot be opened.
    fn switch_device(
        &mut self,
        provider: &dyn DeviceProvider,
        position: DevicePosition,
        flash: bool,
    ) -> Result<(), CameraError> {
        let mut next = provider.open(position, &self.settings)?;
        let flash = flash && next.info().has_flash;
        if flash {
            if let Err(e) = next.set_flash(true) {
                next.stop();
                return Err(e);
            }
        }

        let mut previous = std::mem::replace(&mut self.device, next);
        previous.stop();
        self.flash = flash;
        self.failing_frames = false;
        log::info!("Switched to {}", self.device.info().name);
        Ok(())
    }

    fn pump_frame(&mut self) {
        match self.device.next_frame() {
            Ok(mut frame) => {
                self.failing_frames = false;
                self.sequence += 1;
                frame.sequence = self.sequence;
                frame.position = self.device.info().position;
                if self.settings.mirror_front && frame.position == DevicePosition::Front {
                    mirror_horizontal(&mut frame);
                }

                let in_flight = &self.channels.frames_in_flight;
                if in_flight.load(Ordering::SeqCst) >= MAX_FRAMES_IN_FLIGHT {
                    log::trace!("Dropping frame {} (consumer behind)", frame.sequence);
                    return;
                }
                in_flight.fetch_add(1, Ordering::SeqCst);
                self.emit(SessionEvent::Frame(frame));
            }
            Err(e) => {
                // Report once per failure streak
                if !self.failing_frames {
                    self.failing_frames = true;
                    log::warn!("Frame capture failed: {}", e);
                    self.emit(SessionEvent::Error(e));
                }
                std::thread::sleep(SUSPENDED_POLL);
            }
        }
    }

    /// Queue an event; a gone owner stops the thread.
    fn emit(&self, event: SessionEvent) {
        if self.channels.events.send(event).is_err() {
            self.channels.stop.store(true, Ordering::SeqCst);
        }
    }
}

fn still_captured(job: &StillJob, image: RgbImage) -> SessionEvent {
    log::debug!(
        "Still {} captured ({}x{})",
        job.request,
        image.width(),
        image.height()
    );
    SessionEvent::StillImage(StillImage {
        request: job.request,
        image,
        position: job.position,
        flash: job.flash,
        captured_at: Instant::now(),
    })
}

fn still_failed(request: StillRequestId, error: CameraError) -> SessionEvent {
    let reason = match error {
        CameraError::CaptureFailed { reason, .. } => reason,
        other => other.to_string(),
    };
    log::warn!("Still {} failed: {}", request, reason);
    SessionEvent::Error(CameraError::CaptureFailed { request, reason })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedProvider;
    use std::sync::mpsc;

    struct Harness {
        commands: Sender<CaptureCommand>,
        events: Receiver<SessionEvent>,
        in_flight: Arc<AtomicUsize>,
        stop: Arc<AtomicBool>,
        handle: std::thread::JoinHandle<()>,
    }

    fn spawn(provider: Arc<SimulatedProvider>, position: DevicePosition) -> Harness {
        let (cmd_tx, cmd_rx) = mpsc::channel();
        let (event_tx, event_rx) = mpsc::channel();
        let (info_tx, info_rx) = mpsc::channel();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let stop = Arc::new(AtomicBool::new(false));
        let settings = CameraSettings {
            resolution: Resolution {
                width: 4,
                height: 4,
            },
            fps: 200,
            ..CameraSettings::default()
        };
        let channels = WorkerChannels {
            commands: cmd_rx,
            events: event_tx,
            frames_in_flight: Arc::clone(&in_flight),
            stop: Arc::clone(&stop),
        };
        let provider: Arc<dyn DeviceProvider> = provider;
        let handle = std::thread::spawn(move || {
            run_capture_loop(
                provider,
                settings,
                SessionControls::new(position),
                channels,
                info_tx,
            )
        });
        info_rx.recv().unwrap().unwrap();
        Harness {
            commands: cmd_tx,
            events: event_rx,
            in_flight,
            stop,
            handle,
        }
    }

    #[test]
    fn test_frames_stop_at_in_flight_limit() {
        let provider = Arc::new(SimulatedProvider::dual());
        let harness = spawn(Arc::clone(&provider), DevicePosition::Back);
        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(harness.in_flight.load(Ordering::SeqCst), MAX_FRAMES_IN_FLIGHT);

        harness.commands.send(CaptureCommand::Stop).unwrap();
        harness.handle.join().unwrap();
        let frames: Vec<_> = harness.events.try_iter().collect();
        assert_eq!(frames.len(), MAX_FRAMES_IN_FLIGHT);
        assert_eq!(provider.open_devices(), 0);
    }

    #[test]
    fn test_still_failure_reports_request_id() {
        let provider = Arc::new(SimulatedProvider::dual());
        provider.fail_next_stills(1);
        let harness = spawn(Arc::clone(&provider), DevicePosition::Back);
        harness
            .commands
            .send(CaptureCommand::Device(DeviceOp::Still(StillRequestId(42))))
            .unwrap();
        harness.commands.send(CaptureCommand::Stop).unwrap();
        harness.handle.join().unwrap();

        let error = harness
            .events
            .try_iter()
            .find_map(|e| match e {
                SessionEvent::Error(err) => Some(err),
                _ => None,
            })
            .unwrap();
        match error {
            CameraError::CaptureFailed { request, .. } => assert_eq!(request, StillRequestId(42)),
            other => panic!("Expected CaptureFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_switch_to_missing_device_keeps_current() {
        let provider = Arc::new(SimulatedProvider::single(DevicePosition::Back));
        let harness = spawn(Arc::clone(&provider), DevicePosition::Back);
        harness
            .commands
            .send(CaptureCommand::Device(DeviceOp::ToggleCamera))
            .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(provider.open_devices(), 1);

        harness.stop.store(true, Ordering::SeqCst);
        harness.handle.join().unwrap();
        assert_eq!(provider.open_devices(), 0);
        let errors: Vec<_> = harness
            .events
            .try_iter()
            .filter_map(|e| match e {
                SessionEvent::Error(err) => Some(err),
                SessionEvent::ControlsChanged(c) => panic!("Unexpected switch to {:?}", c),
                _ => None,
            })
            .collect();
        assert_eq!(errors, vec![CameraError::NoDevice(DevicePosition::Front)]);
    }

    #[test]
    fn test_frames_flow_while_still_in_progress() {
        let provider = Arc::new(
            SimulatedProvider::dual()
                .with_still_resolution(Resolution {
                    width: 4,
                    height: 2,
                })
                .with_still_delay(Duration::from_millis(300)),
        );
        let harness = spawn(Arc::clone(&provider), DevicePosition::Back);
        harness
            .commands
            .send(CaptureCommand::Device(DeviceOp::Still(StillRequestId(1))))
            .unwrap();
        harness
            .commands
            .send(CaptureCommand::Device(DeviceOp::ToggleCamera))
            .unwrap();

        // Consume frames as they come so none are dropped at the cap
        let mut frames_before_still = 0;
        let mut order = Vec::new();
        let deadline = Instant::now() + Duration::from_secs(3);
        while Instant::now() < deadline && order.len() < 2 {
            match harness.events.recv_timeout(Duration::from_millis(50)) {
                Ok(SessionEvent::Frame(_)) => {
                    harness.in_flight.fetch_sub(1, Ordering::SeqCst);
                    if order.is_empty() {
                        frames_before_still += 1;
                    }
                }
                Ok(SessionEvent::StillImage(still)) => {
                    assert_eq!(still.position, DevicePosition::Back);
                    order.push("still");
                }
                Ok(SessionEvent::ControlsChanged(controls)) => {
                    assert_eq!(controls.position, DevicePosition::Front);
                    order.push("switch");
                }
                Ok(other) => panic!("Unexpected event {:?}", other),
                Err(_) => {}
            }
        }
        assert_eq!(order, vec!["still", "switch"]);
        assert!(
            frames_before_still > 10,
            "only {} frames while the still was exposing",
            frames_before_still
        );

        harness.commands.send(CaptureCommand::Stop).unwrap();
        harness.handle.join().unwrap();
        assert_eq!(provider.open_devices(), 0);
    }
}
