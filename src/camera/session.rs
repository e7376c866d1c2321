//! Capture session handle and public API.

use std::cell::{Cell, RefCell};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::capture_loop::{
    run_capture_loop, CaptureCommand, DeviceOp, SessionEvent, StartupInfo, WorkerChannels,
};
use super::delegate::CaptureDelegate;
use super::device::DeviceProvider;
use super::errors::{CameraError, SessionError};
use super::state::{SessionControls, SessionState};
use super::types::{
    CameraSettings, DevicePosition, Resolution, StillRequestId, TriggerPolicy,
};

/// Camera capture session.
///
/// Owns the camera (through a background capture thread) and turns its
/// output into delegate notifications: a best-effort stream of preview
/// frames plus one result per still request.
///
/// The session is bound to the thread that created it. State lives in
/// `Cell`/`RefCell`, which keeps the type `!Send` and `!Sync`: every state
/// change and every callback happens on that owner thread, inside
/// [`dispatch`](Self::dispatch) or [`pump`](Self::pump). The capture thread
/// only ever queues notifications.
///
/// Still requests are queued: a second request made before the first one
/// resolves is served after it, in order. Camera and flash toggles join the
/// same queue, so they never overlap an in-flight still. A toggle on a
/// running session returns at once; [`device_position`](Self::device_position)
/// and [`flash_enabled`](Self::flash_enabled) change when the capture thread's
/// acknowledgement is dispatched, in order with the frames around it.
pub struct CaptureSession {
    provider: Arc<dyn DeviceProvider>,
    settings: CameraSettings,
    state: Cell<SessionState>,
    controls: Cell<SessionControls>,
    delegate: RefCell<Option<Weak<dyn CaptureDelegate>>>,
    worker: RefCell<Option<WorkerHandle>>,
    /// All notifications, from both threads, flow through this one queue
    event_tx: Sender<SessionEvent>,
    event_rx: Receiver<SessionEvent>,
    frames_in_flight: Arc<AtomicUsize>,
    next_request: Cell<u64>,
    pending_stills: Cell<usize>,
    cancel_requested: Cell<bool>,
    activated_at: Cell<Option<Instant>>,
    actual_resolution: Cell<Option<Resolution>>,
    actual_fps: Cell<Option<u32>>,
}

struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    commands: Sender<CaptureCommand>,
    stop: Arc<AtomicBool>,
}

impl WorkerHandle {
    fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Also send stop command via channel (in case thread is blocked)
        let _ = self.commands.send(CaptureCommand::Stop);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("state", &self.state.get())
            .field("controls", &self.controls.get())
            .field("settings", &self.settings)
            .field("pending_stills", &self.pending_stills.get())
            .finish_non_exhaustive()
    }
}

impl CaptureSession {
    /// Create an inactive session. No device is opened until [`start`](Self::start).
    pub fn new(provider: Arc<dyn DeviceProvider>, settings: CameraSettings) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        Self {
            provider,
            controls: Cell::new(SessionControls::new(settings.initial_position)),
            settings,
            state: Cell::new(SessionState::Uninitialized),
            delegate: RefCell::new(None),
            worker: RefCell::new(None),
            event_tx,
            event_rx,
            frames_in_flight: Arc::new(AtomicUsize::new(0)),
            next_request: Cell::new(0),
            pending_stills: Cell::new(0),
            cancel_requested: Cell::new(false),
            activated_at: Cell::new(None),
            actual_resolution: Cell::new(None),
            actual_fps: Cell::new(None),
        }
    }

    // -- Delegate -------------------------------------------------------------

    /// Register the callback target, replacing any previous one.
    ///
    /// Only a weak reference is kept; once the consumer drops its `Arc`,
    /// notifications are silently discarded.
    pub fn set_delegate<D: CaptureDelegate + 'static>(&self, delegate: &Arc<D>) {
        let weak: Weak<D> = Arc::downgrade(delegate);
        let weak: Weak<dyn CaptureDelegate> = weak;
        *self.delegate.borrow_mut() = Some(weak);
    }

    /// Drop the registered delegate; notifications are discarded until a new one is set.
    pub fn clear_delegate(&self) {
        *self.delegate.borrow_mut() = None;
    }

    /// Whether a delegate is registered and still alive.
    pub fn has_delegate(&self) -> bool {
        self.delegate
            .borrow()
            .as_ref()
            .is_some_and(|d| d.strong_count() > 0)
    }

    // -- Accessors ------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub fn settings(&self) -> &CameraSettings {
        &self.settings
    }

    /// Position of the live camera, as of the last dispatched notification.
    pub fn device_position(&self) -> DevicePosition {
        self.controls.get().position
    }

    /// Flash state of the live camera, as of the last dispatched notification.
    pub fn flash_enabled(&self) -> bool {
        self.controls.get().flash
    }

    pub fn trigger_policy(&self) -> TriggerPolicy {
        self.settings.trigger_policy()
    }

    /// Whether the manual capture trigger should be shown right now.
    pub fn trigger_visible(&self) -> bool {
        if !self.state.get().has_device() {
            return false;
        }
        self.activated_at
            .get()
            .is_some_and(|at| self.trigger_policy().is_visible(at.elapsed()))
    }

    /// Still requests accepted but not yet answered.
    pub fn pending_still_captures(&self) -> usize {
        self.pending_stills.get()
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested.get()
    }

    /// Get the actual resolution the camera is using.
    ///
    /// Returns `None` if the session hasn't been started yet.
    pub fn actual_resolution(&self) -> Option<Resolution> {
        self.actual_resolution.get()
    }

    /// Get the actual frame rate the camera is using.
    pub fn actual_fps(&self) -> Option<u32> {
        self.actual_fps.get()
    }

    /// Check if the capture thread is currently running.
    pub fn is_running(&self) -> bool {
        self.worker
            .borrow()
            .as_ref()
            .and_then(|w| w.thread.as_ref())
            .is_some_and(|h| !h.is_finished())
    }

    // -- Lifecycle ------------------------------------------------------------

    /// Open the camera and begin streaming.
    ///
    /// The device is opened inside the capture thread; this call blocks
    /// until the thread reports success or failure. On failure the session
    /// returns to `Uninitialized` and may be started again.
    ///
    /// # Errors
    /// * `SessionError::AlreadyRunning` - If the session was already started
    /// * `SessionError::Terminated` - If the session was torn down
    /// * `SessionError::Camera` - If the device could not be opened
    pub fn start(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Uninitialized => {}
            SessionState::Terminated => return Err(SessionError::Terminated),
            _ => return Err(SessionError::AlreadyRunning),
        }
        self.state.set(SessionState::Configuring);

        let (command_tx, command_rx) = mpsc::channel();
        let (info_tx, info_rx) = mpsc::channel::<StartupInfo>();
        let stop = Arc::new(AtomicBool::new(false));
        let channels = WorkerChannels {
            commands: command_rx,
            events: self.event_tx.clone(),
            frames_in_flight: Arc::clone(&self.frames_in_flight),
            stop: Arc::clone(&stop),
        };

        let provider = Arc::clone(&self.provider);
        let settings = self.settings.clone();
        let controls = self.controls.get();
        let spawned = std::thread::Builder::new()
            .name("doccam-capture".to_string())
            .spawn(move || run_capture_loop(provider, settings, controls, channels, info_tx));
        let thread = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state.set(SessionState::Uninitialized);
                return Err(CameraError::StreamFailed(e.to_string()).into());
            }
        };

        let worker = WorkerHandle {
            thread: Some(thread),
            commands: command_tx,
            stop,
        };

        match info_rx.recv() {
            Ok(Ok((resolution, fps))) => {
                self.actual_resolution.set(Some(resolution));
                self.actual_fps.set(Some(fps));
                self.activated_at.set(Some(Instant::now()));
                *self.worker.borrow_mut() = Some(worker);
                self.state.set(SessionState::Active);
                log::info!(
                    "Session active on {} camera ({} @ {}fps)",
                    controls.position,
                    resolution,
                    fps
                );
                Ok(())
            }
            Ok(Err(e)) => {
                worker.shutdown();
                self.state.set(SessionState::Uninitialized);
                log::warn!("Session failed to start: {}", e);
                Err(e.into())
            }
            Err(_) => {
                worker.shutdown();
                self.state.set(SessionState::Uninitialized);
                Err(CameraError::StreamFailed(
                    "Capture thread terminated unexpectedly".to_string(),
                )
                .into())
            }
        }
    }

    /// Pause frame emission, keeping the device open.
    pub fn suspend(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Active => {
                self.send(CaptureCommand::Suspend)?;
                self.state.set(SessionState::Suspended);
                log::debug!("Session suspended");
                Ok(())
            }
            SessionState::Suspended => Ok(()),
            SessionState::Terminated => Err(SessionError::Terminated),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Resume frame emission and callback delivery after [`suspend`](Self::suspend).
    pub fn resume(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Suspended => {
                self.send(CaptureCommand::Resume)?;
                self.state.set(SessionState::Active);
                log::debug!("Session resumed");
                Ok(())
            }
            SessionState::Active => Ok(()),
            SessionState::Terminated => Err(SessionError::Terminated),
            other => Err(SessionError::NotActive(other)),
        }
    }

    /// Tear the session down.
    ///
    /// Stops the capture thread, releases the device before returning and
    /// discards anything still queued. No callback fires once this has been
    /// called, even when it is called from inside a callback. Idempotent.
    pub fn terminate(&self) {
        if self.state.get() == SessionState::Terminated {
            return;
        }
        self.state.set(SessionState::Terminated);

        let worker = self.worker.borrow_mut().take();
        if let Some(worker) = worker {
            worker.shutdown();
        }

        let discarded = self.event_rx.try_iter().count();
        self.frames_in_flight.store(0, Ordering::SeqCst);
        self.pending_stills.set(0);
        log::info!("Session terminated ({} queued notifications discarded)", discarded);
    }

    // -- Device controls ------------------------------------------------------

    /// Swap between the front and back camera.
    ///
    /// If the host has no camera at the other position, `on_error` receives
    /// `CameraError::NoDevice` and the position is unchanged. While streaming,
    /// the swap is queued behind any pending still captures and this call
    /// does not wait for it.
    ///
    /// # Errors
    /// * `SessionError::Terminated` - If the session was torn down
    pub fn toggle_camera(&self) -> Result<(), SessionError> {
        self.ensure_live()?;
        if self.state.get().has_device() {
            self.queue_device_op(DeviceOp::ToggleCamera);
            return Ok(());
        }

        let controls = self.controls.get();
        let target = controls.position.flipped();
        let info = match self.provider.devices() {
            Ok(devices) => devices.into_iter().find(|d| d.position == target),
            Err(e) => {
                self.report(e);
                return Ok(());
            }
        };
        match info {
            Some(info) => self.controls.set(SessionControls {
                position: target,
                flash: controls.flash && info.has_flash,
            }),
            None => {
                log::warn!("Cannot switch to {} camera: not present", target);
                self.report(CameraError::NoDevice(target));
            }
        }
        Ok(())
    }

    /// Turn the flash on or off.
    ///
    /// If the current camera has no flash, `on_error` receives
    /// `CameraError::NoFlash` and the flash state is unchanged. While
    /// streaming, the change is queued like [`toggle_camera`](Self::toggle_camera).
    ///
    /// # Errors
    /// * `SessionError::Terminated` - If the session was torn down
    pub fn toggle_flash(&self) -> Result<(), SessionError> {
        self.ensure_live()?;
        if self.state.get().has_device() {
            self.queue_device_op(DeviceOp::ToggleFlash);
            return Ok(());
        }

        let controls = self.controls.get();
        let enabled = !controls.flash;
        if enabled {
            let capable = match self.provider.devices() {
                Ok(devices) => devices
                    .iter()
                    .any(|d| d.position == controls.position && d.has_flash),
                Err(e) => {
                    self.report(e);
                    return Ok(());
                }
            };
            if !capable {
                log::warn!("Cannot enable flash: {} camera has none", controls.position);
                self.report(CameraError::NoFlash(controls.position));
                return Ok(());
            }
        }
        self.controls.set(SessionControls {
            flash: enabled,
            ..controls
        });
        Ok(())
    }

    // -- Requests -------------------------------------------------------------

    /// Ask for one still image from the live feed.
    ///
    /// Returns immediately. Exactly one of `on_still_image` or `on_error`
    /// (with `CameraError::CaptureFailed` carrying the returned id) follows,
    /// unless the session is terminated first.
    ///
    /// # Errors
    /// * `SessionError::NotActive` - If the session is not `Active`
    /// * `SessionError::Terminated` - If the session was torn down
    pub fn request_still_capture(&self) -> Result<StillRequestId, SessionError> {
        match self.state.get() {
            SessionState::Active => {}
            SessionState::Terminated => return Err(SessionError::Terminated),
            other => return Err(SessionError::NotActive(other)),
        }

        let request = StillRequestId(self.next_request.get() + 1);
        self.send(CaptureCommand::Device(DeviceOp::Still(request)))?;
        self.next_request.set(request.0);
        self.pending_stills.set(self.pending_stills.get() + 1);
        log::debug!(
            "Still {} requested ({} pending)",
            request,
            self.pending_stills.get()
        );
        Ok(request)
    }

    /// User dismissed the capture screen: queue exactly one `on_cancel`.
    ///
    /// The session keeps running; tearing it down is the owner's job.
    ///
    /// # Errors
    /// * `SessionError::AlreadyCancelled` - On any call after the first
    pub fn cancel(&self) -> Result<(), SessionError> {
        self.ensure_presented()?;
        if self.cancel_requested.replace(true) {
            return Err(SessionError::AlreadyCancelled);
        }
        self.queue(SessionEvent::Cancelled);
        Ok(())
    }

    /// User tapped help: queue one `on_help_requested`.
    pub fn request_help(&self) -> Result<(), SessionError> {
        self.ensure_presented()?;
        self.queue(SessionEvent::HelpRequested);
        Ok(())
    }

    // -- Delivery -------------------------------------------------------------

    /// Deliver every queued notification to the delegate without blocking.
    ///
    /// Returns the number of callbacks invoked. Nothing is delivered unless
    /// the session is `Active`; notifications queued while suspended wait
    /// for [`resume`](Self::resume).
    pub fn dispatch(&self) -> usize {
        let mut delivered = 0;
        while self.state.get() == SessionState::Active {
            let Ok(event) = self.event_rx.try_recv() else {
                break;
            };
            if self.deliver(event) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Wait up to `timeout` for a notification, then deliver everything queued.
    ///
    /// Returns immediately with 0 when the session is not `Active`.
    pub fn pump(&self, timeout: Duration) -> usize {
        if self.state.get() != SessionState::Active {
            return 0;
        }
        let Ok(first) = self.event_rx.recv_timeout(timeout) else {
            return 0;
        };
        let mut delivered = usize::from(self.deliver(first));
        delivered += self.dispatch();
        delivered
    }

    /// Hand one notification to the delegate. Returns whether a callback ran.
    fn deliver(&self, event: SessionEvent) -> bool {
        match &event {
            SessionEvent::Frame(_) => {
                self.frames_in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            SessionEvent::StillImage(_)
            | SessionEvent::Error(CameraError::CaptureFailed { .. }) => {
                self.pending_stills
                    .set(self.pending_stills.get().saturating_sub(1));
            }
            SessionEvent::ControlsChanged(controls) => {
                log::debug!(
                    "Now on {} camera, flash {}",
                    controls.position,
                    if controls.flash { "on" } else { "off" }
                );
                self.controls.set(*controls);
            }
            _ => {}
        }

        if self.state.get() != SessionState::Active {
            return false;
        }
        let delegate = self.delegate.borrow().as_ref().and_then(Weak::upgrade);
        let Some(delegate) = delegate else {
            return false;
        };

        match event {
            SessionEvent::Frame(frame) => delegate.on_frame(self, &frame),
            SessionEvent::StillImage(image) => delegate.on_still_image(self, image),
            SessionEvent::Error(error) => delegate.on_error(self, &error),
            SessionEvent::Cancelled => delegate.on_cancel(self),
            SessionEvent::HelpRequested => delegate.on_help_requested(self),
            SessionEvent::ControlsChanged(_) => return false,
        }
        true
    }

    // -- Internals ------------------------------------------------------------

    fn queue(&self, event: SessionEvent) {
        // The receiver lives in `self`, so this cannot fail.
        let _ = self.event_tx.send(event);
    }

    fn report(&self, error: CameraError) {
        self.queue(SessionEvent::Error(error));
    }

    fn ensure_live(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Terminated => Err(SessionError::Terminated),
            _ => Ok(()),
        }
    }

    fn ensure_presented(&self) -> Result<(), SessionError> {
        match self.state.get() {
            SessionState::Active | SessionState::Suspended => Ok(()),
            SessionState::Terminated => Err(SessionError::Terminated),
            other => Err(SessionError::NotActive(other)),
        }
    }

    fn send(&self, command: CaptureCommand) -> Result<(), CameraError> {
        let worker = self.worker.borrow();
        let worker = worker.as_ref().ok_or(CameraError::Unresponsive)?;
        worker
            .commands
            .send(command)
            .map_err(|_| CameraError::Unresponsive)
    }

    /// Hand a device operation to the capture thread, reporting a dead thread.
    fn queue_device_op(&self, op: DeviceOp) {
        if let Err(e) = self.send(CaptureCommand::Device(op)) {
            self.report(e);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.terminate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::SimulatedProvider;

    fn settings() -> CameraSettings {
        CameraSettings {
            resolution: Resolution {
                width: 8,
                height: 6,
            },
            fps: 120,
            trigger_appear_delay: 0.0,
            ..CameraSettings::default()
        }
    }

    #[test]
    fn test_new_session_is_uninitialized() {
        let session = CaptureSession::new(Arc::new(SimulatedProvider::dual()), settings());
        assert_eq!(session.state(), SessionState::Uninitialized);
        assert_eq!(session.device_position(), DevicePosition::Back);
        assert!(!session.flash_enabled());
        assert!(!session.is_running());
        assert!(!session.trigger_visible());
        assert!(session.actual_resolution().is_none());
    }

    #[test]
    fn test_start_and_terminate() {
        let provider = Arc::new(SimulatedProvider::dual());
        let session = CaptureSession::new(provider.clone(), settings());
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Active);
        assert!(session.is_running());
        assert_eq!(provider.open_devices(), 1);
        assert!(session.trigger_visible());

        session.terminate();
        assert_eq!(session.state(), SessionState::Terminated);
        assert_eq!(provider.open_devices(), 0);
        assert!(matches!(session.start(), Err(SessionError::Terminated)));
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let session = CaptureSession::new(Arc::new(SimulatedProvider::dual()), settings());
        session.start().unwrap();
        assert!(matches!(session.start(), Err(SessionError::AlreadyRunning)));
    }

    #[test]
    fn test_start_without_camera_fails_and_can_retry() {
        let provider = Arc::new(SimulatedProvider::single(DevicePosition::Front));
        let session = CaptureSession::new(provider, settings());
        let result = session.start();
        assert!(matches!(
            result,
            Err(SessionError::Camera(CameraError::NoDevice(DevicePosition::Back)))
        ));
        assert_eq!(session.state(), SessionState::Uninitialized);

        session.toggle_camera().unwrap();
        assert_eq!(session.device_position(), DevicePosition::Front);
        session.start().unwrap();
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_still_request_requires_active() {
        let session = CaptureSession::new(Arc::new(SimulatedProvider::dual()), settings());
        assert!(matches!(
            session.request_still_capture(),
            Err(SessionError::NotActive(SessionState::Uninitialized))
        ));
        assert!(matches!(
            session.cancel(),
            Err(SessionError::NotActive(SessionState::Uninitialized))
        ));
    }

    #[test]
    fn test_toggles_before_start_only_change_configuration() {
        let provider = Arc::new(SimulatedProvider::dual());
        let session = CaptureSession::new(provider.clone(), settings());
        session.toggle_flash().unwrap();
        assert!(session.flash_enabled());
        // Front camera has no flash, so switching turns it off
        session.toggle_camera().unwrap();
        assert_eq!(session.device_position(), DevicePosition::Front);
        assert!(!session.flash_enabled());
        assert_eq!(provider.total_opened(), 0);
    }

    #[test]
    fn test_suspend_and_resume() {
        let session = CaptureSession::new(Arc::new(SimulatedProvider::dual()), settings());
        assert!(matches!(session.suspend(), Err(SessionError::NotActive(_))));
        session.start().unwrap();
        session.suspend().unwrap();
        assert_eq!(session.state(), SessionState::Suspended);
        assert!(matches!(
            session.request_still_capture(),
            Err(SessionError::NotActive(SessionState::Suspended))
        ));
        assert_eq!(session.pump(Duration::from_millis(10)), 0);
        session.resume().unwrap();
        assert_eq!(session.state(), SessionState::Active);
    }

    #[test]
    fn test_drop_releases_device() {
        let provider = Arc::new(SimulatedProvider::dual());
        {
            let session = CaptureSession::new(provider.clone(), settings());
            session.start().unwrap();
            assert_eq!(provider.open_devices(), 1);
        }
        assert_eq!(provider.open_devices(), 0);
    }
}
