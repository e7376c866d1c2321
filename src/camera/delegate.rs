//! Callback protocol for capture sessions.

use super::errors::CameraError;
use super::session::CaptureSession;
use super::types::{Frame, StillImage};

/// Receives notifications from a [`CaptureSession`].
///
/// Every method is optional: the default bodies do nothing, so a consumer
/// implements only the events it cares about and the rest are dropped.
/// Callbacks always run on the thread that calls
/// [`CaptureSession::dispatch`] or [`CaptureSession::pump`], one at a time.
/// The session is passed back so a callback may query it or issue further
/// requests (including terminating it).
pub trait CaptureDelegate {
    /// A preview frame from the live feed.
    fn on_frame(&self, _session: &CaptureSession, _frame: &Frame) {}

    /// A capability gap, failed still capture or device problem.
    fn on_error(&self, _session: &CaptureSession, _error: &CameraError) {}

    /// The user dismissed the capture screen.
    fn on_cancel(&self, _session: &CaptureSession) {}

    /// A still capture finished.
    fn on_still_image(&self, _session: &CaptureSession, _image: StillImage) {}

    /// The user asked for help.
    fn on_help_requested(&self, _session: &CaptureSession) {}
}
