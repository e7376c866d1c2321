//! Subcommand handlers.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use image::DynamicImage;

use doccam::camera::{
    frame_to_image, list_devices, CameraError, CameraSettings, CaptureDelegate, CaptureSession,
    DeviceProvider, Frame, SessionError, SimulatedProvider, StillImage, TriggerPolicy,
};
use doccam::config::{default_path, Config, ConfigError, DEFAULT_CONFIG};
use doccam::editor::{EditorDelegate, EditorError, ManualRotationEditor, Rotation};

use super::args::ConfigAction;
use super::enums::Backend;

/// Still attempts before `capture` gives up.
const MAX_CAPTURE_ATTEMPTS: usize = 3;

/// How long a single `pump` waits for notifications.
const PUMP_INTERVAL: Duration = Duration::from_millis(50);

/// Give up waiting for a still after this long.
const STILL_TIMEOUT: Duration = Duration::from_secs(15);

static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Editor(#[from] EditorError),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to install Ctrl+C handler: {0}")]
    Ctrlc(#[from] ctrlc::Error),
    #[error("The native backend is not compiled in; rebuild with `--features native`")]
    NativeUnavailable,
    #[error("Config file already exists: {}", .0.display())]
    ConfigExists(PathBuf),
    #[error("Capture failed: {0}")]
    Capture(String),
}

/// Build the device provider for `backend`.
pub fn make_provider(
    backend: Backend,
    failing_stills: usize,
) -> Result<Arc<dyn DeviceProvider>, CommandError> {
    match backend {
        Backend::Simulated => {
            let provider = SimulatedProvider::dual();
            provider.fail_next_stills(failing_stills);
            Ok(Arc::new(provider))
        }
        #[cfg(feature = "native")]
        Backend::Native => Ok(Arc::new(doccam::camera::NativeProvider::new())),
        #[cfg(not(feature = "native"))]
        Backend::Native => Err(CommandError::NativeUnavailable),
    }
}

/// Load the config file (explicit path must exist).
pub fn load_config(path: Option<&Path>) -> Result<Config, CommandError> {
    if let Some(p) = path {
        if !p.exists() {
            return Err(CommandError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file '{}' not found", p.display()),
            )));
        }
    }
    Ok(Config::load(path)?)
}

/// List available cameras and print them to stdout.
pub fn list_cameras(provider: &dyn DeviceProvider) -> Result<(), CommandError> {
    let devices = list_devices(provider)?;
    if devices.is_empty() {
        println!("No cameras found.");
        println!();
        println!("Make sure your camera is connected and permissions are granted.");
    } else {
        println!("Available cameras:");
        for device in devices {
            println!("  {}", device);
        }
    }
    Ok(())
}

// -- preview ------------------------------------------------------------------

#[derive(Default)]
struct PreviewStats {
    frames: u64,
    last_sequence: u64,
    gaps: u64,
    errors: Vec<String>,
    last_frame: Option<Frame>,
}

#[derive(Default)]
struct PreviewDelegate {
    stats: Mutex<PreviewStats>,
}

impl CaptureDelegate for PreviewDelegate {
    fn on_frame(&self, _session: &CaptureSession, frame: &Frame) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.frames += 1;
            if stats.last_sequence != 0 && frame.sequence > stats.last_sequence + 1 {
                stats.gaps += frame.sequence - stats.last_sequence - 1;
            }
            stats.last_sequence = frame.sequence;
            stats.last_frame = Some(frame.clone());
        }
    }

    fn on_error(&self, _session: &CaptureSession, error: &CameraError) {
        if let Ok(mut stats) = self.stats.lock() {
            stats.errors.push(error.to_string());
        }
    }
}

/// Stream preview frames until `frames` have arrived or Ctrl+C is pressed.
pub fn run_preview(
    provider: Arc<dyn DeviceProvider>,
    settings: CameraSettings,
    frames: u64,
    snapshot: Option<&Path>,
) -> Result<(), CommandError> {
    ctrlc::set_handler(|| {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })?;

    let session = CaptureSession::new(provider, settings);
    let delegate = Arc::new(PreviewDelegate::default());
    session.set_delegate(&delegate);
    session.start()?;
    println!(
        "Previewing {} camera at {} @ {}fps",
        session.device_position(),
        session
            .actual_resolution()
            .map(|r| r.to_string())
            .unwrap_or_else(|| "?".to_string()),
        session.actual_fps().unwrap_or(0)
    );

    let started = Instant::now();
    while !CTRLC_RECEIVED.load(Ordering::SeqCst) {
        session.pump(PUMP_INTERVAL);
        let done = delegate.stats.lock().map(|s| s.frames >= frames).unwrap_or(true);
        if done {
            break;
        }
    }
    session.terminate();

    let stats = delegate
        .stats
        .lock()
        .map_err(|_| CommandError::Capture("preview statistics unavailable".to_string()))?;
    let elapsed = started.elapsed().as_secs_f64();
    println!(
        "Received {} frames in {:.1}s ({:.1} fps), {} dropped",
        stats.frames,
        elapsed,
        if elapsed > 0.0 {
            stats.frames as f64 / elapsed
        } else {
            0.0
        },
        stats.gaps
    );
    for error in &stats.errors {
        println!("  error: {}", error);
    }

    if let Some(path) = snapshot {
        match stats.last_frame.as_ref().and_then(frame_to_image) {
            Some(image) => {
                image.save(path)?;
                println!("Saved last frame to {}", path.display());
            }
            None => println!("No frame to save."),
        }
    }
    Ok(())
}

// -- capture ------------------------------------------------------------------

#[derive(Default)]
struct CaptureOutcome {
    still: Option<StillImage>,
    failures: Vec<CameraError>,
}

#[derive(Default)]
struct CaptureDelegateImpl {
    outcome: Mutex<CaptureOutcome>,
}

impl CaptureDelegate for CaptureDelegateImpl {
    fn on_error(&self, _session: &CaptureSession, error: &CameraError) {
        if error.is_capability() {
            println!("Not available on this device: {}", error);
        } else {
            log::warn!("Camera error: {}", error);
        }
        if let Ok(mut outcome) = self.outcome.lock() {
            outcome.failures.push(error.clone());
        }
    }

    fn on_still_image(&self, _session: &CaptureSession, image: StillImage) {
        if let Ok(mut outcome) = self.outcome.lock() {
            outcome.still = Some(image);
        }
    }
}

struct SaveOnConfirm {
    output: PathBuf,
    result: Mutex<Option<Result<(u32, u32), String>>>,
}

impl EditorDelegate for SaveOnConfirm {
    fn on_cancel(&self, _editor: &ManualRotationEditor) {
        if let Ok(mut result) = self.result.lock() {
            *result = Some(Err("edit cancelled".to_string()));
        }
    }

    fn on_confirm(&self, _editor: &ManualRotationEditor, image: DynamicImage) {
        let saved = image
            .save(&self.output)
            .map(|_| (image.width(), image.height()))
            .map_err(|e| e.to_string());
        if let Ok(mut result) = self.result.lock() {
            *result = Some(saved);
        }
    }
}

/// Options for [`run_capture`].
pub struct CaptureRequest {
    pub rotate: i64,
    pub output: PathBuf,
    pub flash: bool,
    pub help_message: Option<String>,
}

/// Take a still, run it through the rotation editor and save the result.
pub fn run_capture(
    provider: Arc<dyn DeviceProvider>,
    settings: CameraSettings,
    request: CaptureRequest,
) -> Result<(), CommandError> {
    let session = CaptureSession::new(provider, settings);
    let delegate = Arc::new(CaptureDelegateImpl::default());
    session.set_delegate(&delegate);

    if request.flash {
        session.toggle_flash()?;
    }
    session.start()?;

    // The trigger is what a user would press; without one, capture at once.
    if session.trigger_policy() != TriggerPolicy::Never && !session.trigger_visible() {
        println!("Waiting for the capture trigger...");
        while !session.trigger_visible() {
            session.pump(PUMP_INTERVAL);
        }
    }

    let still = capture_with_retry(&session, &delegate)?;
    session.terminate();
    println!(
        "Captured {}x{} still from the {} camera{}",
        still.image.width(),
        still.image.height(),
        still.position,
        if still.flash { " with flash" } else { "" }
    );

    let outcome = Arc::new(SaveOnConfirm {
        output: request.output.clone(),
        result: Mutex::new(None),
    });
    let mut editor = ManualRotationEditor::new(
        still.into_dynamic(),
        request.help_message,
        outcome.clone(),
    );
    if let Some(help) = editor.help_message() {
        println!("Help: {}", help);
    }
    let target = Rotation::from_quarter_turns(request.rotate);
    while editor.rotation() != target {
        editor.rotate()?;
    }
    editor.confirm()?;

    let result = outcome
        .result
        .lock()
        .map_err(|_| CommandError::Capture("editor result unavailable".to_string()))?
        .take();
    match result {
        Some(Ok((width, height))) => {
            println!(
                "Saved {}x{} image rotated {} to {}",
                width,
                height,
                target,
                request.output.display()
            );
            Ok(())
        }
        Some(Err(e)) => Err(CommandError::Capture(e)),
        None => Err(CommandError::Capture("editor produced no result".to_string())),
    }
}

fn capture_with_retry(
    session: &CaptureSession,
    delegate: &CaptureDelegateImpl,
) -> Result<StillImage, CommandError> {
    for attempt in 1..=MAX_CAPTURE_ATTEMPTS {
        let request = session.request_still_capture()?;
        log::info!("Requested still {} (attempt {})", request, attempt);

        let deadline = Instant::now() + STILL_TIMEOUT;
        loop {
            session.pump(PUMP_INTERVAL);
            let mut outcome = delegate
                .outcome
                .lock()
                .map_err(|_| CommandError::Capture("capture state unavailable".to_string()))?;
            if let Some(still) = outcome.still.take() {
                return Ok(still);
            }
            let failed = outcome.failures.iter().any(|e| {
                matches!(e, CameraError::CaptureFailed { request: r, .. } if *r == request)
            });
            if failed {
                println!("Still {} failed, retrying...", request);
                break;
            }
            if Instant::now() > deadline {
                return Err(CommandError::Capture(format!(
                    "no result for still {} after {:?}",
                    request, STILL_TIMEOUT
                )));
            }
        }
    }
    Err(CommandError::Capture(format!(
        "gave up after {} attempts",
        MAX_CAPTURE_ATTEMPTS
    )))
}

// -- config -------------------------------------------------------------------

/// Handle config subcommand actions.
pub fn handle_config_action(action: ConfigAction, path: Option<&Path>) -> Result<(), CommandError> {
    let config_path = path.map(PathBuf::from).unwrap_or_else(default_path);
    match action {
        ConfigAction::Show => {
            let config = Config::load(Some(&config_path))?;
            let settings = config.camera.settings()?;
            println!("Current configuration:");
            println!("  Position: {}", settings.initial_position);
            println!("  Resolution: {}", settings.resolution);
            println!("  FPS: {}", settings.fps);
            println!(
                "  Mirror front camera: {}",
                if settings.mirror_front { "yes" } else { "no" }
            );
            println!("  Trigger: {}", describe_trigger(settings.trigger_policy()));
            println!(
                "  Help message: {}",
                config.editor.help_message.as_deref().unwrap_or("(none)")
            );
            println!();
            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(CommandError::ConfigExists(config_path));
            }
            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&config_path, DEFAULT_CONFIG)?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

fn describe_trigger(policy: TriggerPolicy) -> String {
    match policy {
        TriggerPolicy::Never => "never shown".to_string(),
        TriggerPolicy::Immediately => "shown immediately".to_string(),
        TriggerPolicy::After(delay) => format!("shown after {:.1}s", delay.as_secs_f64()),
    }
}
