//! Manual rotation editor.

use std::fmt;
use std::sync::Arc;

use image::DynamicImage;

use super::rotation::Rotation;

/// Receives the single outcome of a [`ManualRotationEditor`].
pub trait EditorDelegate {
    /// The user backed out; nothing is returned.
    fn on_cancel(&self, editor: &ManualRotationEditor);

    /// The user accepted; `image` is the source rotated by the chosen angle.
    fn on_confirm(&self, editor: &ManualRotationEditor, image: DynamicImage);
}

/// Where an editor is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorState {
    Editing,
    Confirmed,
    Cancelled,
}

impl EditorState {
    pub fn is_terminal(self) -> bool {
        self != EditorState::Editing
    }
}

impl fmt::Display for EditorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EditorState::Editing => write!(f, "editing"),
            EditorState::Confirmed => write!(f, "confirmed"),
            EditorState::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    /// Called after confirm or cancel; no callback was fired.
    #[error("Editor already finished ({0})")]
    AlreadyFinished(EditorState),
}

/// Lets a user turn one image in 90° steps, then confirm or cancel.
///
/// The editor fires exactly one delegate callback over its lifetime. Every
/// call after that is rejected with [`EditorError::AlreadyFinished`].
pub struct ManualRotationEditor {
    source: DynamicImage,
    rotation: Rotation,
    help_message: Option<String>,
    state: EditorState,
    delegate: Arc<dyn EditorDelegate>,
}

impl fmt::Debug for ManualRotationEditor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualRotationEditor")
            .field("size", &(self.source.width(), self.source.height()))
            .field("rotation", &self.rotation)
            .field("help_message", &self.help_message)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ManualRotationEditor {
    /// Create an editor for `image`. With `help_message` set to `None` the
    /// help affordance is hidden.
    pub fn new(
        image: DynamicImage,
        help_message: Option<String>,
        delegate: Arc<dyn EditorDelegate>,
    ) -> Self {
        Self {
            source: image,
            rotation: Rotation::Deg0,
            help_message,
            state: EditorState::Editing,
            delegate,
        }
    }

    pub fn source_image(&self) -> &DynamicImage {
        &self.source
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn state(&self) -> EditorState {
        self.state
    }

    pub fn help_message(&self) -> Option<&str> {
        self.help_message.as_deref()
    }

    /// Whether the help button should be shown.
    pub fn shows_help(&self) -> bool {
        self.help_message.is_some()
    }

    /// Turn the pending rotation another 90° clockwise. No callback fires.
    pub fn rotate(&mut self) -> Result<Rotation, EditorError> {
        self.ensure_editing()?;
        self.rotation = self.rotation.next();
        log::trace!("Editor rotation now {}", self.rotation);
        Ok(self.rotation)
    }

    /// The source rendered at the current rotation, for display.
    pub fn preview(&self) -> DynamicImage {
        self.rotation.apply(&self.source)
    }

    /// Rotate the source by the chosen angle and hand it to `on_confirm`.
    pub fn confirm(&mut self) -> Result<(), EditorError> {
        self.ensure_editing()?;
        self.state = EditorState::Confirmed;
        let rotated = self.rotation.apply(&self.source);
        log::debug!(
            "Editor confirmed at {} ({}x{})",
            self.rotation,
            rotated.width(),
            rotated.height()
        );
        let delegate = Arc::clone(&self.delegate);
        delegate.on_confirm(self, rotated);
        Ok(())
    }

    /// Abandon the edit and notify `on_cancel`.
    pub fn cancel(&mut self) -> Result<(), EditorError> {
        self.ensure_editing()?;
        self.state = EditorState::Cancelled;
        log::debug!("Editor cancelled");
        let delegate = Arc::clone(&self.delegate);
        delegate.on_cancel(self);
        Ok(())
    }

    fn ensure_editing(&self) -> Result<(), EditorError> {
        if self.state.is_terminal() {
            Err(EditorError::AlreadyFinished(self.state))
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Outcomes {
        cancels: Mutex<usize>,
        confirms: Mutex<Vec<(u32, u32)>>,
    }

    impl EditorDelegate for Outcomes {
        fn on_cancel(&self, editor: &ManualRotationEditor) {
            assert_eq!(editor.state(), EditorState::Cancelled);
            *self.cancels.lock().unwrap() += 1;
        }

        fn on_confirm(&self, editor: &ManualRotationEditor, image: DynamicImage) {
            assert_eq!(editor.state(), EditorState::Confirmed);
            self.confirms
                .lock()
                .unwrap()
                .push((image.width(), image.height()));
        }
    }

    fn editor(outcomes: &Arc<Outcomes>, help: Option<&str>) -> ManualRotationEditor {
        ManualRotationEditor::new(
            DynamicImage::ImageRgb8(RgbImage::new(4, 2)),
            help.map(str::to_string),
            outcomes.clone(),
        )
    }

    #[test]
    fn test_starts_editing_at_zero() {
        let outcomes = Arc::new(Outcomes::default());
        let editor = editor(&outcomes, None);
        assert_eq!(editor.state(), EditorState::Editing);
        assert_eq!(editor.rotation(), Rotation::Deg0);
        assert!(!editor.shows_help());
    }

    #[test]
    fn test_help_message_controls_help_button() {
        let outcomes = Arc::new(Outcomes::default());
        let editor = editor(&outcomes, Some("Turn the page upright"));
        assert!(editor.shows_help());
        assert_eq!(editor.help_message(), Some("Turn the page upright"));
    }

    #[test]
    fn test_rotate_fires_no_callback() {
        let outcomes = Arc::new(Outcomes::default());
        let mut editor = editor(&outcomes, None);
        assert_eq!(editor.rotate().unwrap(), Rotation::Deg90);
        assert_eq!(*outcomes.cancels.lock().unwrap(), 0);
        assert!(outcomes.confirms.lock().unwrap().is_empty());
        assert_eq!(editor.preview().width(), 2);
    }

    #[test]
    fn test_confirm_then_everything_rejected() {
        let outcomes = Arc::new(Outcomes::default());
        let mut editor = editor(&outcomes, None);
        editor.rotate().unwrap();
        editor.confirm().unwrap();
        assert_eq!(*outcomes.confirms.lock().unwrap(), vec![(2, 4)]);

        assert!(matches!(
            editor.confirm(),
            Err(EditorError::AlreadyFinished(EditorState::Confirmed))
        ));
        assert!(editor.cancel().is_err());
        assert!(editor.rotate().is_err());
        assert_eq!(editor.rotation(), Rotation::Deg90);
        assert_eq!(outcomes.confirms.lock().unwrap().len(), 1);
        assert_eq!(*outcomes.cancels.lock().unwrap(), 0);
    }

    #[test]
    fn test_cancel_then_confirm_rejected() {
        let outcomes = Arc::new(Outcomes::default());
        let mut editor = editor(&outcomes, None);
        editor.cancel().unwrap();
        assert!(matches!(
            editor.confirm(),
            Err(EditorError::AlreadyFinished(EditorState::Cancelled))
        ));
        assert_eq!(*outcomes.cancels.lock().unwrap(), 1);
        assert!(outcomes.confirms.lock().unwrap().is_empty());
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            EditorError::AlreadyFinished(EditorState::Confirmed).to_string(),
            "Editor already finished (confirmed)"
        );
    }
}
