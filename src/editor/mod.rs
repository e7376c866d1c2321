//! Manual image correction: rotate a captured still in 90° steps before
//! accepting it.

mod controller;
mod rotation;

pub use controller::{EditorDelegate, EditorError, EditorState, ManualRotationEditor};
pub use rotation::Rotation;
