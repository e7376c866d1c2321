//! CLI enum types for backend and camera position options.

use clap::ValueEnum;

use doccam::camera::DevicePosition;

/// Where camera devices come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Backend {
    /// Synthetic test-pattern cameras (front + back with flash)
    #[default]
    Simulated,
    /// Real webcams (requires the `native` feature)
    Native,
}

/// Camera position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Position {
    Front,
    Back,
}

impl From<Position> for DevicePosition {
    fn from(p: Position) -> Self {
        match p {
            Position::Front => DevicePosition::Front,
            Position::Back => DevicePosition::Back,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_to_device_position() {
        assert_eq!(DevicePosition::from(Position::Front), DevicePosition::Front);
        assert_eq!(DevicePosition::from(Position::Back), DevicePosition::Back);
    }

    #[test]
    fn test_backend_default() {
        assert_eq!(Backend::default(), Backend::Simulated);
    }
}
