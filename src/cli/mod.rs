//! Command-line interface definitions and helpers.
//!
//! This module contains all CLI argument parsing, enums, and subcommand handlers.

mod args;
mod commands;
mod enums;

pub use args::{Args, Command, ConfigAction};
pub use commands::{
    handle_config_action, list_cameras, load_config, make_provider, run_capture, run_preview,
    CaptureRequest, CommandError,
};
pub use enums::{Backend, Position};
