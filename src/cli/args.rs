//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::enums::{Backend, Position};

/// Camera capture and manual rotation front end for document scanning
#[derive(Parser, Debug)]
#[command(name = "doccam")]
#[command(version, about = "Capture document photos and fix their orientation", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Camera backend
    #[arg(long, global = true, default_value = "simulated")]
    pub backend: Backend,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List available cameras
    ListCameras,
    /// Stream preview frames and report on them
    Preview {
        /// Stop after this many frames (Ctrl+C also stops)
        #[arg(long, default_value = "90")]
        frames: u64,

        /// Camera to start on (default from config)
        #[arg(long, short)]
        position: Option<Position>,

        /// Save the last preview frame as PNG
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Take one still, rotate it and save it as PNG
    Capture {
        /// Camera to start on (default from config)
        #[arg(long, short)]
        position: Option<Position>,

        /// Clockwise quarter turns to apply in the editor
        #[arg(long, short, default_value = "0", allow_negative_numbers = true)]
        rotate: i64,

        /// Output PNG path
        #[arg(long, short, default_value = "capture.png")]
        output: PathBuf,

        /// Turn the flash on before capturing
        #[arg(long)]
        flash: bool,

        /// Make the first N simulated captures fail (exercises retry)
        #[arg(long, default_value = "0")]
        fail_stills: usize,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}
