mod cli;

use clap::Parser;

use cli::{Args, CaptureRequest, Command, CommandError};
use doccam::camera::CameraSettings;
use doccam::config::Config;

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

/// Session settings from the config file, with an optional position override.
fn settings_for(
    config: &Config,
    position: Option<cli::Position>,
) -> Result<CameraSettings, CommandError> {
    let mut settings = config.camera.settings()?;
    if let Some(position) = position {
        settings.initial_position = position.into();
    }
    Ok(settings)
}

fn run(args: Args) -> Result<(), CommandError> {
    let config_path = args.config.as_deref();
    match args.command {
        Command::ListCameras => {
            let provider = cli::make_provider(args.backend, 0)?;
            cli::list_cameras(provider.as_ref())
        }
        Command::Preview {
            frames,
            position,
            snapshot,
        } => {
            let config = cli::load_config(config_path)?;
            let settings = settings_for(&config, position)?;
            let provider = cli::make_provider(args.backend, 0)?;
            cli::run_preview(provider, settings, frames, snapshot.as_deref())
        }
        Command::Capture {
            position,
            rotate,
            output,
            flash,
            fail_stills,
        } => {
            let config = cli::load_config(config_path)?;
            let settings = settings_for(&config, position)?;
            let provider = cli::make_provider(args.backend, fail_stills)?;
            cli::run_capture(
                provider,
                settings,
                CaptureRequest {
                    rotate,
                    output,
                    flash,
                    help_message: config.editor.help_message,
                },
            )
        }
        Command::Config { action } => cli::handle_config_action(action, config_path),
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
