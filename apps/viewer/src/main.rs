mod signal;
#[cfg(feature = "gui")]
mod window;

use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use tg_capture::FfmpegOpener;
use tg_config::{default_config_path, load_config, setup, AppConfig, DisplayBackend};
use tg_core::constants::APP_NAME;
use tg_core::error::TgError;
use tg_core::traits::StreamOpener;
use tg_display::{DisplayLoop, SnapshotRenderer};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = APP_NAME, bin_name = "tapogrid", version, about, disable_version_flag = true)]
struct Cli {
    /// Run the first-time setup again and overwrite the saved configuration
    #[arg(short = 'c', long = "config")]
    config: bool,

    /// Print version information and exit
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    tg_common::logging::init_logger();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if matches!(e.downcast_ref::<TgError>(), Some(TgError::SetupInterrupted)) {
                eprintln!("\nKeyboardInterrupt, exiting...");
            } else {
                error!("❌ {:#}", e);
                eprintln!("Error: {:#}", e);
            }
            ExitCode::from(1)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    info!("🎥 {} v{} starting", APP_NAME, env!("CARGO_PKG_VERSION"));
    let interrupts = signal::install()?;

    let path = default_config_path();
    let mut config = load_config(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;

    if cli.config || !path.exists() {
        if !path.exists() {
            info!("no configuration at {}, starting first-time setup", path.display());
        }
        interrupts.enter_setup();
        config = setup::run_interactive(&path, config)?;
        interrupts.leave_setup();
    }
    config.validate().context("invalid configuration")?;

    let streams = config.stream_configs()?;
    for stream in &streams {
        info!(stream = %stream.id, url = %stream.redacted_url(), "camera configured");
    }
    info!(
        rows = config.layout.rows,
        cols = config.layout.cols,
        streams = streams.len(),
        "🔧 configuration loaded"
    );

    let opener: Arc<dyn StreamOpener> = Arc::new(
        FfmpegOpener::new(
            config.stream.ffmpeg_bin.clone(),
            config.stream.frame_size(),
            config.stream.read_timeout(),
        )
        .with_rtsp_transport(config.stream.rtsp_transport.as_str()),
    );

    match config.display.backend {
        DisplayBackend::Snapshot => run_snapshot(&config, opener, interrupts.exit_flag()),
        DisplayBackend::Window => run_window(&config, opener, interrupts.exit_flag()),
    }
}

fn run_snapshot(config: &AppConfig, opener: Arc<dyn StreamOpener>, exit: Arc<AtomicBool>) -> Result<()> {
    let renderer = SnapshotRenderer::new(&config.display.snapshot_path, config.display.snapshot_interval());
    let mut display = DisplayLoop::new(config, opener, renderer)?.with_exit_flag(exit);
    display.run()?;
    Ok(())
}

#[cfg(feature = "gui")]
fn run_window(config: &AppConfig, opener: Arc<dyn StreamOpener>, exit: Arc<AtomicBool>) -> Result<()> {
    window::run(config, opener, exit)
}

#[cfg(not(feature = "gui"))]
fn run_window(_config: &AppConfig, _opener: Arc<dyn StreamOpener>, _exit: Arc<AtomicBool>) -> Result<()> {
    Err(TgError::Platform(
        "this build has no window support; rebuild with `--features gui` or set display.backend = \"snapshot\"".into(),
    )
    .into())
}
