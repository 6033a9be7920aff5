use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment, File, Map};
use tg_core::constants::*;
use tg_core::error::{Result, TgError};

use crate::schema::{default_snapshot_path, AppConfig};

/// `$TG_CONFIG_PATH`, else `<config dir>/tapogrid/config.toml`.
pub fn default_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push(CONFIG_DIR_NAME);
    path.push(CONFIG_FILE_NAME);
    path
}

pub fn load_config(path: &Path) -> std::result::Result<AppConfig, ConfigError> {
    load_config_with_env(path, None)
}

/// Defaults, then the TOML file, then `TG_*` variables (e.g. `TG_STREAM__MAX_FAILURES=10`).
/// `env` replaces the process environment when given.
pub fn load_config_with_env(
    path: &Path,
    env: Option<Map<String, String>>,
) -> std::result::Result<AppConfig, ConfigError> {
    let snapshot_path = default_snapshot_path();

    let s = Config::builder()
        .set_default("layout.rows", 2)?
        .set_default("layout.cols", 3)?
        .set_default("stream.frame_width", DEFAULT_FRAME_WIDTH)?
        .set_default("stream.frame_height", DEFAULT_FRAME_HEIGHT)?
        .set_default("stream.channels", DEFAULT_FRAME_CHANNELS)?
        .set_default("stream.poll_interval_ms", POLL_INTERVAL_MS)?
        .set_default("stream.max_failures", MAX_CONSECUTIVE_FAILURES)?
        .set_default("stream.reconnect_pause_ms", RECONNECT_PAUSE_MS)?
        .set_default("stream.read_timeout_ms", READ_TIMEOUT_MS)?
        .set_default("stream.rtsp_port", RTSP_PORT)?
        .set_default("stream.rtsp_path", RTSP_PATH)?
        .set_default("stream.rtsp_transport", "tcp")?
        .set_default("stream.ffmpeg_bin", "ffmpeg")?

        .set_default("display.title", APP_NAME)?
        .set_default("display.backend", "window")?
        .set_default("display.render_interval_ms", RENDER_INTERVAL_MS)?
        .set_default("display.restart_interval_secs", RESTART_INTERVAL_SECS)?
        .set_default("display.stop_grace_ms", STOP_GRACE_MS)?
        .set_default("display.health_log_interval_secs", HEALTH_LOG_INTERVAL_SECS)?
        .set_default("display.snapshot_path", snapshot_path.to_string_lossy().to_string())?
        .set_default("display.snapshot_interval_ms", 1000)?

        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("TG")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()?;

    s.try_deserialize()
}

pub fn save_config(path: &Path, config: &AppConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = toml::to_string_pretty(config)
        .map_err(|e| TgError::Config(format!("cannot serialize configuration: {}", e)))?;
    fs::write(path, body)?;
    tracing::info!(path = %path.display(), "configuration written");
    Ok(())
}
