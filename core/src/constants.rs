pub const APP_NAME: &str = "TapoGrid";
pub const CONFIG_DIR_NAME: &str = "tapogrid";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const CONFIG_PATH_ENV: &str = "TG_CONFIG_PATH";

pub const DEFAULT_FRAME_HEIGHT: u32 = 360;
pub const DEFAULT_FRAME_WIDTH: u32 = 640;
pub const DEFAULT_FRAME_CHANNELS: u32 = 3;

pub const RTSP_PORT: u16 = 554;
pub const RTSP_PATH: &str = "stream2";
pub const DEFAULT_CAMERA_HOST: &str = "192.168.1.2";

pub const POLL_INTERVAL_MS: u64 = 67;
pub const RENDER_INTERVAL_MS: u64 = 67;
pub const MAX_CONSECUTIVE_FAILURES: u32 = 30;
pub const RECONNECT_PAUSE_MS: u64 = 1000;
pub const READ_TIMEOUT_MS: u64 = 1000;
pub const RESTART_INTERVAL_SECS: u64 = 600;
pub const STOP_GRACE_MS: u64 = 1000;
pub const HEALTH_LOG_INTERVAL_SECS: u64 = 30;
