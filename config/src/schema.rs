use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tg_core::constants::*;
use tg_core::error::{Result, TgError};
use tg_core::types::{FrameSize, GridLayout, StreamConfig};
use url::Url;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub layout: GridLayout,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
    pub stream: StreamSettings,
    pub display: DisplaySettings,
}

#[derive(Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct CameraConfig {
    pub id: String,
    #[serde(default)]
    pub host: String, // IPv4 or hostname, optional ":port"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>, // full URL, wins over host
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RtspTransport {
    Tcp,
    Udp,
}

impl RtspTransport {
    pub fn as_str(&self) -> &'static str {
        match self {
            RtspTransport::Tcp => "tcp",
            RtspTransport::Udp => "udp",
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StreamSettings {
    pub frame_width: u32,
    pub frame_height: u32,
    pub channels: u32,
    pub poll_interval_ms: u64,
    pub max_failures: u32,
    pub reconnect_pause_ms: u64,
    pub read_timeout_ms: u64,
    pub rtsp_port: u16,
    pub rtsp_path: String,
    pub rtsp_transport: RtspTransport,
    pub ffmpeg_bin: String,
}

impl StreamSettings {
    pub fn frame_size(&self) -> FrameSize {
        FrameSize::new(self.frame_height, self.frame_width, self.channels)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_pause(&self) -> Duration {
        Duration::from_millis(self.reconnect_pause_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayBackend {
    Window,
    Snapshot,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DisplaySettings {
    pub title: String,
    pub backend: DisplayBackend,
    pub render_interval_ms: u64,
    pub restart_interval_secs: u64,
    pub stop_grace_ms: u64,
    pub health_log_interval_secs: u64,
    pub snapshot_path: PathBuf,
    pub snapshot_interval_ms: u64,
}

impl DisplaySettings {
    pub fn render_interval(&self) -> Duration {
        Duration::from_millis(self.render_interval_ms)
    }

    pub fn restart_interval(&self) -> Duration {
        Duration::from_secs(self.restart_interval_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_millis(self.stop_grace_ms)
    }

    pub fn health_log_interval(&self) -> Duration {
        Duration::from_secs(self.health_log_interval_secs)
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_millis(self.snapshot_interval_ms)
    }
}

pub fn default_snapshot_path() -> PathBuf {
    std::env::temp_dir().join("tapogrid-grid.jpg")
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.layout.rows == 0 || self.layout.cols == 0 {
            return Err(TgError::Config(format!(
                "layout must have at least one row and one column (got {}x{})",
                self.layout.rows, self.layout.cols
            )));
        }

        let size = self.stream.frame_size();
        if size.height == 0 || size.width == 0 {
            return Err(TgError::Config(format!("frame size {} has a zero dimension", size)));
        }
        if !matches!(size.channels, 1 | 3 | 4) {
            return Err(TgError::Config(format!(
                "unsupported channel count {} (expected 1, 3 or 4)",
                size.channels
            )));
        }

        if self.stream.poll_interval_ms == 0 || self.display.render_interval_ms == 0 {
            return Err(TgError::Config("poll and render intervals must be positive".into()));
        }
        if self.display.restart_interval_secs == 0 {
            return Err(TgError::Config("restart_interval_secs must be positive".into()));
        }

        let mut seen = HashSet::new();
        for camera in &self.cameras {
            if !seen.insert(camera.id.as_str()) {
                return Err(TgError::Config(format!("duplicate camera id {:?}", camera.id)));
            }
        }

        if self.stream_configs()?.is_empty() {
            return Err(TgError::Config("no camera has a host or url configured".into()));
        }
        Ok(())
    }

    /// Ordered stream list; cameras with neither host nor url are skipped.
    pub fn stream_configs(&self) -> Result<Vec<StreamConfig>> {
        let mut streams = Vec::with_capacity(self.cameras.len());
        for camera in &self.cameras {
            if let Some(url) = self.camera_url(camera)? {
                streams.push(StreamConfig::new(camera.id.clone(), url));
            }
        }
        Ok(streams)
    }

    fn camera_url(&self, camera: &CameraConfig) -> Result<Option<String>> {
        if let Some(url) = camera.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Ok(Some(url.to_string()));
        }

        let host = camera.host.trim();
        if host.is_empty() {
            return Ok(None);
        }

        let path = self.stream.rtsp_path.trim_start_matches('/');
        let authority = if host.contains(':') {
            host.to_string()
        } else {
            format!("{}:{}", host, self.stream.rtsp_port)
        };
        let invalid = |detail: String| {
            TgError::Config(format!("camera {}: cannot build url for {:?}: {}", camera.id, host, detail))
        };

        let mut url = Url::parse(&format!("rtsp://{}/{}", authority, path))
            .map_err(|e| invalid(e.to_string()))?;
        if !self.credentials.user.is_empty() {
            url.set_username(&self.credentials.user)
                .map_err(|_| invalid("username rejected".into()))?;
            if !self.credentials.password.is_empty() {
                url.set_password(Some(&self.credentials.password))
                    .map_err(|_| invalid("password rejected".into()))?;
            }
        }
        Ok(Some(url.to_string()))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            layout: GridLayout::new(2, 3),
            credentials: Credentials::default(),
            cameras: Vec::new(),
            stream: StreamSettings {
                frame_width: DEFAULT_FRAME_WIDTH,
                frame_height: DEFAULT_FRAME_HEIGHT,
                channels: DEFAULT_FRAME_CHANNELS,
                poll_interval_ms: POLL_INTERVAL_MS,
                max_failures: MAX_CONSECUTIVE_FAILURES,
                reconnect_pause_ms: RECONNECT_PAUSE_MS,
                read_timeout_ms: READ_TIMEOUT_MS,
                rtsp_port: RTSP_PORT,
                rtsp_path: RTSP_PATH.to_string(),
                rtsp_transport: RtspTransport::Tcp,
                ffmpeg_bin: "ffmpeg".to_string(),
            },
            display: DisplaySettings {
                title: APP_NAME.to_string(),
                backend: DisplayBackend::Window,
                render_interval_ms: RENDER_INTERVAL_MS,
                restart_interval_secs: RESTART_INTERVAL_SECS,
                stop_grace_ms: STOP_GRACE_MS,
                health_log_interval_secs: HEALTH_LOG_INTERVAL_SECS,
                snapshot_path: default_snapshot_path(),
                snapshot_interval_ms: 1000,
            },
        }
    }
}
