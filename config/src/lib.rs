pub mod loader;
pub mod schema;
pub mod setup;

pub use loader::{default_config_path, load_config, save_config};
pub use schema::{AppConfig, CameraConfig, Credentials, DisplayBackend, DisplaySettings, RtspTransport, StreamSettings};
