pub mod constants;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Result, TgError};
pub use types::{Frame, FrameSize, GridLayout, Slot, StreamConfig};
