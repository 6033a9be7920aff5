mod dummy;
mod ffmpeg;
mod frame_buffer;
mod health;
mod worker;

pub use dummy::{DummyBehavior, DummyOpener, DummyStats};
pub use ffmpeg::{ffmpeg_args, FfmpegOpener, FfmpegSource};
pub use frame_buffer::FrameBuffer;
pub use health::{HealthSnapshot, StreamHealth};
pub use worker::{stop_all, StreamWorker, WorkerHandle, WorkerSettings};
