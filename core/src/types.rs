use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_FRAME_CHANNELS, DEFAULT_FRAME_HEIGHT, DEFAULT_FRAME_WIDTH};
use crate::error::{Result, TgError};

/// Shape shared by every frame in the process: (height, width, channels).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameSize {
    pub height: u32,
    pub width: u32,
    pub channels: u32,
}

impl FrameSize {
    pub const DEFAULT: FrameSize = FrameSize {
        height: DEFAULT_FRAME_HEIGHT,
        width: DEFAULT_FRAME_WIDTH,
        channels: DEFAULT_FRAME_CHANNELS,
    };

    pub const fn new(height: u32, width: u32, channels: u32) -> Self {
        Self { height, width, channels }
    }

    /// Bytes in one row of pixels.
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels as usize
    }

    pub fn byte_len(&self) -> usize {
        self.height as usize * self.row_len()
    }

    pub fn is_empty(&self) -> bool {
        self.byte_len() == 0
    }
}

impl Default for FrameSize {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for FrameSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}x{}", self.height, self.width, self.channels)
    }
}

/// A decoded image: row-major, channels interleaved (BGR for three channels).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    size: FrameSize,
    data: Bytes,
}

impl Frame {
    pub fn new(size: FrameSize, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() != size.byte_len() {
            return Err(TgError::Decode(format!(
                "buffer of {} bytes does not match frame shape {} ({} bytes)",
                data.len(),
                size,
                size.byte_len()
            )));
        }
        Ok(Self { size, data })
    }

    /// All-zero frame; this is what a placeholder looks like on screen.
    pub fn zeroed(size: FrameSize) -> Self {
        Self::filled(size, 0)
    }

    pub fn filled(size: FrameSize, value: u8) -> Self {
        Self {
            size,
            data: Bytes::from(vec![value; size.byte_len()]),
        }
    }

    pub fn size(&self) -> FrameSize {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Channel values of the pixel at row `y`, column `x`.
    pub fn pixel(&self, y: u32, x: u32) -> &[u8] {
        let c = self.size.channels as usize;
        let offset = y as usize * self.size.row_len() + x as usize * c;
        &self.data[offset..offset + c]
    }

    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|b| *b == 0)
    }
}

/// What a FrameBuffer holds and what the compositor consumes.
#[derive(Debug, Clone, Default)]
pub enum Slot {
    Live(Arc<Frame>),
    #[default]
    Placeholder,
}

impl Slot {
    pub fn live(frame: Frame) -> Self {
        Slot::Live(Arc::new(frame))
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Slot::Live(_))
    }

    pub fn frame(&self) -> Option<&Frame> {
        match self {
            Slot::Live(frame) => Some(frame.as_ref()),
            Slot::Placeholder => None,
        }
    }

    /// Materializes the slot; placeholders become zeroed frames of `size`.
    pub fn to_frame(&self, size: FrameSize) -> Frame {
        match self {
            Slot::Live(frame) => Frame::clone(frame),
            Slot::Placeholder => Frame::zeroed(size),
        }
    }
}

/// One configured camera. Immutable after startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub id: String,
    pub url: String,
}

impl StreamConfig {
    pub fn new(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }

    /// URL with any password masked, safe for log lines.
    pub fn redacted_url(&self) -> String {
        match url::Url::parse(&self.url) {
            Ok(mut parsed) => {
                if parsed.password().is_some() {
                    let _ = parsed.set_password(Some("***"));
                }
                parsed.to_string()
            }
            Err(_) => "<invalid url>".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridLayout {
    pub rows: u32,
    pub cols: u32,
}

impl GridLayout {
    pub fn new(rows: u32, cols: u32) -> Self {
        Self { rows, cols }
    }

    pub fn cells(&self) -> usize {
        self.rows as usize * self.cols as usize
    }

    /// Output shape for a grid of `cell` sized frames.
    pub fn canvas_size(&self, cell: FrameSize) -> FrameSize {
        FrameSize::new(self.rows * cell.height, self.cols * cell.width, cell.channels)
    }
}
