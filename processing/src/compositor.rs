use bytes::BytesMut;
use tg_core::error::{Result, TgError};
use tg_core::types::{Frame, FrameSize, GridLayout, Slot};

/// Tiles per-stream frames into one rows x cols image.
#[derive(Debug, Clone, Copy)]
pub struct Compositor {
    layout: GridLayout,
    cell: FrameSize,
}

impl Compositor {
    pub fn new(layout: GridLayout, cell: FrameSize) -> Result<Self> {
        if layout.rows == 0 || layout.cols == 0 {
            return Err(TgError::Config(format!(
                "grid needs positive rows and cols (got {}x{})",
                layout.rows, layout.cols
            )));
        }
        if cell.is_empty() {
            return Err(TgError::Config(format!("cell size {} is empty", cell)));
        }
        Ok(Self { layout, cell })
    }

    pub fn canvas_size(&self) -> FrameSize {
        self.layout.canvas_size(self.cell)
    }

    /// Slot `i` lands in row `i / cols`, column `i % cols`. Slots past the
    /// last cell are ignored; cells without a slot stay zero.
    pub fn compose(&self, slots: &[Slot]) -> Result<Frame> {
        let canvas = self.canvas_size();
        let cols = self.layout.cols as usize;
        let cell_h = self.cell.height as usize;
        let cell_row = self.cell.row_len();
        let canvas_row = canvas.row_len();

        let mut output = BytesMut::zeroed(canvas.byte_len());

        for (index, slot) in slots.iter().take(self.layout.cells()).enumerate() {
            let frame = match slot {
                Slot::Live(frame) => frame,
                Slot::Placeholder => continue,
            };
            if frame.size() != self.cell {
                return Err(TgError::Render(format!(
                    "cell {} holds a {} frame, expected {}",
                    index,
                    frame.size(),
                    self.cell
                )));
            }

            let (r, c) = (index / cols, index % cols);
            let src = frame.data();
            for y in 0..cell_h {
                let dst_start = (r * cell_h + y) * canvas_row + c * cell_row;
                let src_start = y * cell_row;
                output[dst_start..dst_start + cell_row]
                    .copy_from_slice(&src[src_start..src_start + cell_row]);
            }
        }

        Frame::new(canvas, output.freeze())
    }
}
