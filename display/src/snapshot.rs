use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::codecs::jpeg::JpegEncoder;
use image::RgbImage;
use tg_core::error::{Result, TgError};
use tg_core::traits::Renderer;
use tg_core::types::Frame;
use tracing::{debug, info};

const JPEG_QUALITY: u8 = 85;

/// Headless renderer: keeps a JPEG of the latest grid on disk.
pub struct SnapshotRenderer {
    path: PathBuf,
    interval: Duration,
    last_write: Option<Instant>,
    writes: u64,
}

impl SnapshotRenderer {
    pub fn new(path: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            path: path.into(),
            interval,
            last_write: None,
            writes: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    fn write(&self, image: &Frame) -> Result<()> {
        let rgb = to_rgb(image)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Write beside the target and rename so readers never see half a file.
        let partial = self.path.with_extension("partial");
        {
            let mut out = BufWriter::new(File::create(&partial)?);
            let encoder = JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .map_err(|e| TgError::Render(format!("jpeg encoding failed: {}", e)))?;
        }
        fs::rename(&partial, &self.path)?;
        Ok(())
    }
}

/// BGR, BGRA and gray frames as an RGB image.
fn to_rgb(frame: &Frame) -> Result<RgbImage> {
    let size = frame.size();
    let c = size.channels as usize;
    let data = frame.data();
    let mut out = Vec::with_capacity(size.height as usize * size.width as usize * 3);
    match c {
        1 => {
            for &v in data {
                out.extend_from_slice(&[v, v, v]);
            }
        }
        3 | 4 => {
            for px in data.chunks_exact(c) {
                out.extend_from_slice(&[px[2], px[1], px[0]]);
            }
        }
        n => return Err(TgError::Render(format!("cannot encode {} channel frame", n))),
    }
    RgbImage::from_raw(size.width, size.height, out)
        .ok_or_else(|| TgError::Render(format!("frame {} does not match its buffer", size)))
}

impl Renderer for SnapshotRenderer {
    fn render_window(&mut self, title: &str, image: &Frame) -> Result<()> {
        if self.last_write.is_some_and(|at| at.elapsed() < self.interval) {
            return Ok(());
        }
        self.write(image)?;
        self.last_write = Some(Instant::now());
        self.writes += 1;
        if self.writes == 1 {
            info!(title, path = %self.path.display(), "writing grid snapshots");
        } else {
            debug!(path = %self.path.display(), "snapshot updated");
        }
        Ok(())
    }

    fn poll_exit_key(&mut self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tg_core::types::FrameSize;

    fn scratch(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("tapogrid-snap-{}-{}", std::process::id(), name))
            .join("grid.jpg")
    }

    #[test]
    fn converts_bgr_to_rgb() {
        let frame = Frame::new(FrameSize::new(1, 1, 3), vec![1u8, 2, 3]).unwrap();
        let rgb = to_rgb(&frame).unwrap();
        assert_eq!(rgb.as_raw(), &vec![3u8, 2, 1]);

        let gray = Frame::new(FrameSize::new(1, 2, 1), vec![7u8, 9]).unwrap();
        assert_eq!(to_rgb(&gray).unwrap().as_raw(), &vec![7u8, 7, 7, 9, 9, 9]);
    }

    #[test]
    fn writes_jpeg_and_throttles() {
        let path = scratch("throttle");
        let mut renderer = SnapshotRenderer::new(&path, Duration::from_secs(60));
        let frame = Frame::filled(FrameSize::new(16, 32, 3), 200);

        renderer.render_window("grid", &frame).unwrap();
        renderer.render_window("grid", &frame).unwrap();
        assert_eq!(renderer.writes(), 1);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert!(!renderer.poll_exit_key());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn zero_interval_writes_every_frame() {
        let path = scratch("every");
        let mut renderer = SnapshotRenderer::new(&path, Duration::ZERO);
        let frame = Frame::zeroed(FrameSize::new(8, 8, 4));
        for _ in 0..3 {
            renderer.render_window("grid", &frame).unwrap();
        }
        assert_eq!(renderer.writes(), 3);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
