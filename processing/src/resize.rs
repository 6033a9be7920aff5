use image::imageops::{self, FilterType};
use image::{ImageBuffer, Luma, Rgb, Rgba};
use tg_core::error::{Result, TgError};
use tg_core::types::{Frame, FrameSize};

/// Brings a decoded frame to the process-wide shape.
///
/// Nearest-neighbour scaling plus channel conversion between gray (1),
/// BGR (3) and BGRA (4). A frame already in shape is returned as a cheap clone.
pub fn normalize(frame: &Frame, target: FrameSize) -> Result<Frame> {
    let src = frame.size();
    if src == target {
        return Ok(frame.clone());
    }
    if src.is_empty() || target.is_empty() {
        return Err(TgError::Decode(format!("cannot resize {} to {}", src, target)));
    }
    if !supported(src.channels) || !supported(target.channels) {
        return Err(TgError::Decode(format!(
            "unsupported channel conversion {} -> {}",
            src.channels, target.channels
        )));
    }

    let scaled = if src.height == target.height && src.width == target.width {
        frame.data().to_vec()
    } else {
        resize(frame.data(), src, target.width, target.height)?
    };

    let data = if src.channels == target.channels {
        scaled
    } else {
        convert_channels(&scaled, src.channels as usize, target.channels as usize)
    };
    Frame::new(target, data)
}

fn supported(channels: u32) -> bool {
    matches!(channels, 1 | 3 | 4)
}

// Channel order is irrelevant to nearest sampling, so BGR goes through as Rgb.
fn resize(data: &[u8], src: FrameSize, width: u32, height: u32) -> Result<Vec<u8>> {
    let mismatch = || TgError::Decode(format!("frame {} does not match its buffer", src));
    let out = match src.channels {
        1 => {
            let img = ImageBuffer::<Luma<u8>, _>::from_raw(src.width, src.height, data).ok_or_else(mismatch)?;
            imageops::resize(&img, width, height, FilterType::Nearest).into_raw()
        }
        3 => {
            let img = ImageBuffer::<Rgb<u8>, _>::from_raw(src.width, src.height, data).ok_or_else(mismatch)?;
            imageops::resize(&img, width, height, FilterType::Nearest).into_raw()
        }
        4 => {
            let img = ImageBuffer::<Rgba<u8>, _>::from_raw(src.width, src.height, data).ok_or_else(mismatch)?;
            imageops::resize(&img, width, height, FilterType::Nearest).into_raw()
        }
        n => return Err(TgError::Decode(format!("unsupported channel count {}", n))),
    };
    Ok(out)
}

fn luma(b: u8, g: u8, r: u8) -> u8 {
    ((29 * b as u32 + 150 * g as u32 + 77 * r as u32) >> 8) as u8
}

fn convert_channels(data: &[u8], from: usize, to: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / from * to);
    for px in data.chunks_exact(from) {
        match (from, to) {
            (1, 3) => out.extend_from_slice(&[px[0], px[0], px[0]]),
            (1, 4) => out.extend_from_slice(&[px[0], px[0], px[0], 255]),
            (3, 4) => out.extend_from_slice(&[px[0], px[1], px[2], 255]),
            (4, 3) => out.extend_from_slice(&px[..3]),
            (_, 1) => out.push(luma(px[0], px[1], px[2])),
            _ => out.extend_from_slice(px),
        }
    }
    out
}
