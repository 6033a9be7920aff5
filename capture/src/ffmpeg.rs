//! Camera connections backed by an `ffmpeg` child process.
//!
//! Each open stream is its own decoder process writing raw frames of a
//! fixed size to a pipe, so a wedged or crashing decoder only ever takes
//! down its own cell. A reader thread keeps the newest frame; reads wait
//! for the next one up to the read timeout.

use std::io::{BufRead, BufReader, Read};
use std::process::{Child, ChildStderr, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tg_core::error::{Result, TgError};
use tg_core::traits::{StreamOpener, StreamSource};
use tg_core::types::{Frame, FrameSize};
use tracing::{debug, warn};

pub struct FfmpegOpener {
    binary: String,
    decode_size: FrameSize,
    rtsp_transport: String,
    read_timeout: Duration,
}

impl FfmpegOpener {
    pub fn new(binary: impl Into<String>, decode_size: FrameSize, read_timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            decode_size,
            rtsp_transport: "tcp".to_string(),
            read_timeout,
        }
    }

    pub fn with_rtsp_transport(mut self, transport: impl Into<String>) -> Self {
        self.rtsp_transport = transport.into();
        self
    }
}

fn pixel_format(channels: u32) -> Result<&'static str> {
    match channels {
        1 => Ok("gray"),
        3 => Ok("bgr24"),
        4 => Ok("bgra"),
        n => Err(TgError::Decode(format!("unsupported channel count {}", n))),
    }
}

/// Command line that decodes `url` into raw `size` frames on stdout.
pub fn ffmpeg_args(url: &str, rtsp_transport: &str, size: FrameSize) -> Result<Vec<String>> {
    let pix_fmt = pixel_format(size.channels)?;
    let mut args: Vec<String> = ["-hide_banner", "-loglevel", "error", "-fflags", "nobuffer", "-flags", "low_delay"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
        args.push("-rtsp_transport".into());
        args.push(rtsp_transport.into());
    }
    args.extend([
        "-i".to_string(),
        url.to_string(),
        "-an".to_string(),
        "-vf".to_string(),
        format!("scale={}:{}", size.width, size.height),
        "-pix_fmt".to_string(),
        pix_fmt.to_string(),
        "-f".to_string(),
        "rawvideo".to_string(),
        "pipe:1".to_string(),
    ]);
    Ok(args)
}

impl StreamOpener for FfmpegOpener {
    fn open(&self, url: &str) -> Result<Box<dyn StreamSource>> {
        let args = ffmpeg_args(url, &self.rtsp_transport, self.decode_size)?;
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| TgError::Connection(format!("cannot start {}: {}", self.binary, e)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(TgError::Connection("decoder has no stdout".into()));
        };
        let stderr = child.stderr.take();

        let shared = Arc::new(Shared {
            latest: Mutex::new(None),
            ready: Condvar::new(),
            alive: AtomicBool::new(true),
        });

        let reader = {
            let shared = shared.clone();
            let size = self.decode_size;
            thread::Builder::new()
                .name("ffmpeg-reader".into())
                .spawn(move || pump_frames(stdout, size, shared))
        };
        let reader = match reader {
            Ok(handle) => handle,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e.into());
            }
        };
        let logger = stderr.and_then(|stderr| {
            thread::Builder::new()
                .name("ffmpeg-stderr".into())
                .spawn(move || forward_stderr(stderr))
                .ok()
        });

        debug!(pid = child.id(), "decoder started");
        Ok(Box::new(FfmpegSource {
            child: Some(child),
            reader: Some(reader),
            logger,
            shared,
            read_timeout: self.read_timeout,
        }))
    }
}

struct Shared {
    latest: Mutex<Option<Frame>>,
    ready: Condvar,
    alive: AtomicBool,
}

fn pump_frames(mut stdout: ChildStdout, size: FrameSize, shared: Arc<Shared>) {
    let mut buf = vec![0u8; size.byte_len()];
    loop {
        if let Err(e) = stdout.read_exact(&mut buf) {
            debug!(error = %e, "decoder output ended");
            break;
        }
        match Frame::new(size, buf.clone()) {
            Ok(frame) => {
                *shared.latest.lock() = Some(frame);
                shared.ready.notify_one();
            }
            Err(e) => {
                warn!(error = %e, "dropping malformed decoder frame");
                break;
            }
        }
    }
    shared.alive.store(false, Ordering::Release);
    shared.ready.notify_all();
}

fn forward_stderr(stderr: ChildStderr) {
    for line in BufReader::new(stderr).lines().map_while(|l| l.ok()) {
        if !line.trim().is_empty() {
            warn!("ffmpeg: {}", line.trim());
        }
    }
}

pub struct FfmpegSource {
    child: Option<Child>,
    reader: Option<JoinHandle<()>>,
    logger: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    read_timeout: Duration,
}

impl StreamSource for FfmpegSource {
    fn is_open(&self) -> bool {
        self.child.is_some() && self.shared.alive.load(Ordering::Acquire)
    }

    /// Next decoded frame, waiting at most the read timeout.
    fn read_frame(&mut self) -> Result<Frame> {
        let deadline = Instant::now() + self.read_timeout;
        let mut latest = self.shared.latest.lock();
        loop {
            if let Some(frame) = latest.take() {
                return Ok(frame);
            }
            if !self.shared.alive.load(Ordering::Acquire) {
                return Err(TgError::Read("decoder exited".into()));
            }
            if self.shared.ready.wait_until(&mut latest, deadline).timed_out() {
                return latest
                    .take()
                    .ok_or_else(|| TgError::Read(format!("no frame within {:?}", self.read_timeout)));
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        for handle in [self.reader.take(), self.logger.take()].into_iter().flatten() {
            let _ = handle.join();
        }
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.release();
    }
}
