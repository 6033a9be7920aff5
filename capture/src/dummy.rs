use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tg_core::error::{Result, TgError};
use tg_core::traits::{StreamOpener, StreamSource};
use tg_core::types::{Frame, FrameSize};

/// Scripted camera for exercising workers and the display loop without a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DummyBehavior {
    Healthy,
    FailReads,
    FailOpen,
    /// Opens fine but reports closed right away.
    ReportClosed,
}

#[derive(Debug, Default)]
pub struct DummyStats {
    pub opens: AtomicUsize,
    pub releases: AtomicUsize,
    pub reads: AtomicUsize,
}

impl DummyStats {
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[derive(Clone)]
pub struct DummyOpener {
    behavior: Arc<Mutex<DummyBehavior>>,
    source_size: FrameSize,
    fill: u8,
    stats: Arc<DummyStats>,
}

impl DummyOpener {
    pub fn new(behavior: DummyBehavior) -> Self {
        Self {
            behavior: Arc::new(Mutex::new(behavior)),
            source_size: FrameSize::new(48, 64, 3),
            fill: 0x80,
            stats: Arc::new(DummyStats::default()),
        }
    }

    /// Native size of produced frames, before normalization.
    pub fn with_source_size(mut self, size: FrameSize) -> Self {
        self.source_size = size;
        self
    }

    /// Applies to sources opened from now on and to live ones on their next call.
    pub fn set_behavior(&self, behavior: DummyBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn stats(&self) -> Arc<DummyStats> {
        self.stats.clone()
    }

    // `dummy://any/42` paints every pixel 42.
    fn fill_for(&self, url: &str) -> u8 {
        url.rsplit('/')
            .next()
            .and_then(|s| s.parse::<u8>().ok())
            .unwrap_or(self.fill)
    }
}

impl StreamOpener for DummyOpener {
    fn open(&self, url: &str) -> Result<Box<dyn StreamSource>> {
        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        if *self.behavior.lock() == DummyBehavior::FailOpen {
            return Err(TgError::Connection(format!("dummy refused {}", url)));
        }
        Ok(Box::new(DummySource {
            behavior: self.behavior.clone(),
            size: self.source_size,
            fill: self.fill_for(url),
            stats: self.stats.clone(),
            released: false,
        }))
    }
}

struct DummySource {
    behavior: Arc<Mutex<DummyBehavior>>,
    size: FrameSize,
    fill: u8,
    stats: Arc<DummyStats>,
    released: bool,
}

impl StreamSource for DummySource {
    fn is_open(&self) -> bool {
        !self.released && *self.behavior.lock() != DummyBehavior::ReportClosed
    }

    fn read_frame(&mut self) -> Result<Frame> {
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        match *self.behavior.lock() {
            DummyBehavior::Healthy if !self.released => Ok(Frame::filled(self.size, self.fill)),
            _ => Err(TgError::Read("dummy read failed".into())),
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.stats.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
