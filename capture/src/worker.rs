use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tg_core::constants::{MAX_CONSECUTIVE_FAILURES, POLL_INTERVAL_MS, RECONNECT_PAUSE_MS};
use tg_core::error::{Result, TgError};
use tg_core::traits::{StreamOpener, StreamSource};
use tg_core::types::{Frame, FrameSize, Slot, StreamConfig};
use tg_processing::normalize;
use tracing::{debug, error, info, trace, warn};

use crate::frame_buffer::FrameBuffer;
use crate::health::StreamHealth;

// Longest a sleeping worker goes without looking at its stop flag.
const STOP_POLL_STEP: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
pub struct WorkerSettings {
    /// Every published frame has exactly this shape.
    pub frame_size: FrameSize,
    pub poll_interval: Duration,
    /// Reconnect is forced once failures exceed this.
    pub max_failures: u32,
    pub reconnect_pause: Duration,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            frame_size: FrameSize::DEFAULT,
            poll_interval: Duration::from_millis(POLL_INTERVAL_MS),
            max_failures: MAX_CONSECUTIVE_FAILURES,
            reconnect_pause: Duration::from_millis(RECONNECT_PAUSE_MS),
        }
    }
}

/// Owns one camera connection and keeps its FrameBuffer fed.
pub struct StreamWorker {
    config: StreamConfig,
    settings: WorkerSettings,
    opener: Arc<dyn StreamOpener>,
    buffer: Arc<FrameBuffer>,
    health: Arc<StreamHealth>,
    stop: Arc<AtomicBool>,
    handle: Option<Box<dyn StreamSource>>,
    failures: u32,
    last_success: Option<Instant>,
}

impl StreamWorker {
    pub fn new(config: StreamConfig, settings: WorkerSettings, opener: Arc<dyn StreamOpener>) -> Self {
        Self {
            config,
            settings,
            opener,
            buffer: Arc::new(FrameBuffer::new()),
            health: Arc::new(StreamHealth::new()),
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            failures: 0,
            last_success: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn buffer(&self) -> Arc<FrameBuffer> {
        self.buffer.clone()
    }

    pub fn health(&self) -> Arc<StreamHealth> {
        self.health.clone()
    }

    pub fn failure_count(&self) -> u32 {
        self.failures
    }

    pub fn last_success(&self) -> Option<Instant> {
        self.last_success
    }

    fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn open(&mut self) {
        match self.opener.open(&self.config.url) {
            Ok(handle) => {
                info!(stream = %self.config.id, url = %self.config.redacted_url(), "stream opened");
                self.handle = Some(handle);
            }
            Err(e) => {
                warn!(stream = %self.config.id, error = %e, "failed to open stream");
                self.handle = None;
            }
        }
    }

    fn release(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.release();
            debug!(stream = %self.config.id, "stream released");
        }
    }

    fn read(&mut self) -> Result<Frame> {
        match self.handle.as_mut() {
            Some(handle) => handle.read_frame(),
            None => Err(TgError::Read("no open stream".into())),
        }
    }

    /// Sleeps up to `total`, returning early once stop is requested.
    fn pause(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.is_stopping() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(STOP_POLL_STEP));
        }
    }

    fn record_failure(&mut self, err: &TgError) {
        self.failures += 1;
        if self.failures == 1 {
            warn!(stream = %self.config.id, error = %err, "failed to read frame");
        } else {
            debug!(stream = %self.config.id, failures = self.failures, error = %err, "read still failing");
        }
    }

    /// One poll: lazy reopen, read, publish, and a forced reconnect when
    /// the failure streak runs past the limit.
    pub fn cycle(&mut self) {
        if !self.handle.as_ref().is_some_and(|h| h.is_open()) {
            if self.handle.is_some() {
                warn!(stream = %self.config.id, "stream closed, reopening");
                self.release();
            }
            self.open();
        }

        let slot = match self.read() {
            Ok(raw) => match normalize(&raw, self.settings.frame_size) {
                Ok(frame) => {
                    self.failures = 0;
                    self.last_success = Some(Instant::now());
                    self.health.record_success();
                    Slot::live(frame)
                }
                Err(e) => {
                    self.record_failure(&e);
                    Slot::Placeholder
                }
            },
            Err(e) => {
                self.record_failure(&e);
                Slot::Placeholder
            }
        };

        if self.is_stopping() {
            return;
        }
        if !self.buffer.publish(slot) {
            trace!(stream = %self.config.id, "reader busy, frame dropped");
        }
        self.health.set_failures(self.failures);

        if self.failures > self.settings.max_failures {
            error!(
                stream = %self.config.id,
                failures = self.failures,
                "too many consecutive failures, forcing reconnect"
            );
            self.release();
            self.pause(self.settings.reconnect_pause);
            if self.is_stopping() {
                return;
            }
            self.open();
            self.failures = 0;
            self.health.record_forced_reconnect();
        }
    }

    /// Polls until the stop flag is set, then releases the connection once.
    pub fn run(mut self) {
        info!(stream = %self.config.id, "worker started");
        self.open();
        while !self.is_stopping() {
            let started = Instant::now();
            self.cycle();
            // Late cycles are not made up.
            if let Some(rest) = self.settings.poll_interval.checked_sub(started.elapsed()) {
                self.pause(rest);
            }
        }
        self.release();
        info!(stream = %self.config.id, "worker stopped");
    }

    pub fn spawn(self) -> Result<WorkerHandle> {
        let (done_tx, done_rx) = mpsc::channel::<()>();
        let id = self.config.id.clone();
        let stop = self.stop.clone();
        let buffer = self.buffer.clone();
        let health = self.health.clone();

        let thread = thread::Builder::new()
            .name(format!("stream-{}", id))
            .spawn(move || {
                // Dropped when the thread ends, however it ends.
                let _done = done_tx;
                self.run();
            })?;

        Ok(WorkerHandle {
            id,
            stop,
            done: done_rx,
            thread: Some(thread),
            buffer,
            health,
        })
    }

    pub fn start(
        config: StreamConfig,
        settings: WorkerSettings,
        opener: Arc<dyn StreamOpener>,
    ) -> Result<WorkerHandle> {
        Self::new(config, settings, opener).spawn()
    }
}

impl Drop for StreamWorker {
    fn drop(&mut self) {
        self.release();
    }
}

/// The render side of a running worker.
pub struct WorkerHandle {
    id: String,
    stop: Arc<AtomicBool>,
    done: mpsc::Receiver<()>,
    thread: Option<JoinHandle<()>>,
    buffer: Arc<FrameBuffer>,
    health: Arc<StreamHealth>,
}

impl WorkerHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn buffer(&self) -> &Arc<FrameBuffer> {
        &self.buffer
    }

    pub fn health(&self) -> &Arc<StreamHealth> {
        &self.health
    }

    /// Latest published slot; a placeholder until the first publish.
    pub fn latest(&self) -> Slot {
        self.buffer.latest(Slot::Placeholder)
    }

    pub fn signal_stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Stops and waits up to `grace`. False means the thread was detached.
    pub fn stop(mut self, grace: Duration) -> bool {
        self.signal_stop();
        self.join_until(Instant::now() + grace)
    }

    fn join_until(&mut self, deadline: Instant) -> bool {
        let wait = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(wait) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if let Some(thread) = self.thread.take() {
                    if thread.join().is_err() {
                        error!(stream = %self.id, "worker thread panicked");
                    }
                }
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(stream = %self.id, "worker did not stop in time, detaching");
                self.thread.take();
                false
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

/// Signals every worker first so they wind down in parallel, then waits
/// against one shared deadline. Returns how many were detached.
pub fn stop_all(handles: Vec<WorkerHandle>, grace: Duration) -> usize {
    for handle in &handles {
        handle.signal_stop();
    }
    let deadline = Instant::now() + grace;
    handles
        .into_iter()
        .map(|mut handle| handle.join_until(deadline))
        .filter(|joined| !joined)
        .count()
}
