use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tg_capture::{stop_all, StreamWorker, WorkerHandle, WorkerSettings};
use tg_config::{AppConfig, StreamSettings};
use tg_core::error::Result;
use tg_core::traits::{Renderer, StreamOpener};
use tg_core::types::{Slot, StreamConfig};
use tg_processing::Compositor;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Starting,
    Running,
    Stopping,
    Stopped,
}

pub fn worker_settings(stream: &StreamSettings) -> WorkerSettings {
    WorkerSettings {
        frame_size: stream.frame_size(),
        poll_interval: stream.poll_interval(),
        max_failures: stream.max_failures,
        reconnect_pause: stream.reconnect_pause(),
    }
}

/// Owns the worker set and renders the composed grid until told to exit.
pub struct DisplayLoop<R: Renderer> {
    streams: Vec<StreamConfig>,
    settings: WorkerSettings,
    opener: Arc<dyn StreamOpener>,
    compositor: Compositor,
    renderer: R,
    title: String,
    render_interval: Duration,
    restart_interval: Duration,
    stop_grace: Duration,
    health_log_interval: Duration,
    workers: Vec<WorkerHandle>,
    // Old worker set being stopped off the render thread.
    retiring: Option<JoinHandle<usize>>,
    state: LoopState,
    exit: Arc<AtomicBool>,
    restarts: u32,
}

impl<R: Renderer> DisplayLoop<R> {
    pub fn new(config: &AppConfig, opener: Arc<dyn StreamOpener>, renderer: R) -> Result<Self> {
        let compositor = Compositor::new(config.layout, config.stream.frame_size())?;
        Ok(Self {
            streams: config.stream_configs()?,
            settings: worker_settings(&config.stream),
            opener,
            compositor,
            renderer,
            title: config.display.title.clone(),
            render_interval: config.display.render_interval(),
            restart_interval: config.display.restart_interval(),
            stop_grace: config.display.stop_grace(),
            health_log_interval: config.display.health_log_interval(),
            workers: Vec::new(),
            retiring: None,
            state: LoopState::Starting,
            exit: Arc::new(AtomicBool::new(false)),
            restarts: 0,
        })
    }

    /// Shares an externally owned exit flag, e.g. one raised on Ctrl-C.
    pub fn with_exit_flag(mut self, exit: Arc<AtomicBool>) -> Self {
        self.exit = exit;
        self
    }

    pub fn with_restart_interval(mut self, interval: Duration) -> Self {
        self.restart_interval = interval;
        self
    }

    pub fn with_health_log_interval(mut self, interval: Duration) -> Self {
        self.health_log_interval = interval;
        self
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    pub fn restart_count(&self) -> u32 {
        self.restarts
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    fn exit_requested(&self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    fn start_workers(&mut self) -> Result<()> {
        for stream in &self.streams {
            let handle = StreamWorker::start(stream.clone(), self.settings, self.opener.clone())?;
            self.workers.push(handle);
        }
        info!(streams = self.workers.len(), "workers started");
        Ok(())
    }

    fn stop_workers(&mut self) {
        let workers = std::mem::take(&mut self.workers);
        let count = workers.len();
        log_detached(stop_all(workers, self.stop_grace), count);
    }

    /// Hands the current worker set to a helper thread for stopping. Ticks
    /// render placeholders until `finish_restart` brings up the new set.
    fn begin_restart(&mut self) -> Result<()> {
        info!("restarting all streams");
        let workers = std::mem::take(&mut self.workers);
        let grace = self.stop_grace;
        let retiring = thread::Builder::new()
            .name("restart".into())
            .spawn(move || {
                let count = workers.len();
                let detached = stop_all(workers, grace);
                log_detached(detached, count);
                detached
            })?;
        self.retiring = Some(retiring);
        Ok(())
    }

    /// Starts the new worker set once every old worker is joined or detached.
    /// Returns true when a restart completed.
    fn finish_restart(&mut self) -> Result<bool> {
        if !self.retiring.as_ref().is_some_and(|r| r.is_finished()) {
            return Ok(false);
        }
        self.join_retiring();
        self.start_workers()?;
        self.restarts += 1;
        Ok(true)
    }

    fn join_retiring(&mut self) {
        if let Some(retiring) = self.retiring.take() {
            if retiring.join().is_err() {
                error!("restart thread panicked");
            }
        }
    }

    /// Composes whatever each worker last published and hands it to the renderer.
    pub fn tick(&mut self) -> Result<()> {
        let slots: Vec<Slot> = self.workers.iter().map(WorkerHandle::latest).collect();
        let grid = self.compositor.compose(&slots)?;
        self.renderer.render_window(&self.title, &grid)
    }

    fn log_health(&self) {
        let mut live = 0;
        for worker in &self.workers {
            let snap = worker.health().snapshot();
            if snap.is_live() {
                live += 1;
            }
            debug!(
                stream = %worker.id(),
                failures = snap.consecutive_failures,
                forced_reconnects = snap.forced_reconnects,
                since_last_success = ?snap.since_last_success,
                "stream health"
            );
        }
        info!(live, total = self.workers.len(), restarts = self.restarts, "stream health summary");
    }

    pub fn run(&mut self) -> Result<()> {
        self.state = LoopState::Starting;
        if let Err(e) = self.start_workers() {
            self.shutdown();
            return Err(e);
        }
        self.state = LoopState::Running;

        let mut last_restart = Instant::now();
        let mut last_health = Instant::now();
        while !self.exit_requested() {
            let started = Instant::now();

            if let Err(e) = self.tick() {
                warn!(error = %e, "render tick failed");
            }
            if self.renderer.poll_exit_key() {
                info!("exit requested from the display");
                break;
            }

            let restart = if self.retiring.is_some() {
                self.finish_restart().map(|done| {
                    if done {
                        last_restart = Instant::now();
                    }
                })
            } else if last_restart.elapsed() >= self.restart_interval {
                self.begin_restart()
            } else {
                Ok(())
            };
            if let Err(e) = restart {
                self.shutdown();
                return Err(e);
            }
            if last_health.elapsed() >= self.health_log_interval {
                self.log_health();
                last_health = Instant::now();
            }

            if let Some(rest) = self.render_interval.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }

        self.shutdown();
        Ok(())
    }

    fn shutdown(&mut self) {
        self.state = LoopState::Stopping;
        self.join_retiring();
        self.stop_workers();
        self.renderer.close();
        self.state = LoopState::Stopped;
        info!("display loop stopped");
    }
}

fn log_detached(detached: usize, total: usize) {
    if detached > 0 {
        warn!(detached, total, "some workers did not stop within the grace period");
    } else {
        debug!(total, "workers stopped");
    }
}
