use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tg_capture::{DummyBehavior, DummyOpener};
use tg_config::{AppConfig, CameraConfig};
use tg_core::error::{Result, TgError};
use tg_core::traits::{Renderer, StreamOpener, StreamSource};
use tg_core::types::{Frame, FrameSize, GridLayout};
use tg_display::{DisplayLoop, LoopState};

const CELL: FrameSize = FrameSize::new(36, 64, 3);

struct Recording {
    frames: Vec<Frame>,
    rendered_at: Vec<Instant>,
    attempts: usize,
    limit: usize,
    fail: bool,
    closed: bool,
    done: Box<dyn Fn(&Frame) -> bool>,
}

impl Recording {
    fn new(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            rendered_at: Vec::new(),
            attempts: 0,
            limit,
            fail: false,
            closed: false,
            done: Box::new(|_| false),
        }
    }

    fn until(mut self, done: impl Fn(&Frame) -> bool + 'static) -> Self {
        self.done = Box::new(done);
        self
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn last(&self) -> &Frame {
        self.frames.last().expect("at least one frame rendered")
    }
}

impl Renderer for Recording {
    fn render_window(&mut self, _title: &str, image: &Frame) -> Result<()> {
        self.attempts += 1;
        self.rendered_at.push(Instant::now());
        if self.fail {
            return Err(TgError::Render("display went away".into()));
        }
        self.frames.push(image.clone());
        Ok(())
    }

    fn poll_exit_key(&mut self) -> bool {
        self.attempts >= self.limit || self.frames.last().is_some_and(|f| (self.done)(f))
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Sources whose reads take far longer than a render tick.
struct SlowOpener {
    delay: Duration,
    opens: Arc<AtomicUsize>,
    releases: Arc<AtomicUsize>,
}

struct SlowSource {
    delay: Duration,
    releases: Arc<AtomicUsize>,
    released: bool,
}

impl StreamOpener for SlowOpener {
    fn open(&self, _url: &str) -> Result<Box<dyn StreamSource>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(SlowSource {
            delay: self.delay,
            releases: self.releases.clone(),
            released: false,
        }))
    }
}

impl StreamSource for SlowSource {
    fn is_open(&self) -> bool {
        !self.released
    }

    fn read_frame(&mut self) -> Result<Frame> {
        thread::sleep(self.delay);
        Ok(Frame::filled(CELL, 7))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Counts live sources per url and remembers the highest count seen.
#[derive(Clone, Default)]
struct TrackingOpener {
    live: Arc<Mutex<HashMap<String, usize>>>,
    peak: Arc<AtomicUsize>,
}

struct TrackedSource {
    url: String,
    live: Arc<Mutex<HashMap<String, usize>>>,
    released: bool,
}

impl TrackingOpener {
    fn live_total(&self) -> usize {
        self.live.lock().unwrap().values().sum()
    }
}

impl StreamOpener for TrackingOpener {
    fn open(&self, url: &str) -> Result<Box<dyn StreamSource>> {
        let mut live = self.live.lock().unwrap();
        let count = live.entry(url.to_string()).or_insert(0);
        *count += 1;
        self.peak.fetch_max(*count, Ordering::SeqCst);
        Ok(Box::new(TrackedSource {
            url: url.to_string(),
            live: self.live.clone(),
            released: false,
        }))
    }
}

impl StreamSource for TrackedSource {
    fn is_open(&self) -> bool {
        !self.released
    }

    fn read_frame(&mut self) -> Result<Frame> {
        thread::sleep(Duration::from_millis(2));
        Ok(Frame::filled(CELL, 3))
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            if let Some(count) = self.live.lock().unwrap().get_mut(&self.url) {
                *count -= 1;
            }
        }
    }
}

impl Drop for TrackedSource {
    fn drop(&mut self) {
        self.release();
    }
}

fn config(rows: u32, cols: u32, urls: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.layout = GridLayout::new(rows, cols);
    config.cameras = urls
        .iter()
        .enumerate()
        .map(|(i, url)| CameraConfig {
            id: format!("cam{}", i),
            host: String::new(),
            url: Some(url.to_string()),
        })
        .collect();
    config.stream.frame_height = CELL.height;
    config.stream.frame_width = CELL.width;
    config.stream.poll_interval_ms = 5;
    config.stream.reconnect_pause_ms = 0;
    config.display.render_interval_ms = 5;
    config.display.stop_grace_ms = 2000;
    config
}

/// Whether every pixel of grid cell (row, col) equals `value`.
fn cell_is(frame: &Frame, cell: FrameSize, row: u32, col: u32, value: u8) -> bool {
    (0..cell.height).all(|y| {
        (0..cell.width).all(|x| {
            frame
                .pixel(row * cell.height + y, col * cell.width + x)
                .iter()
                .all(|v| *v == value)
        })
    })
}

#[test]
fn healthy_two_by_two_grid_shows_each_stream() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let config = config(2, 2, &["dummy://cam/10", "dummy://cam/20", "dummy://cam/30", "dummy://cam/40"]);
    let renderer = Recording::new(2000).until(|f| {
        f.pixel(0, 0)[0] == 10 && f.pixel(0, 64)[0] == 20 && f.pixel(36, 0)[0] == 30 && f.pixel(36, 64)[0] == 40
    });

    let mut display = DisplayLoop::new(&config, Arc::new(opener.clone()), renderer).unwrap();
    display.run().unwrap();

    let grid = display.renderer().last();
    assert_eq!(grid.size(), FrameSize::new(72, 128, 3));
    assert!(cell_is(grid, CELL, 0, 0, 10));
    assert!(cell_is(grid, CELL, 0, 1, 20));
    assert!(cell_is(grid, CELL, 1, 0, 30));
    assert!(cell_is(grid, CELL, 1, 1, 40));
    assert_eq!(display.state(), LoopState::Stopped);
    assert!(display.renderer().closed);
}

#[test]
fn failing_stream_renders_blank_default_frame() {
    let opener = DummyOpener::new(DummyBehavior::FailReads);
    let mut config = config(1, 1, &["dummy://cam/99"]);
    config.stream.frame_height = 360;
    config.stream.frame_width = 640;

    let mut display = DisplayLoop::new(&config, Arc::new(opener), Recording::new(10)).unwrap();
    display.run().unwrap();

    let renderer = display.renderer();
    assert_eq!(renderer.frames.len(), 10);
    for frame in &renderer.frames {
        assert_eq!(frame.size(), FrameSize::new(360, 640, 3));
        assert!(frame.is_blank());
    }
}

#[test]
fn short_stream_list_pads_with_placeholders() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let config = config(2, 3, &["dummy://cam/1", "dummy://cam/2", "dummy://cam/3", "dummy://cam/4"]);
    let renderer = Recording::new(2000).until(|f| {
        f.pixel(0, 0)[0] == 1 && f.pixel(0, 64)[0] == 2 && f.pixel(0, 128)[0] == 3 && f.pixel(36, 0)[0] == 4
    });

    let mut display = DisplayLoop::new(&config, Arc::new(opener), renderer).unwrap();
    display.run().unwrap();

    let grid = display.renderer().last();
    assert_eq!(grid.size(), FrameSize::new(72, 192, 3));
    assert!(cell_is(grid, CELL, 1, 0, 4));
    assert!(cell_is(grid, CELL, 1, 1, 0));
    assert!(cell_is(grid, CELL, 1, 2, 0));
}

#[test]
fn extra_streams_are_not_shown() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let config = config(1, 1, &["dummy://cam/5", "dummy://cam/6"]);
    let renderer = Recording::new(2000).until(|f| f.pixel(0, 0)[0] == 5);

    let mut display = DisplayLoop::new(&config, Arc::new(opener), renderer).unwrap();
    display.run().unwrap();

    let grid = display.renderer().last();
    assert_eq!(grid.size(), CELL);
    assert!(cell_is(grid, CELL, 0, 0, 5));
}

#[test]
fn periodic_restart_replaces_workers() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let stats = opener.stats();
    let config = config(1, 2, &["dummy://cam/1", "dummy://cam/2"]);

    let mut display = DisplayLoop::new(&config, Arc::new(opener), Recording::new(60))
        .unwrap()
        .with_restart_interval(Duration::from_millis(40));
    display.run().unwrap();

    assert!(display.restart_count() >= 1);
    assert!(stats.opens() >= 4);
    assert_eq!(stats.releases(), stats.opens());
    assert_eq!(display.state(), LoopState::Stopped);
}

#[test]
fn restart_keeps_rendering_while_old_workers_stop() {
    let opener = SlowOpener {
        delay: Duration::from_millis(600),
        opens: Arc::new(AtomicUsize::new(0)),
        releases: Arc::new(AtomicUsize::new(0)),
    };
    let opens = opener.opens.clone();
    let releases = opener.releases.clone();
    let config = config(1, 1, &["slow://cam/1"]);

    let mut display = DisplayLoop::new(&config, Arc::new(opener), Recording::new(300))
        .unwrap()
        .with_restart_interval(Duration::from_millis(100));
    display.run().unwrap();

    assert!(display.restart_count() >= 1);
    let widest_gap = display
        .renderer()
        .rendered_at
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .max()
        .unwrap();
    assert!(widest_gap < Duration::from_millis(300), "render stalled for {:?}", widest_gap);
    assert_eq!(releases.load(Ordering::SeqCst), opens.load(Ordering::SeqCst));
}

#[test]
fn restarts_never_overlap_connections_to_one_camera() {
    let opener = TrackingOpener::default();
    let config = config(1, 3, &["track://cam/1", "track://cam/2", "track://cam/3"]);

    let mut display = DisplayLoop::new(&config, Arc::new(opener.clone()), Recording::new(200))
        .unwrap()
        .with_restart_interval(Duration::from_millis(20));
    display.run().unwrap();

    assert!(display.restart_count() >= 2);
    assert_eq!(opener.peak.load(Ordering::SeqCst), 1);
    assert_eq!(opener.live_total(), 0);
}

#[test]
fn render_errors_do_not_stop_the_loop() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let config = config(1, 1, &["dummy://cam/1"]);

    let mut display = DisplayLoop::new(&config, Arc::new(opener), Recording::new(15).failing()).unwrap();
    display.run().unwrap();

    assert_eq!(display.renderer().attempts, 15);
    assert!(display.renderer().frames.is_empty());
    assert_eq!(display.state(), LoopState::Stopped);
}

#[test]
fn exit_flag_stops_and_releases_everything() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let stats = opener.stats();
    let config = config(2, 2, &["dummy://cam/1", "dummy://cam/2", "dummy://cam/3"]);
    let exit = Arc::new(AtomicBool::new(true));

    let mut display = DisplayLoop::new(&config, Arc::new(opener), Recording::new(1000))
        .unwrap()
        .with_exit_flag(exit.clone());
    display.run().unwrap();

    assert!(exit.load(Ordering::SeqCst));
    assert_eq!(display.renderer().attempts, 0);
    assert_eq!(stats.releases(), stats.opens());
    assert!(display.renderer().closed);
}

#[test]
fn zero_sized_layout_is_rejected() {
    let opener = DummyOpener::new(DummyBehavior::Healthy);
    let config = config(0, 2, &["dummy://cam/1"]);
    assert!(matches!(
        DisplayLoop::new(&config, Arc::new(opener), Recording::new(1)),
        Err(TgError::Config(_))
    ));
}
