//! GTK4 window back-end. GTK owns the main thread; the display loop runs on
//! its own thread and hands each composed grid over through a FrameBuffer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context as _, Result};
use gtk4::cairo::{self, Context, Format, ImageSurface};
use gtk4::prelude::*;
use gtk4::{gdk, glib, Application, ApplicationWindow, DrawingArea, EventControllerKey};
use tg_capture::FrameBuffer;
use tg_config::AppConfig;
use tg_core::error::Result as TgResult;
use tg_core::traits::{Renderer, StreamOpener};
use tg_core::types::{Frame, Slot};
use tg_display::DisplayLoop;
use tracing::{info, warn};

const APPLICATION_ID: &str = "io.github.tapogrid.viewer";
const REDRAW_INTERVAL: Duration = Duration::from_millis(33);

/// Renderer half that lives on the display loop thread.
struct GtkBridge {
    grid: Arc<FrameBuffer>,
    exit: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
}

impl Renderer for GtkBridge {
    fn render_window(&mut self, _title: &str, image: &Frame) -> TgResult<()> {
        // Dropped while the UI is drawing; the next tick publishes again.
        self.grid.publish(Slot::live(image.clone()));
        Ok(())
    }

    fn poll_exit_key(&mut self) -> bool {
        self.exit.load(Ordering::Acquire)
    }

    fn close(&mut self) {
        self.done.store(true, Ordering::Release);
    }
}

/// Frame pixels as a cairo RGB24 surface (BGRX in memory).
fn to_surface(frame: &Frame) -> Result<ImageSurface> {
    let size = frame.size();
    let channels = size.channels as usize;
    let mut surface = ImageSurface::create(Format::Rgb24, size.width as i32, size.height as i32)?;
    let stride = surface.stride() as usize;
    {
        let mut data = surface.data().map_err(|e| anyhow!("surface busy: {}", e))?;
        for (y, src_row) in frame.data().chunks_exact(size.row_len()).enumerate() {
            let dst_row = &mut data[y * stride..y * stride + size.width as usize * 4];
            for (dst, px) in dst_row.chunks_exact_mut(4).zip(src_row.chunks_exact(channels)) {
                match channels {
                    1 => dst.copy_from_slice(&[px[0], px[0], px[0], 0xFF]),
                    _ => dst.copy_from_slice(&[px[0], px[1], px[2], 0xFF]),
                }
            }
        }
    }
    Ok(surface)
}

/// Letterboxes the grid into the widget.
fn paint(ctx: &Context, slot: &Slot, width: i32, height: i32) -> Result<()> {
    ctx.set_source_rgb(0.0, 0.0, 0.0);
    ctx.paint()?;

    let Some(frame) = slot.frame() else {
        return Ok(());
    };
    let size = frame.size();
    if size.is_empty() || width <= 0 || height <= 0 {
        return Ok(());
    }

    let surface = to_surface(frame)?;
    let scale = (width as f64 / size.width as f64).min(height as f64 / size.height as f64);
    let offset_x = (width as f64 - size.width as f64 * scale) / 2.0;
    let offset_y = (height as f64 - size.height as f64 * scale) / 2.0;

    ctx.save()?;
    ctx.translate(offset_x, offset_y);
    ctx.scale(scale, scale);
    ctx.set_source_surface(&surface, 0.0, 0.0)?;
    ctx.source().set_filter(cairo::Filter::Good);
    ctx.paint()?;
    ctx.restore()?;
    Ok(())
}

pub fn run(config: &AppConfig, opener: Arc<dyn StreamOpener>, exit: Arc<AtomicBool>) -> Result<()> {
    gtk4::init().context("failed to initialize GTK, is a display available?")?;

    let grid = Arc::new(FrameBuffer::new());
    let done = Arc::new(AtomicBool::new(false));
    let bridge = GtkBridge {
        grid: grid.clone(),
        exit: exit.clone(),
        done: done.clone(),
    };
    let mut display = DisplayLoop::new(config, opener, bridge)?.with_exit_flag(exit.clone());
    let worker = thread::Builder::new()
        .name("display-loop".into())
        .spawn(move || display.run())
        .context("failed to spawn display loop")?;

    let title = config.display.title.clone();
    let canvas = config.layout.canvas_size(config.stream.frame_size());
    let app = Application::builder().application_id(APPLICATION_ID).build();

    let exit_ui = exit.clone();
    app.connect_activate(move |app| {
        let window = ApplicationWindow::builder()
            .application(app)
            .title(title.as_str())
            .default_width(canvas.width as i32)
            .default_height(canvas.height as i32)
            .build();

        let area = DrawingArea::new();
        area.set_hexpand(true);
        area.set_vexpand(true);
        let grid_draw = grid.clone();
        area.set_draw_func(move |_, ctx, w, h| {
            if let Err(e) = paint(ctx, &grid_draw.latest(Slot::Placeholder), w, h) {
                warn!("failed to draw grid: {}", e);
            }
        });
        window.set_child(Some(&area));

        let keys = EventControllerKey::new();
        let exit_key = exit_ui.clone();
        keys.connect_key_pressed(move |_, key, _, _| {
            if key == gdk::Key::q || key == gdk::Key::Q {
                info!("exit key pressed");
                exit_key.store(true, Ordering::Release);
                glib::Propagation::Stop
            } else {
                glib::Propagation::Proceed
            }
        });
        window.add_controller(keys);

        let exit_close = exit_ui.clone();
        window.connect_close_request(move |_| {
            exit_close.store(true, Ordering::Release);
            glib::Propagation::Proceed
        });

        let done_tick = done.clone();
        let app_tick = app.clone();
        let area_tick = area.clone();
        glib::timeout_add_local(REDRAW_INTERVAL, move || {
            if done_tick.load(Ordering::Acquire) {
                app_tick.quit();
                return glib::ControlFlow::Break;
            }
            area_tick.queue_draw();
            glib::ControlFlow::Continue
        });

        window.present();
    });

    app.run_with_args::<&str>(&[]);

    // Window gone: make sure the loop winds down, then surface its result.
    exit.store(true, Ordering::Release);
    match worker.join() {
        Ok(result) => result.map_err(Into::into),
        Err(_) => Err(anyhow!("display loop thread panicked")),
    }
}
