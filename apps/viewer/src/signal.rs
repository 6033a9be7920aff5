use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};

/// Ctrl-C handling shared between setup and the display loop.
#[derive(Clone)]
pub struct Interrupts {
    exit: Arc<AtomicBool>,
    in_setup: Arc<AtomicBool>,
}

impl Interrupts {
    pub fn exit_flag(&self) -> Arc<AtomicBool> {
        self.exit.clone()
    }

    pub fn enter_setup(&self) {
        self.in_setup.store(true, Ordering::Release);
    }

    pub fn leave_setup(&self) {
        self.in_setup.store(false, Ordering::Release);
    }
}

/// Waits for Ctrl-C on a helper thread. During setup an interrupt exits at
/// once; afterwards the first one raises the exit flag and a second one exits.
pub fn install() -> Result<Interrupts> {
    let interrupts = Interrupts {
        exit: Arc::new(AtomicBool::new(false)),
        in_setup: Arc::new(AtomicBool::new(false)),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build signal runtime")?;

    let watched = interrupts.clone();
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    if let Err(e) = signal::ctrl_c().await {
                        error!("failed to listen for Ctrl-C: {}", e);
                        return;
                    }
                    if watched.in_setup.load(Ordering::Acquire) {
                        eprintln!("\nKeyboardInterrupt, exiting...");
                        process::exit(1);
                    }
                    if watched.exit.swap(true, Ordering::AcqRel) {
                        warn!("second interrupt, exiting immediately");
                        process::exit(1);
                    }
                    info!("🛑 interrupt received, shutting down");
                }
            });
        })
        .context("failed to spawn signal thread")?;

    Ok(interrupts)
}
