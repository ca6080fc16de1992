//! Foreground shutdown on Ctrl-C

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use log::info;

/// Install a Ctrl-C handler which raises the returned flag
pub fn setup_shutdown_signal() -> Result<Arc<AtomicBool>> {
    let shutdown_signal = Arc::new(AtomicBool::new(false));
    let signal_clone = Arc::clone(&shutdown_signal);

    ctrlc::set_handler(move || {
        signal_clone.store(true, Ordering::SeqCst);
        info!("Interrupt received, shutting down");
    })
    .context("failed to install Ctrl-C handler")?;

    Ok(shutdown_signal)
}
