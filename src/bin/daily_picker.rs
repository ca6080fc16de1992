use std::{
    sync::atomic::Ordering,
    thread,
    time::Duration,
};

use anyhow::{Context, Result};
use log::{error, info};
use timelapse_tools::{Config, DEFAULT_CONFIG_FILE, Scheduler, setup_shutdown_signal};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting daily picker");

    let config_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_owned());
    let config = Config::try_load(&config_file)
        .inspect_err(|e| error!("Invalid configuration: {e:#}"))?;
    info!(
        "Watching {} camera directories, copying to {} destinations, daily at {} for {}",
        config.camera_dirs.len(),
        config.destination_dirs.len(),
        config.run_at,
        config.target_times.join(", ")
    );

    let scheduler = Scheduler::from_config(&config)?;
    let shutdown_signal = setup_shutdown_signal()?;

    // Not joined, the scheduler ends with the process
    thread::Builder::new()
        .name("scheduler".to_owned())
        .spawn(move || scheduler.run_forever())
        .context("failed to start scheduler")?;

    while !shutdown_signal.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    info!("Stopped by user");
    Ok(())
}
