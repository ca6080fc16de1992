//! Daily scheduling loop
//!
//! The scheduler alternates between waiting for the next occurrence of
//! the configured run time and running the [Orchestrator] for the date
//! at which the run fires. The next occurrence is only computed after a
//! run has finished, so runs never overlap.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    thread,
    time::Duration,
};

use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone as _};
use log::{debug, error, info};

use crate::{
    config::{Config, DATE_FORMAT},
    orchestrate::{DayReport, Orchestrator},
};

/// Upper bound for a single sleep while waiting for the next run
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// Runs the [Orchestrator] once per day at a fixed time of day
#[derive(Debug)]
pub struct Scheduler {
    orchestrator: Orchestrator,
    run_at: NaiveTime,
    targets: Vec<NaiveTime>,
    run_on_start: bool,
}

impl Scheduler {
    pub fn new(orchestrator: Orchestrator, run_at: NaiveTime, targets: Vec<NaiveTime>) -> Self {
        Self {
            orchestrator,
            run_at,
            targets,
            run_on_start: false,
        }
    }

    /// Build a scheduler according to the [Config]
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut scheduler = Self::new(
            Orchestrator::from_config(config)?,
            config.run_at()?,
            config.target_times()?,
        );
        scheduler.run_on_start = config.run_on_start;
        Ok(scheduler)
    }

    /// Wait for and perform daily runs for the lifetime of the process
    pub fn run_forever(&self) {
        if self.run_on_start {
            self.run_once(Local::now().date_naive());
        }

        loop {
            let now = Local::now();
            let next = resolve_local(next_run(now.naive_local(), self.run_at));
            let wait = (next - now).to_std().unwrap_or_default();
            info!(
                "Next run at {} (in {:.2} hours)",
                next.format("%Y-%m-%d %H:%M"),
                wait.as_secs_f64() / 3600.0
            );

            sleep_until(next);

            // The date may have changed while sleeping
            self.run_once(Local::now().date_naive());
        }
    }

    /// Process `date` and log the outcome
    ///
    /// Errors and panics are contained here so the loop always carries on.
    pub fn run_once(&self, date: NaiveDate) -> Option<DayReport> {
        run_contained(date, || self.orchestrator.process_day(date, &self.targets))
    }
}

/// Perform the run for `date`, logging a panic instead of unwinding
fn run_contained(date: NaiveDate, run: impl FnOnce() -> DayReport) -> Option<DayReport> {
    let day = date.format(DATE_FORMAT);
    info!("Starting run for {day}");

    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(report) => {
            info!("Processing finished for {report}");
            Some(report)
        }
        Err(payload) => {
            error!("Run for {day} failed: {}", panic_message(&*payload));
            None
        }
    }
}

/// Next occurrence of `run_at` strictly after `now`
pub fn next_run(now: NaiveDateTime, run_at: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(run_at);
    if now < today {
        today
    } else {
        today + TimeDelta::days(1)
    }
}

/// Map a local wall-clock time onto an instant
///
/// Ambiguous times resolve to the earlier instant, times inside a
/// daylight saving gap are moved forward by one hour.
fn resolve_local(naive: NaiveDateTime) -> DateTime<Local> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| {
            Local
                .from_local_datetime(&(naive + TimeDelta::hours(1)))
                .earliest()
        })
        .unwrap_or_else(|| Local::now() + TimeDelta::hours(1))
}

/// Block the current thread until `deadline` has passed
///
/// Sleeps in bounded slices so wall-clock changes and system suspend
/// do not push the run past its deadline.
fn sleep_until(deadline: DateTime<Local>) {
    loop {
        let remaining = match (deadline - Local::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => break,
        };
        debug!("Sleeping, {}s until next run", remaining.as_secs());
        thread::sleep(remaining.min(MAX_SLEEP));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
