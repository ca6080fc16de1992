pub mod config;
pub mod orchestrate;
pub mod schedule;
pub mod select;
pub mod signal;
pub mod transfer;

pub use config::{Config, DATE_FORMAT, DEFAULT_CONFIG_FILE, parse_time_of_day};
pub use orchestrate::{DayReport, Orchestrator, Selection};
pub use schedule::{Scheduler, next_run};
pub use select::{Candidate, DayLayout, Selector, closest_to, select_closest};
pub use signal::setup_shutdown_signal;
pub use transfer::{Transfer, TransferReport, copy_preserving_metadata};
