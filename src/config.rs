//! Daily picker configuration
//!
//! Values are layered: built-in defaults, an optional toml file and
//! finally environment variables. List values may be given either as
//! arrays or as a single comma-separated string, which is how the
//! `CAMERA_DIRS` and `DESTINATION_DIRS` variables are usually set.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::NaiveTime;
use figment::{
    Figment,
    providers::{Env, Format as _, Serialized, Toml},
};
use serde::{Deserialize, Deserializer, Serialize};

/// Format of the per-day directory names, e.g. `20240115`
pub const DATE_FORMAT: &str = "%Y%m%d";

/// Configuration file looked up when none is given on the command line
pub const DEFAULT_CONFIG_FILE: &str = "timelapse.toml";

/// Placeholder substituted with the formatted date in `day_dir`
pub const DATE_PLACEHOLDER: &str = "{date}";

const TIME_FORMAT: &str = "%H:%M";
const ENV_PREFIX: &str = "TIMELAPSE_";

/// Daily picker configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Camera capture directories, each holding one directory per day
    #[serde(deserialize_with = "list_or_csv")]
    pub camera_dirs: Vec<PathBuf>,
    /// Directories the selected photos are copied into
    #[serde(deserialize_with = "list_or_csv")]
    pub destination_dirs: Vec<PathBuf>,
    /// Daily run time as `HH:MM`
    pub run_at: String,
    /// Times of day to pick photos for, as `HH:MM`
    #[serde(deserialize_with = "list_or_csv")]
    pub target_times: Vec<String>,
    /// Per-day directory relative to a camera directory
    pub day_dir: String,
    /// Photo file extensions without the leading dot
    #[serde(deserialize_with = "list_or_csv")]
    pub extensions: Vec<String>,
    /// Run once for the current date right after startup
    pub run_on_start: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            camera_dirs: Vec::new(),
            destination_dirs: Vec::new(),
            run_at: "23:00".to_owned(),
            target_times: vec!["09:00".to_owned(), "12:00".to_owned(), "15:00".to_owned()],
            day_dir: format!("{DATE_PLACEHOLDER}/images"),
            extensions: vec!["jpg".to_owned()],
            run_on_start: false,
        }
    }
}

impl Config {
    /// Try loading the configuration from a toml file and the environment
    ///
    /// A missing file is not an error, the environment alone may carry
    /// a complete configuration.
    pub fn try_load(toml: &str) -> Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(toml))
                .merge(Env::raw().only(&["camera_dirs", "destination_dirs"]))
                .merge(Env::prefixed(ENV_PREFIX)),
        )
    }

    /// Extract and validate a configuration from `figment`
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.camera_dirs.is_empty() {
            bail!("no camera directories configured");
        }
        if self.destination_dirs.is_empty() {
            bail!("no destination directories configured");
        }
        if !self.day_dir.contains(DATE_PLACEHOLDER) {
            bail!(
                "day_dir must contain '{DATE_PLACEHOLDER}' but got '{}'",
                self.day_dir
            );
        }
        self.run_at()?;
        if self.target_times()?.is_empty() {
            bail!("no target times configured");
        }
        Ok(())
    }

    /// Parsed daily run time
    pub fn run_at(&self) -> Result<NaiveTime> {
        parse_time_of_day(&self.run_at).context("invalid run_at")
    }

    /// Parsed target times, in configured order and including duplicates
    pub fn target_times(&self) -> Result<Vec<NaiveTime>> {
        self.target_times
            .iter()
            .map(|t| parse_time_of_day(t).context("invalid target time"))
            .collect()
    }
}

/// Parse a `HH:MM` time of day on a 24h clock
pub fn parse_time_of_day(value: &str) -> Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), TIME_FORMAT)
        .with_context(|| format!("expected HH:MM but got '{value}'"))
}

fn list_or_csv<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: From<String>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ListOrCsv {
        List(Vec<String>),
        Csv(String),
    }

    let items = match ListOrCsv::deserialize(deserializer)? {
        ListOrCsv::List(items) => items,
        ListOrCsv::Csv(csv) => csv.split(',').map(str::to_owned).collect(),
    };

    Ok(items
        .into_iter()
        .map(|item| item.trim().to_owned())
        .filter(|item| !item.is_empty())
        .map(T::from)
        .collect())
}
