//! Daily processing across all camera directories

use std::{fmt, path::PathBuf};

use anyhow::Result;
use chrono::{NaiveDate, NaiveTime};
use log::{error, info};

use crate::{
    config::{Config, DATE_FORMAT},
    select::Selector,
    transfer::{Transfer, TransferReport},
};

/// Photos selected from one camera directory for one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub source: PathBuf,
    pub photos: Vec<PathBuf>,
    /// The camera directory could not be read, `photos` is empty
    pub failed: bool,
}

/// Outcome of processing one day
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayReport {
    pub date: NaiveDate,
    /// Camera directories with at least one selected photo
    pub sources_with_photos: usize,
    /// Camera directories without any photo for the day
    pub sources_without_photos: usize,
    /// Camera directories which could not be read
    pub failed_sources: usize,
    pub transfer: TransferReport,
}

impl DayReport {
    fn new(date: NaiveDate) -> Self {
        Self {
            date,
            sources_with_photos: 0,
            sources_without_photos: 0,
            failed_sources: 0,
            transfer: TransferReport::default(),
        }
    }
}

impl fmt::Display for DayReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} cameras with photos, {} without, {} failed; {}",
            self.date.format(DATE_FORMAT),
            self.sources_with_photos,
            self.sources_without_photos,
            self.failed_sources,
            self.transfer
        )
    }
}

/// Selects photos from every camera directory and hands them to [Transfer]
#[derive(Debug, Clone)]
pub struct Orchestrator {
    sources: Vec<PathBuf>,
    selector: Selector,
    transfer: Transfer,
}

impl Orchestrator {
    pub fn new(sources: Vec<PathBuf>, selector: Selector, transfer: Transfer) -> Self {
        Self {
            sources,
            selector,
            transfer,
        }
    }

    /// Build an orchestrator according to the [Config]
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.camera_dirs.clone(),
            Selector::new(&config.extensions, &config.day_dir)?,
            Transfer::new(config.destination_dirs.clone()),
        ))
    }

    /// Select the photos of `date` from every camera directory
    ///
    /// Every camera directory is listed in order. One which fails to be
    /// read is logged and marked as failed with no photos.
    pub fn select_day(&self, date: NaiveDate, targets: &[NaiveTime]) -> Vec<Selection> {
        self.sources
            .iter()
            .map(|source| match self.selector.select_for_day(source, date, targets) {
                Ok(photos) => Selection {
                    source: source.clone(),
                    photos,
                    failed: false,
                },
                Err(e) => {
                    error!("Failed to select photos from {}: {e:#}", source.display());
                    Selection {
                        source: source.clone(),
                        photos: Vec::new(),
                        failed: true,
                    }
                }
            })
            .collect()
    }

    /// Select and copy the photos of `date` for every camera directory
    ///
    /// A failing camera directory never stops the remaining ones.
    pub fn process_day(&self, date: NaiveDate, targets: &[NaiveTime]) -> DayReport {
        let selections = self.select_day(date, targets);
        self.transfer_selections(date, &selections)
    }

    /// Hand every non-empty selection to [Transfer]
    pub fn transfer_selections(&self, date: NaiveDate, selections: &[Selection]) -> DayReport {
        let mut report = DayReport::new(date);
        let day = date.format(DATE_FORMAT);

        for selection in selections {
            let source = selection.source.display();

            if selection.failed {
                report.failed_sources += 1;
                continue;
            }

            if selection.photos.is_empty() {
                info!("No photos found for camera {source} on {day}");
                report.sources_without_photos += 1;
                continue;
            }

            info!(
                "Found {} photos for camera {source} on {day}",
                selection.photos.len()
            );
            report.sources_with_photos += 1;
            report.transfer += self.transfer.copy_photos(&selection.photos);
        }

        report
    }
}
