//! Copying selected photos into destination directories

use std::{
    fmt, fs,
    ops::AddAssign,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use log::{error, info, warn};

/// Outcome of a transfer
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    /// Photos copied, counted once per destination
    pub copied: usize,
    /// Failed copies, counted once per destination, including copies
    /// written without their original timestamps
    pub failed: usize,
    /// Destinations skipped because they were unavailable
    pub skipped_destinations: usize,
}

impl AddAssign for TransferReport {
    fn add_assign(&mut self, other: Self) {
        self.copied += other.copied;
        self.failed += other.failed;
        self.skipped_destinations += other.skipped_destinations;
    }
}

impl fmt::Display for TransferReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} copied, {} failed, {} destinations skipped",
            self.copied, self.failed, self.skipped_destinations
        )
    }
}

/// Copies photos into every configured destination directory
#[derive(Debug, Clone)]
pub struct Transfer {
    destinations: Vec<PathBuf>,
}

impl Transfer {
    pub fn new(destinations: Vec<PathBuf>) -> Self {
        Self { destinations }
    }

    /// Copy `photos` into each reachable destination
    ///
    /// Unavailable destinations and failing copies are logged and skipped,
    /// everything else is still attempted.
    pub fn copy_photos(&self, photos: &[PathBuf]) -> TransferReport {
        let mut report = TransferReport::default();

        for destination in &self.destinations {
            if !destination.is_dir() {
                // Not mounted or not created
                warn!(
                    "Destination {} is unavailable, skipping",
                    destination.display()
                );
                report.skipped_destinations += 1;
                continue;
            }

            for photo in photos {
                match copy_preserving_metadata(photo, destination) {
                    Ok(target) => {
                        info!("Copied {} to {}", photo.display(), target.display());
                        report.copied += 1;
                    }
                    Err(e) => {
                        error!(
                            "Failed to copy {} to {}: {e:#}",
                            photo.display(),
                            destination.display()
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        report
    }
}

/// Copy `source` into `dir` under the same file name
///
/// Permissions are carried over by the copy, access and modification
/// times are restored afterwards. An existing file is overwritten.
pub fn copy_preserving_metadata(source: &Path, dir: &Path) -> Result<PathBuf> {
    let file_name = source
        .file_name()
        .with_context(|| format!("{} has no file name", source.display()))?;
    let target = dir.join(file_name);

    fs::copy(source, &target)
        .with_context(|| format!("failed to copy {}", source.display()))?;

    let metadata = fs::metadata(source)
        .with_context(|| format!("failed to read metadata of {}", source.display()))?;
    let times = fs::FileTimes::new()
        .set_accessed(
            metadata
                .accessed()
                .with_context(|| format!("access time of {} unavailable", source.display()))?,
        )
        .set_modified(
            metadata
                .modified()
                .with_context(|| format!("modification time of {} unavailable", source.display()))?,
        );

    // The copy may already carry read-only permissions
    fs::File::open(&target)
        .and_then(|file| file.set_times(times))
        .with_context(|| {
            format!(
                "copied to {} but failed to restore its timestamps",
                target.display()
            )
        })?;

    Ok(target)
}
