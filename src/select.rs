//! Nearest-timestamp photo selection
//!
//! For every requested time of day the photo whose modification time is
//! closest to it is picked from a camera's per-day directory. Only the
//! time-of-day part of the timestamps is compared.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone as _};
use log::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::{DATE_FORMAT, DATE_PLACEHOLDER};

/// Photo file in a per-day directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Full path to file
    pub path: PathBuf,
    /// Local modification timestamp
    pub modified: NaiveDateTime,
}

/// Location of the per-day directory inside a camera directory
#[derive(Debug, Clone)]
pub struct DayLayout {
    template: String,
}

impl DayLayout {
    pub fn new(template: &str) -> Result<Self> {
        if !template.contains(DATE_PLACEHOLDER) {
            bail!("day directory template must contain '{DATE_PLACEHOLDER}' but got '{template}'");
        }
        Ok(Self {
            template: template.to_owned(),
        })
    }

    /// Per-day directory of `source` for `date`
    pub fn resolve(&self, source: &Path, date: NaiveDate) -> PathBuf {
        let date = date.format(DATE_FORMAT).to_string();
        source.join(self.template.replace(DATE_PLACEHOLDER, &date))
    }
}

/// Picks the photos closest to a set of target times from a per-day directory
#[derive(Debug, Clone)]
pub struct Selector {
    extensions: HashSet<String>,
    layout: DayLayout,
}

impl Selector {
    pub fn new(extensions: &[String], day_dir: &str) -> Result<Self> {
        Ok(Self {
            extensions: build_extension_set(extensions)?,
            layout: DayLayout::new(day_dir)?,
        })
    }

    /// Per-day directory of `source` for `date`
    pub fn day_dir(&self, source: &Path, date: NaiveDate) -> PathBuf {
        self.layout.resolve(source, date)
    }

    /// Select one photo per target time from the per-day directory of `source`
    ///
    /// A per-day directory which does not exist (yet) yields no photos.
    pub fn select_for_day(
        &self,
        source: &Path,
        date: NaiveDate,
        targets: &[NaiveTime],
    ) -> Result<Vec<PathBuf>> {
        let day_dir = self.day_dir(source, date);
        if !day_dir.is_dir() {
            info!(
                "Directory {} not found for {}, it may not be created yet",
                day_dir.display(),
                date.format(DATE_FORMAT)
            );
            return Ok(Vec::new());
        }

        let candidates = self.candidates(&day_dir)?;
        debug!(
            "Found {} candidate photos in {}",
            candidates.len(),
            day_dir.display()
        );

        Ok(select_closest(&candidates, targets))
    }

    /// Photos directly in `dir`, ordered by modification time
    pub fn candidates(&self, dir: &Path) -> Result<Vec<Candidate>> {
        let mut candidates = Vec::new();

        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(e).with_context(|| format!("failed to read {}", dir.display()));
                }
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {e}", dir.display());
                    continue;
                }
            };

            if entry.file_type().is_dir() || !self.matches_extension(entry.path()) {
                continue;
            }

            match modified_local(&entry) {
                Ok(modified) => candidates.push(Candidate {
                    path: entry.into_path(),
                    modified,
                }),
                Err(e) => warn!("Skipping {}: {e:#}", entry.path().display()),
            }
        }

        candidates.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.path.cmp(&b.path)));
        Ok(candidates)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_ascii_lowercase()))
    }
}

/// Pick the closest candidate for each target, in target order
///
/// Targets without any candidate contribute nothing. Duplicate targets
/// select the same photo again.
pub fn select_closest(candidates: &[Candidate], targets: &[NaiveTime]) -> Vec<PathBuf> {
    targets
        .iter()
        .filter_map(|target| closest_to(candidates, *target))
        .map(|candidate| candidate.path.clone())
        .collect()
}

/// Candidate whose time of day is nearest to `target`
///
/// On a tie the earlier candidate in `candidates` wins.
pub fn closest_to(candidates: &[Candidate], target: NaiveTime) -> Option<&Candidate> {
    let mut closest: Option<(&Candidate, TimeDelta)> = None;

    for candidate in candidates {
        let diff = time_of_day_distance(candidate.modified.time(), target);
        match closest {
            Some((_, min_diff)) if diff >= min_diff => {}
            _ => closest = Some((candidate, diff)),
        }
    }

    closest.map(|(candidate, _)| candidate)
}

fn time_of_day_distance(a: NaiveTime, b: NaiveTime) -> TimeDelta {
    a.signed_duration_since(b).abs()
}

fn modified_local(entry: &walkdir::DirEntry) -> Result<NaiveDateTime> {
    let modified = entry
        .metadata()
        .context("failed to read metadata")?
        .modified()
        .context("modification time unavailable")?;
    local_time(modified)
}

/// Local wall-clock time of `time`
///
/// Fails instead of panicking for timestamps outside the supported range.
fn local_time(time: SystemTime) -> Result<NaiveDateTime> {
    let (secs, nanos) = match time.duration_since(UNIX_EPOCH) {
        Ok(after) => (i64::try_from(after.as_secs()).ok(), after.subsec_nanos()),
        Err(e) => {
            let before = e.duration();
            let secs = i64::try_from(before.as_secs()).ok().map(|s| -s);
            match before.subsec_nanos() {
                0 => (secs, 0),
                nanos => (secs.and_then(|s| s.checked_sub(1)), 1_000_000_000 - nanos),
            }
        }
    };

    let utc = secs
        .and_then(|secs| DateTime::from_timestamp(secs, nanos))
        .context("modification time out of range")?
        .naive_utc();
    let offset = Local.offset_from_utc_datetime(&utc).local_minus_utc();

    utc.checked_add_signed(TimeDelta::seconds(i64::from(offset)))
        .context("modification time out of range")
}

/// Build set of lowercase extensions to match
fn build_extension_set(extensions: &[String]) -> Result<HashSet<String>> {
    let mut exts = HashSet::new();

    for extension in extensions {
        if extension.contains('.') {
            bail!("extensions must not contain '.' but got '{extension}'");
        }
        exts.insert(extension.to_ascii_lowercase());
    }

    if exts.is_empty() {
        bail!("at least one extension is required");
    }

    Ok(exts)
}

#[cfg(test)]
mod tests {
    use std::{fs, time::Duration};

    use chrono::TimeZone as _;
    use tempfile::TempDir;

    use super::*;

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn candidate(name: &str, day: u32, h: u32, m: u32) -> Candidate {
        Candidate {
            path: PathBuf::from(name),
            modified: NaiveDate::from_ymd_opt(2024, 1, day)
                .unwrap()
                .and_time(at(h, m)),
        }
    }

    fn names(paths: &[PathBuf]) -> Vec<&str> {
        paths.iter().map(|p| p.to_str().unwrap()).collect()
    }

    fn touch(path: &Path, modified: NaiveDateTime) {
        fs::write(path, b"jpeg").unwrap();
        let modified = Local.from_local_datetime(&modified).earliest().unwrap();
        fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(modified.into())
            .unwrap();
    }

    fn selector() -> Selector {
        Selector::new(&["jpg".to_owned()], "{date}/images").unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    #[test]
    fn test_closest_per_target() {
        let candidates = vec![
            candidate("a.jpg", 15, 8, 58),
            candidate("b.jpg", 15, 11, 55),
            candidate("c.jpg", 15, 15, 40),
        ];

        let selected = select_closest(&candidates, &[at(9, 0), at(12, 0), at(15, 0)]);
        assert_eq!(names(&selected), ["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_duplicate_targets_select_same_photo() {
        let candidates = vec![
            candidate("a.jpg", 15, 8, 58),
            candidate("b.jpg", 15, 11, 55),
        ];

        let selected = select_closest(&candidates, &[at(9, 0), at(9, 0)]);
        assert_eq!(names(&selected), ["a.jpg", "a.jpg"]);
    }

    #[test]
    fn test_tie_resolves_to_earlier_candidate() {
        let candidates = vec![
            candidate("before.jpg", 15, 11, 50),
            candidate("after.jpg", 15, 12, 10),
        ];

        assert_eq!(
            closest_to(&candidates, at(12, 0)).unwrap().path,
            PathBuf::from("before.jpg")
        );
    }

    #[test]
    fn test_equidistant_photo_selected_for_both_targets() {
        let candidates = vec![candidate("noon.jpg", 15, 12, 0)];

        let selected = select_closest(&candidates, &[at(11, 0), at(13, 0)]);
        assert_eq!(names(&selected), ["noon.jpg", "noon.jpg"]);
    }

    #[test]
    fn test_only_time_of_day_is_compared() {
        let candidates = vec![
            candidate("yesterday.jpg", 14, 9, 1),
            candidate("today.jpg", 15, 10, 0),
        ];

        assert_eq!(
            closest_to(&candidates, at(9, 0)).unwrap().path,
            PathBuf::from("yesterday.jpg")
        );
    }

    #[test]
    fn test_no_candidates_no_selection() {
        assert!(select_closest(&[], &[at(9, 0), at(12, 0)]).is_empty());
    }

    #[test]
    fn test_day_layout() {
        let layout = DayLayout::new("{date}/images").unwrap();
        assert_eq!(
            layout.resolve(Path::new("/cam1"), day()),
            PathBuf::from("/cam1/20240115/images")
        );

        let flat = DayLayout::new("{date}").unwrap();
        assert_eq!(
            flat.resolve(Path::new("/cam1"), day()),
            PathBuf::from("/cam1/20240115")
        );

        assert!(DayLayout::new("images").is_err());
    }

    #[test]
    fn test_extension_set() {
        assert!(Selector::new(&[".jpg".to_owned()], "{date}").is_err());
        assert!(Selector::new(&[], "{date}").is_err());
    }

    #[test]
    fn test_missing_day_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();

        let selected = selector()
            .select_for_day(temp_dir.path(), day(), &[at(9, 0)])
            .unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_empty_day_dir_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        fs::create_dir_all(temp_dir.path().join("20240115/images")).unwrap();

        let selected = selector()
            .select_for_day(temp_dir.path(), day(), &[at(9, 0)])
            .unwrap();
        assert!(selected.is_empty());
    }

    #[test]
    fn test_local_time_out_of_range() {
        let far_future = UNIX_EPOCH + Duration::from_secs(9_000_000_000_000);
        assert!(local_time(far_future).is_err());

        let noon = Local
            .from_local_datetime(&day().and_time(at(12, 0)))
            .earliest()
            .unwrap();
        assert_eq!(local_time(noon.into()).unwrap(), day().and_time(at(12, 0)));

        let before_epoch = UNIX_EPOCH - Duration::from_millis(1_500);
        let expected = DateTime::from_timestamp(-2, 500_000_000)
            .unwrap()
            .with_timezone(&Local)
            .naive_local();
        assert_eq!(local_time(before_epoch).unwrap(), expected);
    }

    #[test]
    fn test_select_for_day_from_mtimes() {
        let temp_dir = TempDir::new().unwrap();
        let images = temp_dir.path().join("20240115/images");
        fs::create_dir_all(&images).unwrap();

        touch(&images.join("c.jpg"), day().and_time(at(15, 40)));
        touch(&images.join("a.JPG"), day().and_time(at(8, 58)));
        touch(&images.join("b.jpg"), day().and_time(at(11, 55)));
        touch(&images.join("notes.txt"), day().and_time(at(9, 0)));
        fs::create_dir(images.join("thumbs.jpg")).unwrap();

        let candidates = selector().candidates(&images).unwrap();
        let order: Vec<_> = candidates
            .iter()
            .map(|c| c.path.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(order, ["a.JPG", "b.jpg", "c.jpg"]);

        let selected = selector()
            .select_for_day(temp_dir.path(), day(), &[at(9, 0), at(12, 0), at(15, 0)])
            .unwrap();
        assert_eq!(
            selected,
            vec![images.join("a.JPG"), images.join("b.jpg"), images.join("c.jpg")]
        );
    }
}
