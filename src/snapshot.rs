use crate::error::Result;
use crate::models::{AvailabilityStatus, PerfRow};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A change to one performance between two snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceChange {
    pub show_name: String,
    pub show_url: String,
    pub performer: String,
    pub venue: String,
    pub date: String,
    pub time: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

/// A show appearing in or disappearing from the schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowChange {
    pub show_name: String,
    pub show_url: String,
    pub performer: String,
    pub performance_count: usize,
    pub venues: Vec<String>,
    pub date_range: String,
}

/// Categorized differences between two snapshots of the performance table.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    pub old_snapshot_date: String,
    pub new_snapshot_date: String,
    pub new_shows: Vec<ShowChange>,
    pub removed_shows: Vec<ShowChange>,
    pub new_performances: Vec<PerformanceChange>,
    pub sold_out_performances: Vec<PerformanceChange>,
    pub cancelled_performances: Vec<PerformanceChange>,
    pub back_available: Vec<PerformanceChange>,
    pub other_changes: Vec<PerformanceChange>,
}

impl SnapshotDiff {
    pub fn has_changes(&self) -> bool {
        self.total_changes() > 0
    }

    pub fn total_changes(&self) -> usize {
        self.new_shows.len()
            + self.removed_shows.len()
            + self.new_performances.len()
            + self.sold_out_performances.len()
            + self.cancelled_performances.len()
            + self.back_available.len()
            + self.other_changes.len()
    }
}

static SNAPSHOT_DAY_MONTH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})\s+([A-Za-z]+)").unwrap());

/// Order raw listing dates by their parsed calendar value so "9 August" sorts
/// before "10 August"; unparsable strings fall back to lexicographic order.
fn date_sort_key(raw: &str) -> (Option<NaiveDate>, String) {
    let parsed = SNAPSHOT_DAY_MONTH_RE.captures(raw.trim()).and_then(|c| {
        let full = format!("{} {} 2000", c.get(1)?.as_str(), c.get(2)?.as_str());
        NaiveDate::parse_from_str(&full, "%d %B %Y").ok()
    });
    (parsed, raw.to_string())
}

fn format_date_range(dates: &[String]) -> String {
    if dates.is_empty() {
        return String::new();
    }
    let min = dates
        .iter()
        .min_by_key(|d| date_sort_key(d.as_str()))
        .cloned()
        .unwrap_or_default();
    let max = dates
        .iter()
        .max_by_key(|d| date_sort_key(d.as_str()))
        .cloned()
        .unwrap_or_default();
    format!("{} - {}", min, max)
}

fn extract_snapshot_date(rows: &[PerfRow]) -> String {
    for row in rows {
        let raw = row.scrape_time.trim();
        if raw.is_empty() {
            continue;
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
            return dt.format("%Y-%m-%d %H:%M").to_string();
        }
        break;
    }
    "Unknown".to_string()
}

fn change_from_row(row: &PerfRow) -> PerformanceChange {
    PerformanceChange {
        show_name: row.show_name.clone(),
        show_url: row.show_url.clone(),
        performer: row.performer.clone(),
        venue: row.location.clone(),
        date: row.date.clone(),
        time: row.performance_time.clone(),
        old_value: None,
        new_value: None,
    }
}

/// Compare two time-ordered snapshots of the performance table. Pure function
/// of its inputs; safe to re-run.
pub fn compare_snapshots(old: &[PerfRow], new: &[PerfRow]) -> SnapshotDiff {
    let mut diff = SnapshotDiff {
        old_snapshot_date: extract_snapshot_date(old),
        new_snapshot_date: extract_snapshot_date(new),
        ..Default::default()
    };

    // First occurrence wins for key lookups
    let mut old_by_key: std::collections::HashMap<String, &PerfRow> =
        std::collections::HashMap::new();
    for row in old {
        old_by_key.entry(row.perf_key()).or_insert(row);
    }

    let old_shows: HashSet<&str> = old
        .iter()
        .map(|r| r.show_url.as_str())
        .filter(|url| !url.is_empty())
        .collect();
    let new_shows: HashSet<&str> = new
        .iter()
        .map(|r| r.show_url.as_str())
        .filter(|url| !url.is_empty())
        .collect();

    let mut added_shows: Vec<&str> = new_shows.difference(&old_shows).copied().collect();
    added_shows.sort_unstable();
    let mut removed_shows: Vec<&str> = old_shows.difference(&new_shows).copied().collect();
    removed_shows.sort_unstable();
    let added_show_set: HashSet<&str> = added_shows.iter().copied().collect();

    for show_url in &added_shows {
        let show_rows: Vec<&PerfRow> = new.iter().filter(|r| r.show_url == *show_url).collect();
        let first = match show_rows.first() {
            Some(row) => row,
            None => continue,
        };

        let mut venues: Vec<String> = Vec::new();
        let mut dates: Vec<String> = Vec::new();
        for row in &show_rows {
            if !row.location.is_empty() && !venues.contains(&row.location) {
                venues.push(row.location.clone());
            }
            if !row.date.is_empty() && !dates.contains(&row.date) {
                dates.push(row.date.clone());
            }
        }
        venues.truncate(3);

        diff.new_shows.push(ShowChange {
            show_name: first.show_name.clone(),
            show_url: show_url.to_string(),
            performer: first.performer.clone(),
            performance_count: show_rows.len(),
            venues,
            date_range: format_date_range(&dates),
        });
    }

    for show_url in &removed_shows {
        let show_rows: Vec<&PerfRow> = old.iter().filter(|r| r.show_url == *show_url).collect();
        let first = match show_rows.first() {
            Some(row) => row,
            None => continue,
        };
        diff.removed_shows.push(ShowChange {
            show_name: first.show_name.clone(),
            show_url: show_url.to_string(),
            performer: first.performer.clone(),
            performance_count: show_rows.len(),
            venues: Vec::new(),
            date_range: String::new(),
        });
    }

    // New performances for existing shows; performances of a brand-new show
    // are already counted under new_shows.
    let mut seen_new_keys: HashSet<String> = HashSet::new();
    for row in new {
        let key = row.perf_key();
        if old_by_key.contains_key(&key) || !seen_new_keys.insert(key) {
            continue;
        }
        if added_show_set.contains(row.show_url.as_str()) {
            continue;
        }
        diff.new_performances.push(change_from_row(row));
    }

    // Availability changes for performances present in both snapshots
    let mut seen_common_keys: HashSet<String> = HashSet::new();
    for row in new {
        let key = row.perf_key();
        let old_row = match old_by_key.get(&key) {
            Some(old_row) => *old_row,
            None => continue,
        };
        if !seen_common_keys.insert(key) {
            continue;
        }

        let old_avail = old_row.availability.to_uppercase();
        let new_avail = row.availability.to_uppercase();
        if old_avail == new_avail {
            continue;
        }

        let mut change = change_from_row(row);
        change.old_value = Some(old_avail.clone());
        change.new_value = Some(new_avail.clone());

        let old_status = AvailabilityStatus::from_label(&old_avail);
        let new_status = AvailabilityStatus::from_label(&new_avail);

        if new_status.is_sold_out() {
            diff.sold_out_performances.push(change);
        } else if new_status == AvailabilityStatus::Cancelled {
            diff.cancelled_performances.push(change);
        } else if old_status.is_unavailable() {
            diff.back_available.push(change);
        } else {
            diff.other_changes.push(change);
        }
    }

    info!(
        "Comparison complete: {} new shows, {} new performances, {} sold out",
        diff.new_shows.len(),
        diff.new_performances.len(),
        diff.sold_out_performances.len()
    );

    diff
}

/// Path for one run's snapshot file: dated, labeled with the merge mode, and
/// suffixed `snapshot` or `show-info`.
pub fn snapshot_path(dir: impl AsRef<Path>, date: &str, mode: &str, suffix: &str) -> PathBuf {
    dir.as_ref().join(format!("{}-{}-{}.csv", date, mode, suffix))
}

/// Find the most recent snapshot file, optionally excluding a date (normally
/// today's, so a rerun compares against yesterday).
pub fn find_latest_snapshot(
    snapshot_dir: impl AsRef<Path>,
    exclude_date: Option<&str>,
) -> Option<PathBuf> {
    let snapshot_dir = snapshot_dir.as_ref();
    if !snapshot_dir.exists() {
        return None;
    }

    let mut names: Vec<String> = fs::read_dir(snapshot_dir)
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with("-snapshot.csv"))
        .collect();
    names.sort_unstable_by(|a, b| b.cmp(a));

    for name in names {
        if let Some(exclude) = exclude_date {
            if name.contains(exclude) {
                continue;
            }
        }
        debug!("Latest prior snapshot: {}", name);
        return Some(snapshot_dir.join(name));
    }
    None
}

/// Load a snapshot file.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Vec<PerfRow>> {
    info!("Loading snapshot: {}", path.as_ref().display());
    crate::store::load_table(path)
}
