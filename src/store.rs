use crate::error::Result;
use crate::models::{PerfRow, ScrapedShow, ShowInfo, VenueInfo};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Load a CSV table into typed rows. A missing file is an empty table;
/// columns absent from the file deserialize as empty strings.
pub fn load_table<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<Vec<T>> {
    let path = path.as_ref();
    if !path.exists() {
        debug!("No table at {}, starting empty", path.display());
        return Ok(Vec::new());
    }

    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let mut rows = Vec::new();
    for record in reader.deserialize() {
        rows.push(record?);
    }
    info!("Loaded {} rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Write a CSV table, creating parent directories as needed. The whole file
/// is rewritten; there is no incremental write.
pub fn save_table<T: Serialize>(rows: &[T], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Saved {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write a CSV table that may be empty, still emitting the header row so an
/// empty table round-trips with its schema.
pub fn save_table_with_headers<T: Serialize + Default>(
    rows: &[T],
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    if rows.is_empty() {
        // The csv writer only emits headers on the first serialized row, so
        // recover them from a throwaway default row.
        let mut buf = csv::Writer::from_writer(Vec::new());
        buf.serialize(T::default())?;
        let data = String::from_utf8(
            buf.into_inner()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?,
        )
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let header = data.lines().next().unwrap_or_default();
        fs::write(path, format!("{}\n", header))?;
        return Ok(());
    }

    let mut writer = csv::Writer::from_path(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

fn sort_key(field: &str) -> (bool, String) {
    // Empty sort keys order last
    (field.is_empty(), field.to_string())
}

/// Deterministic ordering for stable diffs and stable file output.
fn sort_performances(rows: &mut [PerfRow]) {
    rows.sort_by_cached_key(|r| {
        (
            sort_key(&r.genre),
            sort_key(&r.show_url),
            sort_key(&r.date),
            sort_key(&r.performance_time),
        )
    });
}

/// Merge freshly scraped performance rows into the canonical table.
///
/// In full mode the new batch is the complete truth for every genre it
/// contains: all existing rows of those genres are dropped. In recent mode
/// only rows whose composite key is re-observed are replaced; nothing is
/// implicitly deleted.
pub fn merge_performances(
    existing: Vec<PerfRow>,
    new_batch: Vec<PerfRow>,
    full_mode: bool,
) -> Vec<PerfRow> {
    if new_batch.is_empty() {
        return existing;
    }

    let mut merged: Vec<PerfRow> = if full_mode {
        let new_genres: HashSet<&str> = new_batch.iter().map(|r| r.genre.as_str()).collect();
        existing
            .into_iter()
            .filter(|r| !new_genres.contains(r.genre.as_str()))
            .collect()
    } else {
        let new_keys: HashSet<String> = new_batch.iter().map(|r| r.perf_key()).collect();
        existing
            .into_iter()
            .filter(|r| !new_keys.contains(&r.perf_key()))
            .collect()
    };

    merged.extend(new_batch);
    sort_performances(&mut merged);
    merged
}

/// Merge freshly scraped show metadata into the canonical show-info table.
/// Always an upsert by show URL; never deletes.
pub fn merge_show_info(existing: Vec<ShowInfo>, new_batch: Vec<ShowInfo>) -> Vec<ShowInfo> {
    if new_batch.is_empty() {
        return existing;
    }

    let new_urls: HashSet<&str> = new_batch.iter().map(|r| r.show_url.as_str()).collect();
    let mut merged: Vec<ShowInfo> = existing
        .into_iter()
        .filter(|r| !new_urls.contains(r.show_url.as_str()))
        .collect();
    merged.extend(new_batch);
    merged.sort_by_cached_key(|r| sort_key(&r.show_url));
    merged
}

/// Show-info rows from one run's scraped shows; shows without metadata are
/// skipped.
pub fn show_info_from_shows(shows: &[ScrapedShow]) -> Vec<ShowInfo> {
    shows
        .iter()
        .filter_map(|show| show.show_info.clone())
        .collect()
}

/// Unique venues observed in one run's scraped shows, keyed by venue code.
/// Venues with an empty code are uncacheable and skipped.
pub fn collect_venues(shows: &[ScrapedShow]) -> HashMap<String, VenueInfo> {
    let mut venues = HashMap::new();
    for show in shows {
        if let Some(venue) = &show.venue_info {
            if !venue.venue_code.is_empty() {
                venues
                    .entry(venue.venue_code.clone())
                    .or_insert_with(|| venue.clone());
            }
        }
    }
    venues
}

/// Load the long-lived venue cache. Codes with empty strings are never cached.
pub fn load_venue_cache(path: impl AsRef<Path>) -> Result<HashMap<String, VenueInfo>> {
    let rows: Vec<VenueInfo> = load_table(path)?;
    Ok(rows
        .into_iter()
        .filter(|v| !v.venue_code.is_empty())
        .map(|v| (v.venue_code.clone(), v))
        .collect())
}

/// Persist the venue cache in venue-code order.
pub fn save_venue_cache(venues: &HashMap<String, VenueInfo>, path: impl AsRef<Path>) -> Result<()> {
    let mut rows: Vec<VenueInfo> = venues.values().cloned().collect();
    rows.sort_by(|a, b| a.venue_code.cmp(&b.venue_code));
    save_table_with_headers(&rows, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn perf(url: &str, date: &str, time: &str, genre: &str) -> PerfRow {
        PerfRow {
            show_url: url.to_string(),
            date: date.to_string(),
            performance_time: time.to_string(),
            genre: genre.to_string(),
            ..Default::default()
        }
    }

    fn perf_with_availability(
        url: &str,
        date: &str,
        time: &str,
        genre: &str,
        availability: &str,
    ) -> PerfRow {
        PerfRow {
            availability: availability.to_string(),
            ..perf(url, date, time, genre)
        }
    }

    #[test]
    fn test_merge_into_empty() {
        let result = merge_performances(
            Vec::new(),
            vec![perf("/a", "Monday 1 August", "14:00", "COMEDY")],
            false,
        );
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].show_url, "/a");
    }

    #[test]
    fn test_new_keys_preserved() {
        let existing = vec![perf("/a", "Monday 1 August", "14:00", "COMEDY")];
        let new = vec![perf("/b", "Tuesday 2 August", "15:00", "COMEDY")];
        let result = merge_performances(existing, new, false);
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_matching_keys_overwritten() {
        let existing = vec![perf_with_availability(
            "/a",
            "Monday 1 August",
            "14:00",
            "COMEDY",
            "TICKETS_AVAILABLE",
        )];
        let new = vec![perf_with_availability(
            "/a",
            "Monday 1 August",
            "14:00",
            "COMEDY",
            "SOLD_OUT",
        )];
        let result = merge_performances(existing, new, false);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].availability, "SOLD_OUT");
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let existing = vec![
            perf("/a", "Monday 1 August", "14:00", "COMEDY"),
            perf("/b", "Monday 1 August", "15:00", "THEATRE"),
        ];
        let new = vec![perf("/a", "Monday 1 August", "14:00", "COMEDY")];
        let once = merge_performances(existing, new.clone(), false);
        let twice = merge_performances(once.clone(), new, false);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_full_mode_replaces_genre() {
        let existing = vec![
            perf("/a", "Monday 1 August", "14:00", "COMEDY"),
            perf("/b", "Monday 1 August", "15:00", "COMEDY"),
        ];
        let new = vec![perf("/c", "Wednesday 3 August", "16:00", "COMEDY")];
        let result = merge_performances(existing, new, true);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].show_url, "/c");
    }

    #[test]
    fn test_full_mode_preserves_other_genres() {
        let existing = vec![
            perf("/a", "Monday 1 August", "14:00", "COMEDY"),
            perf("/b", "Monday 1 August", "15:00", "THEATRE"),
        ];
        let new = vec![perf("/c", "Wednesday 3 August", "16:00", "COMEDY")];
        let result = merge_performances(existing, new, true);
        assert_eq!(result.len(), 2);
        let genres: HashSet<&str> = result.iter().map(|r| r.genre.as_str()).collect();
        assert!(genres.contains("THEATRE"));
        assert!(genres.contains("COMEDY"));
        // The THEATRE row is untouched
        let theatre = result.iter().find(|r| r.genre == "THEATRE").unwrap();
        assert_eq!(theatre.show_url, "/b");
    }

    #[test]
    fn test_empty_new_batch_returns_existing_unchanged() {
        let existing = vec![
            perf("/b", "Monday 1 August", "15:00", "THEATRE"),
            perf("/a", "Monday 1 August", "14:00", "COMEDY"),
        ];
        let result = merge_performances(existing.clone(), Vec::new(), false);
        assert_eq!(result, existing);
    }

    #[test]
    fn test_merge_sorts_deterministically_with_empty_keys_last() {
        let existing = vec![perf("", "Monday 1 August", "10:00", "")];
        let new = vec![
            perf("/b", "Monday 1 August", "15:00", "THEATRE"),
            perf("/a", "Monday 1 August", "14:00", "COMEDY"),
        ];
        let result = merge_performances(existing, new, false);
        assert_eq!(result[0].genre, "COMEDY");
        assert_eq!(result[1].genre, "THEATRE");
        // Row with empty sort keys lands last
        assert_eq!(result[2].genre, "");
    }

    #[test]
    fn test_merge_show_info_overwrites_by_url() {
        let existing = vec![ShowInfo {
            show_url: "/a".to_string(),
            show_name: "Old Name".to_string(),
            description: "old".to_string(),
            ..Default::default()
        }];
        let new = vec![ShowInfo {
            show_url: "/a".to_string(),
            show_name: "New Name".to_string(),
            description: "new".to_string(),
            ..Default::default()
        }];
        let result = merge_show_info(existing, new);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].show_name, "New Name");
        assert_eq!(result[0].description, "new");
    }

    #[test]
    fn test_merge_show_info_preserves_non_matching() {
        let existing = vec![
            ShowInfo {
                show_url: "/a".to_string(),
                show_name: "Show A".to_string(),
                ..Default::default()
            },
            ShowInfo {
                show_url: "/b".to_string(),
                show_name: "Show B".to_string(),
                ..Default::default()
            },
        ];
        let new = vec![ShowInfo {
            show_url: "/a".to_string(),
            show_name: "Show A Updated".to_string(),
            ..Default::default()
        }];
        let result = merge_show_info(existing, new);
        assert_eq!(result.len(), 2);
        let urls: HashSet<&str> = result.iter().map(|r| r.show_url.as_str()).collect();
        assert!(urls.contains("/a"));
        assert!(urls.contains("/b"));
    }

    #[test]
    fn test_collect_venues_dedups_and_skips_empty_codes() {
        let venue = |code: &str, name: &str| VenueInfo {
            venue_code: code.to_string(),
            venue_name: name.to_string(),
            ..Default::default()
        };
        let shows = vec![
            ScrapedShow {
                venue_info: Some(venue("V1", "Venue One")),
                ..Default::default()
            },
            ScrapedShow {
                venue_info: Some(venue("V2", "Venue Two")),
                ..Default::default()
            },
            ScrapedShow {
                venue_info: Some(venue("V1", "Venue One")),
                ..Default::default()
            },
            ScrapedShow {
                venue_info: Some(venue("", "Unknown")),
                ..Default::default()
            },
            ScrapedShow::default(),
        ];
        let venues = collect_venues(&shows);
        assert_eq!(venues.len(), 2);
        assert!(venues.contains_key("V1"));
        assert!(venues.contains_key("V2"));
    }

    #[test]
    fn test_venue_cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("venue-info.csv");

        let mut venues = HashMap::new();
        venues.insert(
            "V1".to_string(),
            VenueInfo {
                venue_code: "V1".to_string(),
                venue_name: "Pleasance Courtyard".to_string(),
                contact_phone: "+44 131 556 6550".to_string(),
                ..Default::default()
            },
        );
        venues.insert(
            "V2".to_string(),
            VenueInfo {
                venue_code: "V2".to_string(),
                venue_name: "Assembly Hall".to_string(),
                ..Default::default()
            },
        );

        save_venue_cache(&venues, &path).unwrap();
        let loaded = load_venue_cache(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["V1"].contact_phone, "+44 131 556 6550");
        assert_eq!(loaded["V2"].venue_name, "Assembly Hall");
        assert_eq!(loaded["V2"].contact_phone, "");
    }

    #[test]
    fn test_venue_cache_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_venue_cache(dir.path().join("missing.csv")).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_save_empty_venue_cache_writes_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("venue-info.csv");
        save_venue_cache(&HashMap::new(), &path).unwrap();
        assert!(path.exists());
        let loaded = load_venue_cache(&path).unwrap();
        assert!(loaded.is_empty());
    }

    #[test]
    fn test_table_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("performances.csv");

        let rows = vec![
            perf_with_availability(
                "https://x/a",
                "Wednesday 30 July",
                "19:30",
                "COMEDY",
                "TICKETS_AVAILABLE",
            ),
            perf("https://x/b", "Thursday 31 July", "20:00", "THEATRE"),
        ];
        save_table(&rows, &path).unwrap();
        let loaded: Vec<PerfRow> = load_table(&path).unwrap();
        assert_eq!(loaded, rows);
    }

    #[test]
    fn test_load_synthesizes_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old-schema.csv");
        std::fs::write(
            &path,
            "show-link-href,date,performance-time\nhttps://x/a,Wednesday 30 July,19:30\n",
        )
        .unwrap();

        let loaded: Vec<PerfRow> = load_table(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].show_url, "https://x/a");
        assert_eq!(loaded[0].genre, "");
        assert_eq!(loaded[0].availability, "");
    }

    #[test]
    fn test_load_missing_file_is_empty_table() {
        let loaded: Vec<PerfRow> = load_table("does-not-exist.csv").unwrap();
        assert!(loaded.is_empty());
    }
}
