use crate::error::Result;
use crate::models::PerfRow;
use crate::store;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// One row of the cleaned output: normalized date plus an Excel hyperlink.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanedRow {
    pub show: String,
    #[serde(rename = "show-name")]
    pub show_name: String,
    #[serde(rename = "show-performer")]
    pub performer: String,
    #[serde(rename = "show-link-href")]
    pub show_url: String,
    pub date_normalized: String,
    #[serde(rename = "performance-time")]
    pub performance_time: String,
    #[serde(rename = "show-availability")]
    pub availability: String,
    #[serde(rename = "show-location")]
    pub location: String,
    #[serde(rename = "web-scraper-start-url")]
    pub start_url: String,
}

/// One row of the per-show summary output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "show-name")]
    pub show_name: String,
    pub num_performances: usize,
    pub first_date: String,
    pub last_date: String,
    pub performer: String,
}

/// Converts canonical performance rows to derived CSV output formats.
pub struct Converter {
    default_year: i32,
}

impl Converter {
    pub fn new(default_year: i32) -> Self {
        Self { default_year }
    }

    /// Parse a raw listing date like "Wednesday 30 July" to ISO form.
    fn normalize_date(&self, raw: &str) -> Option<String> {
        let parts: Vec<&str> = raw.split_whitespace().collect();
        if parts.len() < 3 {
            return None;
        }
        let full = format!("{} {} {}", parts[1], parts[2], self.default_year);
        NaiveDate::parse_from_str(&full, "%d %B %Y")
            .ok()
            .map(|d| d.format("%Y-%m-%d").to_string())
    }

    /// Clean and normalize raw rows, dropping any whose date cannot be parsed.
    pub fn clean_data(&self, rows: &[PerfRow]) -> Vec<CleanedRow> {
        let cleaned: Vec<CleanedRow> = rows
            .iter()
            .filter_map(|row| {
                let date_normalized = self.normalize_date(&row.date)?;
                let link_text = if row.show_link_text.is_empty() {
                    &row.show_name
                } else {
                    &row.show_link_text
                };
                let show = if row.show_url.is_empty() {
                    String::new()
                } else {
                    excel_hyperlink(&row.show_url, link_text)
                };
                Some(CleanedRow {
                    show,
                    show_name: row.show_name.clone(),
                    performer: row.performer.clone(),
                    show_url: row.show_url.clone(),
                    date_normalized,
                    performance_time: row.performance_time.clone(),
                    availability: row.availability.clone(),
                    location: row.location.clone(),
                    start_url: row.start_url.clone(),
                })
            })
            .collect();
        info!("Cleaned data: {} rows", cleaned.len());
        cleaned
    }

    /// Per-show summary: performance counts and date ranges, grouped in
    /// first-seen order.
    pub fn create_summary(&self, cleaned: &[CleanedRow]) -> Vec<SummaryRow> {
        let mut order: Vec<String> = Vec::new();
        let mut groups: HashMap<String, Vec<&CleanedRow>> = HashMap::new();
        for row in cleaned {
            if !groups.contains_key(&row.show_name) {
                order.push(row.show_name.clone());
            }
            groups.entry(row.show_name.clone()).or_default().push(row);
        }

        let summary: Vec<SummaryRow> = order
            .into_iter()
            .map(|show_name| {
                let rows = &groups[&show_name];
                // ISO dates order correctly as strings
                let first_date = rows.iter().map(|r| r.date_normalized.clone()).min().unwrap_or_default();
                let last_date = rows.iter().map(|r| r.date_normalized.clone()).max().unwrap_or_default();
                SummaryRow {
                    show_name,
                    num_performances: rows.len(),
                    first_date,
                    last_date,
                    performer: rows[0].performer.clone(),
                }
            })
            .collect();
        info!("Created summary: {} shows", summary.len());
        summary
    }

    /// Wide format: one column per date holding the availability status for
    /// each (show, time, location) row.
    pub fn create_wide_format(&self, cleaned: &[CleanedRow]) -> (Vec<String>, Vec<Vec<String>>) {
        let mut dates: Vec<String> = Vec::new();
        for row in cleaned {
            if !dates.contains(&row.date_normalized) {
                dates.push(row.date_normalized.clone());
            }
        }
        dates.sort_unstable();

        type IndexKey = (String, String, String, String, String);
        let mut order: Vec<IndexKey> = Vec::new();
        let mut cells: HashMap<(IndexKey, String), String> = HashMap::new();
        for row in cleaned {
            let key: IndexKey = (
                row.show_url.clone(),
                row.show_name.clone(),
                row.performer.clone(),
                row.performance_time.clone(),
                row.location.clone(),
            );
            if !order.contains(&key) {
                order.push(key.clone());
            }
            // First value wins for duplicate cells
            cells
                .entry((key, row.date_normalized.clone()))
                .or_insert_with(|| row.availability.clone());
        }

        let mut headers: Vec<String> = vec![
            "show-link-href".to_string(),
            "show-name".to_string(),
            "show-performer".to_string(),
            "performance-time".to_string(),
            "show-location".to_string(),
        ];
        headers.extend(dates.iter().cloned());

        let rows: Vec<Vec<String>> = order
            .into_iter()
            .map(|key| {
                let (url, name, performer, time, location) = key.clone();
                let mut record = vec![url, name, performer, time, location];
                for date in &dates {
                    record.push(
                        cells
                            .get(&(key.clone(), date.clone()))
                            .cloned()
                            .unwrap_or_default(),
                    );
                }
                record
            })
            .collect();

        info!("Created wide format: {} rows", rows.len());
        (headers, rows)
    }
}

/// Excel HYPERLINK formula with quote-escaped display text.
fn excel_hyperlink(url: &str, text: &str) -> String {
    let safe_text = text.replace('"', "\"\"");
    format!("=HYPERLINK(\"{}\", \"{}\")", url, safe_text)
}

/// Save the requested derived formats next to each other, returning the
/// paths written per format name.
pub fn save_all_formats(
    rows: &[PerfRow],
    output_dir: impl AsRef<Path>,
    base_filename: &str,
    formats: Option<&[&str]>,
    default_year: i32,
) -> Result<HashMap<String, PathBuf>> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let formats = formats.unwrap_or(&["cleaned", "summary", "wide"]);
    let converter = Converter::new(default_year);
    let cleaned = converter.clean_data(rows);
    let mut results = HashMap::new();

    if formats.contains(&"cleaned") {
        let path = output_dir.join(format!("Cleaned-{}.csv", base_filename));
        store::save_table(&cleaned, &path)?;
        results.insert("cleaned".to_string(), path);
    }

    if formats.contains(&"summary") {
        let summary = converter.create_summary(&cleaned);
        let path = output_dir.join(format!("Summary-{}.csv", base_filename));
        store::save_table(&summary, &path)?;
        results.insert("summary".to_string(), path);
    }

    if formats.contains(&"wide") {
        let (headers, wide_rows) = converter.create_wide_format(&cleaned);
        let path = output_dir.join(format!("WideFormat-{}.csv", base_filename));
        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&headers)?;
        for record in &wide_rows {
            writer.write_record(record)?;
        }
        writer.flush()?;
        results.insert("wide".to_string(), path);
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, date: &str, time: &str, availability: &str) -> PerfRow {
        PerfRow {
            show_url: format!("https://x/{}", name),
            show_link_text: name.to_string(),
            show_name: name.to_string(),
            performer: "Performer".to_string(),
            date: date.to_string(),
            performance_time: time.to_string(),
            availability: availability.to_string(),
            location: "Venue".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_clean_normalizes_dates_and_drops_unparsable() {
        let rows = vec![
            raw("a", "Wednesday 30 July", "19:30", "TICKETS_AVAILABLE"),
            raw("b", "TBC", "20:00", "TICKETS_AVAILABLE"),
        ];
        let cleaned = Converter::new(2026).clean_data(&rows);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].date_normalized, "2026-07-30");
    }

    #[test]
    fn test_hyperlink_escapes_quotes() {
        assert_eq!(
            excel_hyperlink("https://x/a", r#"The "Best" Show"#),
            r#"=HYPERLINK("https://x/a", "The ""Best"" Show")"#
        );
    }

    #[test]
    fn test_summary_counts_and_ranges() {
        let rows = vec![
            raw("a", "Saturday 9 August", "19:30", "TICKETS_AVAILABLE"),
            raw("a", "Sunday 10 August", "19:30", "SOLD_OUT"),
            raw("b", "Friday 1 August", "20:00", "TICKETS_AVAILABLE"),
        ];
        let converter = Converter::new(2026);
        let summary = converter.create_summary(&converter.clean_data(&rows));
        assert_eq!(summary.len(), 2);
        let a = &summary[0];
        assert_eq!(a.show_name, "a");
        assert_eq!(a.num_performances, 2);
        assert_eq!(a.first_date, "2026-08-09");
        assert_eq!(a.last_date, "2026-08-10");
    }

    #[test]
    fn test_wide_format_pivots_dates_to_columns() {
        let rows = vec![
            raw("a", "Saturday 9 August", "19:30", "TICKETS_AVAILABLE"),
            raw("a", "Sunday 10 August", "19:30", "SOLD_OUT"),
        ];
        let converter = Converter::new(2026);
        let (headers, wide) = converter.create_wide_format(&converter.clean_data(&rows));
        assert_eq!(headers.len(), 7);
        assert_eq!(&headers[5..], &["2026-08-09", "2026-08-10"]);
        assert_eq!(wide.len(), 1);
        assert_eq!(wide[0][5], "TICKETS_AVAILABLE");
        assert_eq!(wide[0][6], "SOLD_OUT");
    }

    #[test]
    fn test_save_all_formats_writes_requested_files() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![raw("a", "Wednesday 30 July", "19:30", "TICKETS_AVAILABLE")];
        let results =
            save_all_formats(&rows, dir.path(), "festival-2026", None, 2026).unwrap();
        assert_eq!(results.len(), 3);
        assert!(results["cleaned"].ends_with("Cleaned-festival-2026.csv"));
        assert!(results["cleaned"].exists());
        assert!(results["summary"].exists());
        assert!(results["wide"].exists());
    }
}
