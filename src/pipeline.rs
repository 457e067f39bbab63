use crate::config::Config;
use crate::error::Result;
use crate::fetch::PageFetcher;
use crate::models::{PerfRow, ScrapedShow, ShowInfo, VenueInfo};
use crate::parser::{self, ListingParser};
use crate::snapshot::{self, SnapshotDiff};
use crate::store;
use chrono::Utc;
use metrics::{counter, histogram};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

const MAX_SEARCH_PAGES: usize = 50;

pub const PERFORMANCES_FILE: &str = "performances.csv";
pub const SHOW_INFO_FILE: &str = "show-info.csv";
pub const VENUE_CACHE_FILE: &str = "venue-info.csv";

/// Result of one update run.
#[derive(Debug, Default)]
pub struct UpdateOutcome {
    pub genres: Vec<String>,
    pub shows_scraped: usize,
    pub performances: usize,
    /// Shows whose detail fetch failed and degraded to "no details"
    pub degraded_shows: usize,
    pub venues_enriched: usize,
    pub snapshot_file: PathBuf,
    /// None when no prior snapshot exists to compare against
    pub diff: Option<SnapshotDiff>,
}

/// Orchestrates one scrape-merge-snapshot-diff run. All file paths come from
/// the configuration; fetching goes through the injected `PageFetcher`.
pub struct Pipeline<'a> {
    fetcher: &'a dyn PageFetcher,
    parser: ListingParser,
    config: &'a Config,
}

impl<'a> Pipeline<'a> {
    pub fn new(fetcher: &'a dyn PageFetcher, config: &'a Config) -> Self {
        Self {
            fetcher,
            parser: ListingParser::new(config.scrape.default_year, &config.scrape.base_url),
            config,
        }
    }

    fn current_path(&self, file: &str) -> PathBuf {
        Path::new(&self.config.scrape.current_dir).join(file)
    }

    /// Run a full update: scrape the given genres, merge into the canonical
    /// tables, write the run's snapshot files, and diff against the most
    /// recent prior snapshot.
    #[instrument(skip(self))]
    pub async fn run_update(&self, genres: &[String], full_mode: bool) -> Result<UpdateOutcome> {
        let mode = if full_mode { "full" } else { "recent" };
        let scrape_time = Utc::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let today = Utc::now().format("%Y-%m-%d").to_string();
        let t_run = std::time::Instant::now();
        counter!("fringe_update_runs_total", "mode" => mode.to_string()).increment(1);

        let mut outcome = UpdateOutcome {
            genres: genres.to_vec(),
            ..Default::default()
        };

        let mut perf_batch: Vec<PerfRow> = Vec::new();
        let mut info_batch: Vec<ShowInfo> = Vec::new();
        let mut all_shows: Vec<ScrapedShow> = Vec::new();

        for genre in genres {
            println!("🎭 Scraping genre {}...", genre);
            let (shows, degraded) = self.scrape_genre(genre).await;
            let search_url = self.search_url(genre, 1);

            outcome.shows_scraped += shows.len();
            outcome.degraded_shows += degraded;

            for show in &shows {
                perf_batch.extend(rows_from_show(show, genre, &scrape_time, &search_url));
            }
            info_batch.extend(store::show_info_from_shows(&shows));
            all_shows.extend(shows);
        }
        outcome.performances = perf_batch.len();
        counter!("fringe_performances_scraped_total").increment(perf_batch.len() as u64);

        info!(
            "Scraped {} shows, {} performances ({} degraded)",
            outcome.shows_scraped, outcome.performances, outcome.degraded_shows
        );
        println!(
            "✅ Scraped {} shows, {} performances ({} degraded)",
            outcome.shows_scraped, outcome.performances, outcome.degraded_shows
        );

        // Merge into canonical tables and rewrite them
        let existing = store::load_table(self.current_path(PERFORMANCES_FILE))?;
        let merged = store::merge_performances(existing, perf_batch.clone(), full_mode);
        store::save_table_with_headers(&merged, self.current_path(PERFORMANCES_FILE))?;

        let existing_info = store::load_table(self.current_path(SHOW_INFO_FILE))?;
        let merged_info = store::merge_show_info(existing_info, info_batch.clone());
        store::save_table_with_headers(&merged_info, self.current_path(SHOW_INFO_FILE))?;

        // The snapshot is this run's batch written verbatim, never merged
        let snapshot_file = snapshot::snapshot_path(
            &self.config.scrape.snapshot_dir,
            &today,
            mode,
            "snapshot",
        );
        store::save_table_with_headers(&perf_batch, &snapshot_file)?;
        let info_snapshot = snapshot::snapshot_path(
            &self.config.scrape.snapshot_dir,
            &today,
            mode,
            "show-info",
        );
        store::save_table_with_headers(&info_batch, &info_snapshot)?;
        println!("💾 Saved snapshot to {}", snapshot_file.display());
        outcome.snapshot_file = snapshot_file;

        // Diff against the most recent prior snapshot, if any
        outcome.diff = match snapshot::find_latest_snapshot(
            &self.config.scrape.snapshot_dir,
            Some(&today),
        ) {
            Some(prior_path) => {
                let prior = snapshot::load_snapshot(&prior_path)?;
                Some(snapshot::compare_snapshots(&prior, &perf_batch))
            }
            None => {
                info!("No prior snapshot found, no comparison possible");
                println!("ℹ️  No prior snapshot found, no comparison possible");
                None
            }
        };

        // Venue cache: append new codes, enrich contact details
        outcome.venues_enriched = self.update_venue_cache(&all_shows).await?;

        histogram!("fringe_update_duration_seconds").record(t_run.elapsed().as_secs_f64());
        Ok(outcome)
    }

    fn search_url(&self, genre: &str, page: usize) -> String {
        format!(
            "{}/tickets/whats-on?search=true&genres={}&page={}",
            self.config.scrape.base_url.trim_end_matches('/'),
            genre,
            page
        )
    }

    /// Scrape one genre: paginate search results, then fetch each show's
    /// detail page. A failed detail fetch degrades that show to zero
    /// performances rather than aborting the batch.
    async fn scrape_genre(&self, genre: &str) -> (Vec<ScrapedShow>, usize) {
        let mut cards = Vec::new();
        for page in 1..=MAX_SEARCH_PAGES {
            let url = self.search_url(genre, page);
            let page_cards = match self.fetcher.fetch_page(&url, true).await {
                Ok(response) => self.parser.parse_search_results(&response.html),
                Err(e) => {
                    warn!("Search page {} failed for {}: {}", page, genre, e);
                    break;
                }
            };
            if page_cards.is_empty() {
                break;
            }
            cards.extend(page_cards);
        }
        info!("Found {} shows for genre {}", cards.len(), genre);

        let mut shows = Vec::new();
        let mut degraded = 0;
        for card in cards {
            match self.fetcher.fetch_page(&card.url, true).await {
                Ok(response) => {
                    let name = if card.title.is_empty() {
                        self.parser
                            .extract_show_name(&response.html)
                            .unwrap_or_default()
                    } else {
                        card.title.clone()
                    };
                    let detail = self.parser.parse_show_detail(&response.html, &card.url, &name);
                    shows.push(ScrapedShow {
                        title: name,
                        url: card.url,
                        performer: card.performer,
                        performances: detail.performances,
                        show_info: detail.show_info,
                        venue_info: detail.venue_info,
                    });
                }
                Err(e) => {
                    warn!("Show detail fetch failed for {}: {}", card.url, e);
                    println!("⚠️  No details for {}: {}", card.title, e);
                    degraded += 1;
                    shows.push(ScrapedShow {
                        title: card.title,
                        url: card.url,
                        performer: card.performer,
                        ..Default::default()
                    });
                }
            }
        }
        (shows, degraded)
    }

    /// Two-phase venue enrichment: collect codes missing from the cache, then
    /// fetch each missing venue's page once for contact details. Returns the
    /// number of venues enriched.
    async fn update_venue_cache(&self, shows: &[ScrapedShow]) -> Result<usize> {
        let cache_path = self.current_path(VENUE_CACHE_FILE);
        let cache = store::load_venue_cache(&cache_path)?;
        let observed = store::collect_venues(shows);

        let missing = venues_needing_enrichment(&observed, &cache);
        if missing.is_empty() {
            return Ok(0);
        }
        println!("🏛️  Enriching {} new venues...", missing.len());

        let mut enriched_cache = cache;
        let mut enriched = 0;
        for mut venue in missing {
            if !venue.venue_page_url.is_empty() {
                match self.fetcher.fetch_page(&venue.venue_page_url, true).await {
                    Ok(response) => {
                        if let Some(venue_data) = parser::extract_venue_page_data(&response.html) {
                            let (phone, email) = parser::parse_venue_contact(&venue_data);
                            venue.contact_phone = phone;
                            venue.contact_email = email;
                        }
                    }
                    Err(e) => {
                        warn!("Venue page fetch failed for {}: {}", venue.venue_code, e);
                    }
                }
            }
            enriched += 1;
            enriched_cache.insert(venue.venue_code.clone(), venue);
        }

        store::save_venue_cache(&enriched_cache, &cache_path)?;
        counter!("fringe_venues_enriched_total").increment(enriched as u64);
        Ok(enriched)
    }
}

/// Phase 1 of venue enrichment: observed venues whose code is not cached yet.
pub fn venues_needing_enrichment(
    observed: &HashMap<String, VenueInfo>,
    cache: &HashMap<String, VenueInfo>,
) -> Vec<VenueInfo> {
    let mut missing: Vec<VenueInfo> = observed
        .values()
        .filter(|venue| !cache.contains_key(&venue.venue_code))
        .cloned()
        .collect();
    missing.sort_by(|a, b| a.venue_code.cmp(&b.venue_code));
    missing
}

/// Canonical-table rows for one scraped show.
pub fn rows_from_show(
    show: &ScrapedShow,
    genre: &str,
    scrape_time: &str,
    start_url: &str,
) -> Vec<PerfRow> {
    show.performances
        .iter()
        .map(|perf| PerfRow {
            scrape_time: scrape_time.to_string(),
            show_url: show.url.clone(),
            show_link_text: show.title.clone(),
            show_name: show.title.clone(),
            performer: show.performer.clone().unwrap_or_default(),
            date: perf.date_label(),
            performance_time: perf.time_label(),
            availability: perf.availability.clone(),
            location: perf
                .venue
                .clone()
                .or_else(|| perf.location.clone())
                .unwrap_or_default(),
            start_url: start_url.to_string(),
            genre: genre.to_string(),
        })
        .collect()
}
