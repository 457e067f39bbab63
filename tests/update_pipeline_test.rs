use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use fringe_scraper::config::{Config, ScrapeConfig};
use fringe_scraper::error::ScrapeError;
use fringe_scraper::fetch::{PageFetcher, PageResponse};
use fringe_scraper::models::PerfRow;
use fringe_scraper::pipeline::{Pipeline, PERFORMANCES_FILE, VENUE_CACHE_FILE};
use fringe_scraper::store;

/// Serves canned pages by URL; unknown URLs fail like an exhausted fetch.
struct StubFetcher {
    pages: HashMap<String, String>,
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch_page(
        &self,
        url: &str,
        _dynamic: bool,
    ) -> fringe_scraper::error::Result<PageResponse> {
        match self.pages.get(url) {
            Some(html) => Ok(PageResponse {
                html: html.clone(),
                status_code: 200,
                credits_used: 5,
            }),
            None => Err(ScrapeError::Api {
                message: format!("no page for {}", url),
            }),
        }
    }
}

fn search_page_html(cards: &[(&str, &str, &str)]) -> String {
    let mut html = String::new();
    for (title, href, performer) in cards {
        html.push_str(&format!(
            r#"<div class="event-listing_eventListingItem_x">
                 <a class="event-card-search_eventTitle_x" href="{}">{}</a>
                 <div class="event-card-search_eventPresenter_x">{}</div>
               </div>"#,
            href, title, performer
        ));
    }
    format!("<html><body>{}</body></html>", html)
}

fn detail_page_html(ticket_status: &str) -> String {
    let event = serde_json::json!({
        "description": "A show.",
        "genre": "Comedy",
        "venues": [{
            "venueCode": "V33",
            "title": "Monkey Barrel",
            "slug": "monkey-barrel",
            "address1": "9 Blair Street",
            "postCode": "EH1 1QR",
            "geoLocation": "55.9486,-3.1875"
        }],
        "performances": [
            {"dateTime": "2026-08-05T19:30:00Z",
             "estimatedEndDateTime": "2026-08-05T20:30:00Z",
             "ticketStatus": ticket_status}
        ]
    });
    let next_data = serde_json::json!({
        "props": {"pageProps": {"initialState": {"apiPublic": {"queries": {
            "getEventBySlug": {"data": {"event": event}}
        }}}}}
    });
    format!(
        r#"<html><body><script id="__NEXT_DATA__" type="application/json">{}</script></body></html>"#,
        next_data
    )
}

fn venue_page_html() -> String {
    let next_data = serde_json::json!({
        "props": {"pageProps": {"initialState": {"apiPublic": {"queries": {
            "getVenueBySlug": {"data": {"venue": {
                "contactPhone": "+44 131 000 0000",
                "contactEmail": "hello@monkeybarrel.co.uk"
            }}}
        }}}}}
    });
    format!(
        r#"<script id="__NEXT_DATA__">{}</script>"#,
        next_data
    )
}

fn test_config(root: &std::path::Path) -> Config {
    Config {
        scrape: ScrapeConfig {
            current_dir: root.join("current").to_string_lossy().to_string(),
            snapshot_dir: root.join("snapshots").to_string_lossy().to_string(),
            output_dir: root.join("raw").to_string_lossy().to_string(),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn stub_for(ticket_status: &str) -> StubFetcher {
    let base = "https://www.edfringe.com";
    let mut pages = HashMap::new();
    pages.insert(
        format!("{}/tickets/whats-on?search=true&genres=COMEDY&page=1", base),
        search_page_html(&[
            ("Test Show", "/whats-on/test-show", "Test Company"),
            ("Broken Show", "/whats-on/broken-show", "Broken Company"),
        ]),
    );
    pages.insert(
        format!("{}/tickets/whats-on/test-show", base),
        detail_page_html(ticket_status),
    );
    pages.insert(format!("{}/venues/monkey-barrel", base), venue_page_html());
    StubFetcher { pages }
}

#[tokio::test]
async fn test_update_run_end_to_end() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());
    let fetcher = stub_for("TICKETS_AVAILABLE");
    let pipeline = Pipeline::new(&fetcher, &config);

    let outcome = pipeline
        .run_update(&["COMEDY".to_string()], false)
        .await?;

    // Both cards scraped; the broken one degraded to no details
    assert_eq!(outcome.shows_scraped, 2);
    assert_eq!(outcome.degraded_shows, 1);
    assert_eq!(outcome.performances, 1);

    // First run has nothing to compare against
    assert!(outcome.diff.is_none());

    // Canonical table written with the one performance
    let canonical: Vec<PerfRow> = store::load_table(
        std::path::Path::new(&config.scrape.current_dir).join(PERFORMANCES_FILE),
    )?;
    assert_eq!(canonical.len(), 1);
    let row = &canonical[0];
    assert_eq!(
        row.show_url,
        "https://www.edfringe.com/tickets/whats-on/test-show"
    );
    assert_eq!(row.date, "Wednesday 5 August");
    assert_eq!(row.performance_time, "19:30 - 20:30");
    assert_eq!(row.availability, "TICKETS_AVAILABLE");
    assert_eq!(row.genre, "COMEDY");

    // Snapshot file written verbatim
    assert!(outcome.snapshot_file.exists());
    let snapshot_rows: Vec<PerfRow> = store::load_table(&outcome.snapshot_file)?;
    assert_eq!(snapshot_rows.len(), 1);

    // Venue cache enriched from the venue detail page
    assert_eq!(outcome.venues_enriched, 1);
    let cache = store::load_venue_cache(
        std::path::Path::new(&config.scrape.current_dir).join(VENUE_CACHE_FILE),
    )?;
    assert_eq!(cache["V33"].contact_phone, "+44 131 000 0000");
    assert_eq!(cache["V33"].contact_email, "hello@monkeybarrel.co.uk");

    Ok(())
}

#[tokio::test]
async fn test_update_diffs_against_prior_snapshot() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());

    // Seed a prior-day snapshot holding the same performance, then scrape it
    // as sold out.
    let prior_row = PerfRow {
        scrape_time: "2026-08-06T06:00:00".to_string(),
        show_url: "https://www.edfringe.com/tickets/whats-on/test-show".to_string(),
        show_link_text: "Test Show".to_string(),
        show_name: "Test Show".to_string(),
        performer: "Test Company".to_string(),
        date: "Wednesday 5 August".to_string(),
        performance_time: "19:30 - 20:30".to_string(),
        availability: "TICKETS_AVAILABLE".to_string(),
        location: "Monkey Barrel".to_string(),
        genre: "COMEDY".to_string(),
        ..Default::default()
    };
    let prior_path =
        std::path::Path::new(&config.scrape.snapshot_dir).join("2000-01-01-recent-snapshot.csv");
    store::save_table(&[prior_row], &prior_path)?;

    let fetcher = stub_for("SOLD_OUT");
    let pipeline = Pipeline::new(&fetcher, &config);
    let outcome = pipeline
        .run_update(&["COMEDY".to_string()], false)
        .await?;

    let diff = outcome.diff.expect("prior snapshot should be compared");
    assert_eq!(diff.sold_out_performances.len(), 1);
    let change = &diff.sold_out_performances[0];
    assert_eq!(change.old_value.as_deref(), Some("TICKETS_AVAILABLE"));
    assert_eq!(change.new_value.as_deref(), Some("SOLD_OUT"));
    // The degraded show contributes no keys, so nothing else is reported
    assert_eq!(diff.total_changes(), 1);

    Ok(())
}

#[tokio::test]
async fn test_venue_cache_is_not_refetched_when_cached() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = test_config(dir.path());

    let fetcher = stub_for("TICKETS_AVAILABLE");
    let pipeline = Pipeline::new(&fetcher, &config);
    let first = pipeline.run_update(&["COMEDY".to_string()], false).await?;
    assert_eq!(first.venues_enriched, 1);

    // Second run observes the same venue; it is already cached
    let second = pipeline.run_update(&["COMEDY".to_string()], false).await?;
    assert_eq!(second.venues_enriched, 0);

    Ok(())
}
