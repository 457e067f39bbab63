use crate::models::{status_priority, PerformanceDetail, ShowCard, ShowInfo, VenueInfo};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Result of parsing a show detail page.
#[derive(Debug, Clone, Default)]
pub struct ShowDetail {
    pub performances: Vec<PerformanceDetail>,
    pub show_info: Option<ShowInfo>,
    pub venue_info: Option<VenueInfo>,
}

static NEXT_DATA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<script id="__NEXT_DATA__"[^>]*>(.*?)</script>"#).unwrap()
});

static DAY_MONTH_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d{1,2})\s+(\w+)").unwrap());

static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})").unwrap());

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const SOCIAL_KEYS: [&str; 8] = [
    "website", "facebook", "instagram", "tiktok", "youtube", "twitter", "bluesky", "mastodon",
];

/// Extract the embedded `__NEXT_DATA__` JSON blob from page markup.
/// Malformed JSON is non-fatal and reported as "not found".
pub fn extract_next_data(html: &str) -> Option<Value> {
    let captures = match NEXT_DATA_RE.captures(html) {
        Some(c) => c,
        None => {
            debug!("No __NEXT_DATA__ found in page");
            return None;
        }
    };

    match serde_json::from_str(captures.get(1)?.as_str()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Failed to parse __NEXT_DATA__: {}", e);
            None
        }
    }
}

fn page_queries(next_data: &Value) -> Option<&serde_json::Map<String, Value>> {
    next_data
        .get("props")?
        .get("pageProps")?
        .get("initialState")?
        .get("apiPublic")?
        .get("queries")?
        .as_object()
}

/// Locate the event payload inside a show detail page's embedded JSON: the
/// first query result whose key contains "Event" and carries a `data.event`
/// sub-object.
pub fn extract_event_data(html: &str) -> Option<Value> {
    let next_data = extract_next_data(html)?;
    let queries = page_queries(&next_data)?;

    for (key, val) in queries {
        if key.contains("Event") {
            if let Some(event) = val.get("data").and_then(|d| d.get("event")) {
                if !event.is_null() {
                    return Some(event.clone());
                }
            }
        }
    }
    None
}

/// Locate the venue payload inside a venue detail page's embedded JSON.
pub fn extract_venue_page_data(html: &str) -> Option<Value> {
    let next_data = extract_next_data(html)?;
    let queries = page_queries(&next_data)?;

    for (key, val) in queries {
        if key.contains("Venue") {
            if let Some(venue) = val.get("data").and_then(|d| d.get("venue")) {
                if !venue.is_null() {
                    return Some(venue.clone());
                }
            }
        }
    }
    None
}

/// Contact details from a venue detail page, absent fields as empty strings.
pub fn parse_venue_contact(venue_page_data: &Value) -> (String, String) {
    let phone = venue_page_data
        .get("contactPhone")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let email = venue_page_data
        .get("contactEmail")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    (phone, email)
}

fn str_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

/// Parse an ISO datetime like "2026-08-05T19:30:00Z" into its wall-clock
/// date and time components.
fn parse_iso_datetime(raw: &str) -> Option<(NaiveDate, NaiveTime)> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        let naive = dt.naive_local();
        return Some((naive.date(), naive.time()));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S") {
        return Some((naive.date(), naive.time()));
    }
    None
}

/// Parse performances from the event payload, deduplicating by
/// (date, start time, venue) and keeping the strictly higher-priority
/// availability status when duplicates exist. Ties keep the first-seen entry.
pub fn parse_performances(event_data: &Value) -> Vec<PerformanceDetail> {
    let mut venue_name: Option<String> = None;
    let mut venue_location: Option<String> = None;

    if let Some(venue) = event_data
        .get("venues")
        .and_then(|v| v.as_array())
        .and_then(|v| v.first())
    {
        let title = str_field(venue, "title");
        if !title.is_empty() {
            venue_name = Some(title);
        }
        let parts = [
            str_field(venue, "address1"),
            str_field(venue, "address2"),
            str_field(venue, "postCode"),
        ];
        let joined = parts
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        if !joined.is_empty() {
            venue_location = Some(joined);
        }
    }

    // A space is a more specific sub-location within the venue; its name
    // takes precedence over the venue name.
    if let Some(space) = event_data
        .get("spaces")
        .and_then(|v| v.as_array())
        .and_then(|v| v.first())
    {
        let space_name = match str_field(space, "venueName") {
            name if !name.is_empty() => name,
            _ => str_field(space, "title"),
        };
        if !space_name.is_empty() {
            venue_name = Some(space_name);
        }
    }

    let mut ordered: Vec<PerformanceDetail> = Vec::new();
    let mut index: HashMap<(NaiveDate, NaiveTime, Option<String>), usize> = HashMap::new();

    let raw_performances = event_data
        .get("performances")
        .and_then(|v| v.as_array())
        .cloned()
        .unwrap_or_default();

    for perf in &raw_performances {
        let dt_str = str_field(perf, "dateTime");
        if dt_str.is_empty() {
            continue;
        }
        let (date, start_time) = match parse_iso_datetime(&dt_str) {
            Some(parts) => parts,
            None => {
                debug!("Failed to parse performance dateTime: {}", dt_str);
                continue;
            }
        };

        let end_time = {
            let end_str = str_field(perf, "estimatedEndDateTime");
            if end_str.is_empty() {
                None
            } else {
                parse_iso_datetime(&end_str).map(|(_, t)| t)
            }
        };

        // Cancelled takes precedence over sold-out when both flags are set.
        let mut availability = str_field(perf, "ticketStatus");
        if perf.get("cancelled").and_then(|v| v.as_bool()) == Some(true) {
            availability = "CANCELLED".to_string();
        } else if perf.get("soldOut").and_then(|v| v.as_bool()) == Some(true) {
            availability = "SOLD_OUT".to_string();
        }

        let detail = PerformanceDetail {
            date,
            start_time,
            end_time,
            availability,
            venue: venue_name.clone(),
            location: venue_location.clone(),
        };

        let key = (date, start_time, venue_name.clone());
        match index.get(&key) {
            Some(&pos) => {
                let existing_priority = status_priority(&ordered[pos].availability);
                let new_priority = status_priority(&detail.availability);
                if new_priority > existing_priority {
                    debug!(
                        "Dedup: replacing {} with {} for {} {}",
                        ordered[pos].availability, detail.availability, date, start_time
                    );
                    ordered[pos] = detail;
                }
            }
            None => {
                index.insert(key, ordered.len());
                ordered.push(detail);
            }
        }
    }

    debug!("Parsed {} performances from event data", ordered.len());
    ordered
}

/// Parse show metadata from the event payload.
pub fn parse_show_info(event_data: &Value, show_url: &str, show_name: &str) -> ShowInfo {
    let description = str_field(event_data, "description");
    let genre = str_field(event_data, "genre");

    let sub_genre_raw = str_field(event_data, "subGenre");
    let subgenres = sub_genre_raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ");

    // Attribute lookup keyed by known attribute names
    let mut attrs: HashMap<String, String> = HashMap::new();
    if let Some(attributes) = event_data.get("attributes").and_then(|v| v.as_array()) {
        for attr in attributes {
            let key = str_field(attr, "key");
            let value = str_field(attr, "value");
            if !key.is_empty() && !value.is_empty() {
                attrs.insert(key, value);
            }
        }
    }

    let warnings = attrs.get("explicit_material").cloned().unwrap_or_default();
    let age_suitability = attrs.get("age_range_guidance").cloned().unwrap_or_default();

    let mut socials: HashMap<&str, String> = HashMap::new();
    for key in SOCIAL_KEYS {
        socials.insert(key, attrs.get(key).cloned().unwrap_or_default());
    }

    // Backfill from the socialLinks array; attribute-sourced values are
    // never overridden.
    if let Some(links) = event_data.get("socialLinks").and_then(|v| v.as_array()) {
        for link in links {
            let link_type = str_field(link, "type").to_lowercase();
            let link_url = str_field(link, "url");
            if link_url.is_empty() {
                continue;
            }
            if let Some(slot) = SOCIAL_KEYS.iter().find(|k| **k == link_type) {
                if let Some(entry) = socials.get_mut(slot) {
                    if entry.is_empty() {
                        *entry = link_url;
                    }
                }
            }
        }
    }

    // Prefer the "Large" image, else the first listed one
    let mut image_url = String::new();
    if let Some(images) = event_data.get("images").and_then(|v| v.as_array()) {
        for img in images {
            if str_field(img, "imageType") == "Large" {
                image_url = str_field(img, "url");
                break;
            }
        }
        if image_url.is_empty() {
            if let Some(first) = images.first() {
                image_url = str_field(first, "url");
            }
        }
    }

    ShowInfo {
        show_url: show_url.to_string(),
        show_name: show_name.to_string(),
        genre,
        subgenres,
        description,
        warnings,
        age_suitability,
        image_url,
        website: socials.remove("website").unwrap_or_default(),
        facebook: socials.remove("facebook").unwrap_or_default(),
        instagram: socials.remove("instagram").unwrap_or_default(),
        tiktok: socials.remove("tiktok").unwrap_or_default(),
        youtube: socials.remove("youtube").unwrap_or_default(),
        twitter: socials.remove("twitter").unwrap_or_default(),
        bluesky: socials.remove("bluesky").unwrap_or_default(),
        mastodon: socials.remove("mastodon").unwrap_or_default(),
    }
}

/// Parse venue metadata from the event payload. Contact details require a
/// separate venue page fetch and are left empty here.
pub fn parse_venue_info(event_data: &Value, base_url: &str) -> Option<VenueInfo> {
    let venue = event_data
        .get("venues")
        .and_then(|v| v.as_array())
        .and_then(|v| v.first())?;

    let venue_code = str_field(venue, "venueCode");
    let venue_name = str_field(venue, "title");
    let slug = str_field(venue, "slug");
    let description = str_field(venue, "description");
    let postcode = str_field(venue, "postCode");
    let geolocation = str_field(venue, "geoLocation");

    let address = [str_field(venue, "address1"), str_field(venue, "address2")]
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(", ");

    let google_maps_url = if geolocation.is_empty() {
        String::new()
    } else {
        format!(
            "https://www.google.com/maps/dir/?api=1&destination={}",
            geolocation
        )
    };

    let venue_page_url = if slug.is_empty() {
        String::new()
    } else {
        format!("{}/venues/{}", base_url, slug)
    };

    Some(VenueInfo {
        venue_code,
        venue_name,
        address,
        postcode,
        geolocation,
        google_maps_url,
        venue_page_url,
        description,
        contact_phone: String::new(),
        contact_email: String::new(),
    })
}

/// Parser for festival listing pages. Holds the year assumed for listing
/// dates and the site base URL used to absolutize card links.
pub struct ListingParser {
    default_year: i32,
    base_url: String,
}

impl ListingParser {
    pub fn new(default_year: i32, base_url: &str) -> Self {
        Self {
            default_year,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Parse show cards from a search results page.
    pub fn parse_search_results(&self, html: &str) -> Vec<ShowCard> {
        let document = Html::parse_document(html);
        let card_selector =
            Selector::parse(r#"div[class*="event-listing_eventListingItem"]"#).unwrap();

        let mut cards = Vec::new();
        for element in document.select(&card_selector) {
            if let Some(card) = self.parse_show_card(&element) {
                cards.push(card);
            }
        }
        debug!("Found {} show cards", cards.len());
        cards
    }

    fn parse_show_card(&self, element: &ElementRef) -> Option<ShowCard> {
        let title_selector =
            Selector::parse(r#"a[class*="event-card-search_eventTitle"]"#).unwrap();
        let title_link = element.select(&title_selector).next()?;

        let title = element_text(&title_link);
        let url = self.canonical_show_url(title_link.value().attr("href").unwrap_or(""));

        let performer_selector =
            Selector::parse(r#"div[class*="event-card-search_eventPresenter"]"#).unwrap();
        let performer = element
            .select(&performer_selector)
            .next()
            .map(|el| element_text(&el));

        let duration_selector =
            Selector::parse(r#"span[class*="event-card-search_eventDuration"]"#).unwrap();
        let duration = element
            .select(&duration_selector)
            .next()
            .map(|el| element_text(&el));

        Some(ShowCard {
            title,
            url,
            performer,
            duration,
        })
    }

    /// Card hrefs use `/whats-on/...` but canonical show URLs live under
    /// `/tickets/whats-on/...`.
    pub fn canonical_show_url(&self, href: &str) -> String {
        if href.is_empty() || href.starts_with("http") {
            return href.to_string();
        }
        let path = if href.starts_with("/whats-on/") {
            format!("/tickets{}", href)
        } else {
            href.to_string()
        };
        format!("{}{}", self.base_url, path)
    }

    /// Parse a show detail page. The embedded JSON is preferred; markup
    /// scraping is the fallback when it is absent or yields no performances.
    pub fn parse_show_detail(&self, html: &str, show_url: &str, show_name: &str) -> ShowDetail {
        if let Some(event_data) = extract_event_data(html) {
            let performances = parse_performances(&event_data);
            if !performances.is_empty() {
                info!(
                    "Extracted {} performances from embedded JSON",
                    performances.len()
                );
                return ShowDetail {
                    performances,
                    show_info: Some(parse_show_info(&event_data, show_url, show_name)),
                    venue_info: parse_venue_info(&event_data, &self.base_url),
                };
            }
        }

        debug!("Falling back to markup parsing for performances");
        ShowDetail {
            performances: self.parse_show_detail_html(html),
            show_info: None,
            venue_info: None,
        }
    }

    /// Fallback markup scrape: at most one date, time range, availability and
    /// venue from fixed page regions. Never populates metadata.
    fn parse_show_detail_html(&self, html: &str) -> Vec<PerformanceDetail> {
        let document = Html::parse_document(html);

        let date_selector =
            Selector::parse(r#"div[class*="date-picker_container"] button"#).unwrap();
        let time_selector =
            Selector::parse(r#"[class*="performance-item_headerTime"] span"#).unwrap();
        let availability_selector = Selector::parse(r#"span[class*="label_label_"]"#).unwrap();
        let venue_selector =
            Selector::parse(r#"div[class*="performance-location_venueTitle"]"#).unwrap();

        let mut performances = Vec::new();

        if let Some(time_el) = document.select(&time_selector).next() {
            let raw_time = element_text(&time_el);
            let (start_time, end_time) = self.parse_time(&raw_time);

            let availability = document
                .select(&availability_selector)
                .next()
                .map(|el| element_text(&el))
                .unwrap_or_default();

            let venue = document
                .select(&venue_selector)
                .next()
                .map(|el| element_text(&el));

            let raw_date = document
                .select(&date_selector)
                .map(|btn| element_text(&btn))
                .find(|text| looks_like_date(text));

            if let (Some(raw_date), Some(start_time)) = (raw_date, start_time) {
                if let Some(date) = self.parse_date(&raw_date) {
                    performances.push(PerformanceDetail {
                        date,
                        start_time,
                        end_time,
                        availability,
                        venue,
                        location: None,
                    });
                }
            }
        }

        debug!("Parsed {} performances from markup", performances.len());
        performances
    }

    /// Parse a listing date like "Wednesday 30 July" using the configured
    /// default year.
    pub fn parse_date(&self, date_str: &str) -> Option<NaiveDate> {
        let captures = DAY_MONTH_RE.captures(date_str.trim())?;
        let day = captures.get(1)?.as_str();
        let month = captures.get(2)?.as_str();

        let full = format!("{} {} {}", day, month, self.default_year);
        match NaiveDate::parse_from_str(&full, "%d %B %Y") {
            Ok(date) => Some(date),
            Err(e) => {
                debug!("Date parse error for '{}': {}", date_str, e);
                None
            }
        }
    }

    /// Parse a time range like "19:30 - 20:30" into start/end times.
    pub fn parse_time(&self, time_str: &str) -> (Option<NaiveTime>, Option<NaiveTime>) {
        let mut parts = time_str
            .trim()
            .split(|c| c == '-' || c == '\u{2013}')
            .map(str::trim);

        let start = parts.next().and_then(parse_single_time);
        let end = parts.next().and_then(parse_single_time);
        (start, end)
    }

    /// Extract the show name from a detail page heading.
    pub fn extract_show_name(&self, html: &str) -> Option<String> {
        let document = Html::parse_document(html);
        let h1_selector = Selector::parse("h1").unwrap();
        document
            .select(&h1_selector)
            .next()
            .map(|el| element_text(&el))
            .filter(|name| !name.is_empty())
    }
}

fn parse_single_time(time_str: &str) -> Option<NaiveTime> {
    let captures = TIME_RE.captures(time_str.trim())?;
    let hour: u32 = captures.get(1)?.as_str().parse().ok()?;
    let minute: u32 = captures.get(2)?.as_str().parse().ok()?;
    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn looks_like_date(text: &str) -> bool {
    let lower = text.to_lowercase();
    MONTHS.iter().any(|month| lower.contains(month))
}

fn element_text(element: &ElementRef) -> String {
    element.text().collect::<String>().trim().to_string()
}
