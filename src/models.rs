use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Ticket availability for a single performance, as a closed enumeration with
/// an explicit priority order. Unrecognized or empty status strings map to
/// `Unknown`, the lowest priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityStatus {
    Cancelled,
    SoldOut,
    NoAllocation,
    NoAllocationRemaining,
    PreviewShow,
    Preview,
    TwoForOne,
    FreeTicketed,
    Free,
    TicketsAvailable,
    Unknown,
}

impl AvailabilityStatus {
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_uppercase().as_str() {
            "CANCELLED" => Self::Cancelled,
            "SOLD_OUT" => Self::SoldOut,
            "NO_ALLOCATION" => Self::NoAllocation,
            "NO_ALLOCATION_REMAINING" => Self::NoAllocationRemaining,
            "PREVIEW_SHOW" => Self::PreviewShow,
            "PREVIEW" => Self::Preview,
            "TWO_FOR_ONE" => Self::TwoForOne,
            "FREE_TICKETED" => Self::FreeTicketed,
            "FREE" => Self::Free,
            "TICKETS_AVAILABLE" => Self::TicketsAvailable,
            _ => Self::Unknown,
        }
    }

    /// Dedup priority: a more informative status wins over a less informative
    /// one when the same performance is listed twice.
    pub fn priority(self) -> u8 {
        match self {
            Self::Cancelled => 100,
            Self::SoldOut => 90,
            Self::NoAllocation | Self::NoAllocationRemaining => 85,
            Self::PreviewShow | Self::Preview => 70,
            Self::TwoForOne => 60,
            Self::FreeTicketed | Self::Free => 50,
            Self::TicketsAvailable => 10,
            Self::Unknown => 0,
        }
    }

    /// Statuses reported as "sold out" in a snapshot diff.
    pub fn is_sold_out(self) -> bool {
        matches!(
            self,
            Self::SoldOut | Self::NoAllocation | Self::NoAllocationRemaining
        )
    }

    /// Statuses a performance can come "back available" from.
    pub fn is_unavailable(self) -> bool {
        self.is_sold_out() || self == Self::Cancelled
    }
}

/// Compare two raw availability strings by dedup priority.
pub fn status_priority(label: &str) -> u8 {
    AvailabilityStatus::from_label(label).priority()
}

/// One row of the canonical performance table and of snapshot files.
/// Column names match the persisted CSV contract; columns absent on load are
/// synthesized as empty strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerfRow {
    #[serde(rename = "web-scraper-scrape-time", default)]
    pub scrape_time: String,
    #[serde(rename = "show-link-href", default)]
    pub show_url: String,
    #[serde(rename = "show-link", default)]
    pub show_link_text: String,
    #[serde(rename = "show-name", default)]
    pub show_name: String,
    #[serde(rename = "show-performer", default)]
    pub performer: String,
    /// Raw listing date string, e.g. "Wednesday 30 July"
    #[serde(default)]
    pub date: String,
    /// Time string as rendered, possibly "HH:MM - HH:MM"
    #[serde(rename = "performance-time", default)]
    pub performance_time: String,
    #[serde(rename = "show-availability", default)]
    pub availability: String,
    #[serde(rename = "show-location", default)]
    pub location: String,
    #[serde(rename = "web-scraper-start-url", default)]
    pub start_url: String,
    #[serde(default)]
    pub genre: String,
}

impl PerfRow {
    /// Composite key identifying one performance across snapshots.
    pub fn perf_key(&self) -> String {
        format!("{}|{}|{}", self.show_url, self.date, self.performance_time)
    }
}

/// One row of per-show metadata, keyed by show URL.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowInfo {
    #[serde(rename = "show-link-href", default)]
    pub show_url: String,
    #[serde(rename = "show-name", default)]
    pub show_name: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub subgenres: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub warnings: String,
    #[serde(default)]
    pub age_suitability: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub facebook: String,
    #[serde(default)]
    pub instagram: String,
    #[serde(default)]
    pub tiktok: String,
    #[serde(default)]
    pub youtube: String,
    #[serde(default)]
    pub twitter: String,
    #[serde(default)]
    pub bluesky: String,
    #[serde(default)]
    pub mastodon: String,
}

/// Long-lived venue metadata, keyed by venue code. Venues with an empty code
/// are never cached.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VenueInfo {
    #[serde(default)]
    pub venue_code: String,
    #[serde(default)]
    pub venue_name: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub postcode: String,
    #[serde(default)]
    pub geolocation: String,
    #[serde(default)]
    pub google_maps_url: String,
    #[serde(default)]
    pub venue_page_url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default)]
    pub contact_email: String,
}

/// A show card from a search results page.
#[derive(Debug, Clone, Default)]
pub struct ShowCard {
    pub title: String,
    pub url: String,
    pub performer: Option<String>,
    pub duration: Option<String>,
}

/// One performance as extracted from a show detail page.
#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceDetail {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: Option<NaiveTime>,
    pub availability: String,
    pub venue: Option<String>,
    pub location: Option<String>,
}

impl PerformanceDetail {
    /// Listing-style date string, e.g. "Wednesday 30 July".
    pub fn date_label(&self) -> String {
        self.date.format("%A %-d %B").to_string()
    }

    /// Time string as rendered in listings: "19:30" or "19:30 - 20:30".
    pub fn time_label(&self) -> String {
        match self.end_time {
            Some(end) => format!(
                "{} - {}",
                self.start_time.format("%H:%M"),
                end.format("%H:%M")
            ),
            None => self.start_time.format("%H:%M").to_string(),
        }
    }
}

/// A show's assembled scrape result. A failed detail fetch leaves the
/// performances empty and both metadata fields unset.
#[derive(Debug, Clone, Default)]
pub struct ScrapedShow {
    pub title: String,
    pub url: String,
    pub performer: Option<String>,
    pub performances: Vec<PerformanceDetail>,
    pub show_info: Option<ShowInfo>,
    pub venue_info: Option<VenueInfo>,
}
