//! Reservation detection types.
//!
//! `ReservationDetectionResult` is transient: it is assembled by the signal
//! fusion engine and copied onto the venue's reservation fields, never
//! persisted as its own row.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Known reservation providers.
///
/// Closed set on purpose: dispatch to adapters and horizon strategies is a
/// `match`, so an unhandled provider is a compile error rather than a silent
/// string miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Resy,
    Opentable,
    Sevenrooms,
    Tock,
    WalkIn,
    Phone,
    Other,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Resy => "resy",
            Provider::Opentable => "opentable",
            Provider::Sevenrooms => "sevenrooms",
            Provider::Tock => "tock",
            Provider::WalkIn => "walk_in",
            Provider::Phone => "phone",
            Provider::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "resy" => Some(Provider::Resy),
            "opentable" => Some(Provider::Opentable),
            "sevenrooms" => Some(Provider::Sevenrooms),
            "tock" => Some(Provider::Tock),
            "walk_in" => Some(Provider::WalkIn),
            "phone" => Some(Provider::Phone),
            "other" => Some(Provider::Other),
            _ => None,
        }
    }

    /// Providers with a direct API adapter that can be enriched.
    pub fn is_enrichable(&self) -> bool {
        matches!(
            self,
            Provider::Resy | Provider::Opentable | Provider::Sevenrooms
        )
    }
}

/// How a platform releases new booking dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpeningPattern {
    /// A new date opens every day.
    Rolling,
    /// A batch of dates opens at once (e.g. on the first of the month).
    Bulk,
}

impl OpeningPattern {
    pub fn as_str(&self) -> &'static str {
        match self {
            OpeningPattern::Rolling => "rolling",
            OpeningPattern::Bulk => "bulk",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "rolling" => Some(OpeningPattern::Rolling),
            "bulk" => Some(OpeningPattern::Bulk),
            _ => None,
        }
    }
}

/// Which pipeline stage produced the final provider decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionSource {
    EditorialHint,
    WebsiteScan,
}

impl DetectionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionSource::EditorialHint => "editorial_hint",
            DetectionSource::WebsiteScan => "website_scan",
        }
    }
}

/// A weak reservation hint sourced from an editorial guide listing.
#[derive(Debug, Clone, Default)]
pub struct EditorialHint {
    /// Platform name string as printed by the guide (e.g. "Resy", "OpenTable").
    pub platform_name: Option<String>,
    /// Reservation URL the guide links to, if any.
    pub reservation_url: Option<String>,
}

/// Fused result of reservation provider detection.
#[derive(Debug, Clone, Default)]
pub struct ReservationDetectionResult {
    pub provider: Option<Provider>,
    pub external_id: Option<String>,
    pub booking_url: Option<String>,
    pub opening_window_days: Option<i64>,
    pub opening_pattern: Option<OpeningPattern>,
    pub opening_time: Option<NaiveTime>,
    pub last_available_date: Option<NaiveDate>,
    pub source: Option<DetectionSource>,
    /// Human-readable trace of every signal seen, in order. Diagnostic only,
    /// never used for control flow.
    pub signals: Vec<String>,
}

impl ReservationDetectionResult {
    pub fn signal(&mut self, message: impl Into<String>) {
        self.signals.push(message.into());
    }

    /// Join the signal trace into the free-text notes persisted on the venue.
    pub fn notes(&self) -> String {
        self.signals.join("; ")
    }
}
