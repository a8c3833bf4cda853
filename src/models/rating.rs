//! Rating records from third-party sources.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Third-party rating sources audited on a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RatingSource {
    Google,
    Michelin,
    Yelp,
    Infatuation,
}

impl RatingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingSource::Google => "google",
            RatingSource::Michelin => "michelin",
            RatingSource::Yelp => "yelp",
            RatingSource::Infatuation => "infatuation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "google" => Some(RatingSource::Google),
            "michelin" => Some(RatingSource::Michelin),
            "yelp" => Some(RatingSource::Yelp),
            "infatuation" => Some(RatingSource::Infatuation),
            _ => None,
        }
    }
}

/// One rating row per (venue, source). Upserts are keyed on that pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub venue_id: String,
    pub source: RatingSource,
    pub rating: Option<f64>,
    /// Maximum of the source's rating scale (5.0, 3.0, 10.0, ...).
    pub rating_max: Option<f64>,
    pub notes: Option<String>,
    pub review_count: Option<i64>,
    pub external_url: Option<String>,
    pub external_id: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

impl RatingRecord {
    pub fn new(venue_id: String, source: RatingSource) -> Self {
        Self {
            venue_id,
            source,
            rating: None,
            rating_max: None,
            notes: None,
            review_count: None,
            external_url: None,
            external_id: None,
            fetched_at: Utc::now(),
        }
    }
}
