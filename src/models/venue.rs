//! Venue model.
//!
//! Venues are owned by the surrounding tracker application. This subsystem
//! reads venue identity fields and writes back the reservation block plus a
//! small set of observed facts (hours, permanently-closed).

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::{OpeningPattern, Provider, ReservationDetectionResult};

/// Reservation-related fields written back onto a venue by detection runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReservationFields {
    pub provider: Option<Provider>,
    pub external_id: Option<String>,
    pub booking_url: Option<String>,
    pub opening_window_days: Option<i64>,
    pub opening_time: Option<NaiveTime>,
    pub opening_pattern: Option<OpeningPattern>,
    pub last_available_date: Option<NaiveDate>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_successful_check_at: Option<DateTime<Utc>>,
    pub last_check_status: Option<String>,
    /// Joined signal trace from the most recent detection run.
    pub check_notes: Option<String>,
}

impl ReservationFields {
    /// Copy a detection result onto the venue's reservation fields.
    pub fn apply(&mut self, result: &ReservationDetectionResult, checked_at: DateTime<Utc>) {
        self.provider = result.provider;
        self.external_id = result.external_id.clone();
        self.booking_url = result.booking_url.clone();
        self.opening_window_days = result.opening_window_days;
        self.opening_time = result.opening_time;
        self.opening_pattern = result.opening_pattern;
        self.last_available_date = result.last_available_date;
        self.last_checked_at = Some(checked_at);
        self.last_successful_check_at = Some(checked_at);
        self.last_check_status = Some(match result.provider {
            Some(p) => format!("detected:{}", p.as_str()),
            None => "no_provider".to_string(),
        });
        self.check_notes = Some(result.notes());
    }
}

/// A restaurant or venue tracked by the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Venue {
    pub id: String,
    pub name: String,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub city: Option<String>,
    pub website_url: Option<String>,
    /// Mapping-service place id, when already known.
    pub google_place_id: Option<String>,
    /// Editorial-guide slug, when already known.
    pub michelin_slug: Option<String>,
    #[serde(default)]
    pub reservation: ReservationFields,
    /// Hours-of-operation blob as observed by rating adapters.
    pub hours: Option<serde_json::Value>,
    #[serde(default)]
    pub permanently_closed: bool,
    pub created_at: DateTime<Utc>,
}

impl Venue {
    pub fn new(id: String, name: String) -> Self {
        Self {
            id,
            name,
            lat: None,
            lng: None,
            city: None,
            website_url: None,
            google_place_id: None,
            michelin_slug: None,
            reservation: ReservationFields::default(),
            hours: None,
            permanently_closed: false,
            created_at: Utc::now(),
        }
    }
}
