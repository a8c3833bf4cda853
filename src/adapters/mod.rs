//! Platform adapters for reservation and rating providers.
//!
//! Each adapter is a thin typed client over one external platform. The
//! orchestrators only see the traits defined here, so sweeps and detection
//! are testable with in-memory doubles.

mod google;
mod infatuation;
mod michelin;
mod opentable;
mod resy;
mod sevenrooms;
mod yelp;

pub use google::GoogleAdapter;
pub use infatuation::InfatuationAdapter;
pub use michelin::MichelinAdapter;
pub use opentable::OpentableAdapter;
pub use resy::ResyAdapter;
pub use sevenrooms::SevenroomsAdapter;
pub use yelp::YelpAdapter;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use thiserror::Error;

use crate::models::{Provider, RatingSource, Venue};

/// User agent sent by all adapter clients.
pub const USER_AGENT: &str = "Mozilla/5.0 (compatible; tablescout/0.4)";

/// Header carrying the per-run session identifier to the outbound proxy so
/// all requests of one run share a network identity.
pub const SESSION_HEADER: &str = "x-proxy-session";

/// Per-run session identifier.
///
/// Generated once per sweep or coverage run and passed explicitly into every
/// adapter built for that run. Deliberately a plain value, never a global.
#[derive(Debug, Clone)]
pub struct SessionId(String);

impl SessionId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Error from an adapter call. Sweeps catch these per item; one failing
/// venue never aborts a batch.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected {platform} response: {message}")]
    UnexpectedResponse {
        platform: &'static str,
        message: String,
    },
}

impl AdapterError {
    pub fn unexpected(platform: &'static str, message: impl Into<String>) -> Self {
        AdapterError::UnexpectedResponse {
            platform,
            message: message.into(),
        }
    }
}

pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Build the reqwest client shared by all adapters of a run.
pub(crate) fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .gzip(true)
        .brotli(true)
        .build()
        .expect("failed to build HTTP client")
}

/// Geographic bias point for platform searches.
#[derive(Debug, Clone, Copy)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn from_venue(venue: &Venue) -> Option<Self> {
        match (venue.lat, venue.lng) {
            (Some(lat), Some(lng)) => Some(Self { lat, lng }),
            _ => None,
        }
    }
}

/// One result from a platform search.
#[derive(Debug, Clone)]
pub struct SearchCandidate {
    pub external_id: String,
    pub name: String,
    pub rating: Option<f64>,
    pub url: Option<String>,
}

/// Venue detail content from a platform lookup.
#[derive(Debug, Clone)]
pub struct VenueDetails {
    pub external_id: String,
    pub name: String,
    pub rating: Option<f64>,
    pub url: Option<String>,
    /// Free text describing house reservation policies, when the platform
    /// exposes one. Input to the policy-text extractor.
    pub policy_text: Option<String>,
}

/// Response of a direct-read availability query.
#[derive(Debug, Clone)]
pub struct AvailabilitySnapshot {
    pub has_bookable_slot: bool,
    /// The platform's stated maximum days-in-advance, when reported.
    pub max_days_in_advance: Option<i64>,
}

/// Response of a calendar-read query.
#[derive(Debug, Clone)]
pub struct CalendarWindow {
    /// Last calendar day with inventory inside the queried window.
    pub last_calendar_day: Option<NaiveDate>,
}

/// Kind of an availability slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotKind {
    /// Instantly bookable, confirmable without approval.
    Book,
    /// Request-only or waitlist. Never counts as bookable.
    Request,
}

/// One availability slot within a day.
#[derive(Debug, Clone)]
pub struct Slot {
    pub kind: SlotKind,
    pub time: Option<NaiveTime>,
}

/// Availability of a single day within a probed window.
#[derive(Debug, Clone)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub slots: Vec<Slot>,
}

impl DayAvailability {
    pub fn has_bookable_slot(&self) -> bool {
        self.slots.iter().any(|s| s.kind == SlotKind::Book)
    }
}

/// Search and lookup surface common to all reservation platforms.
#[async_trait]
pub trait PlatformAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    async fn search(
        &self,
        query: &str,
        bias: Option<GeoPoint>,
    ) -> AdapterResult<Vec<SearchCandidate>>;

    async fn lookup(&self, external_id: &str) -> AdapterResult<Option<VenueDetails>>;
}

/// Platforms whose availability response states the booking horizon
/// directly (OpenTable-like).
#[async_trait]
pub trait DirectAvailability: Send + Sync {
    async fn availability(
        &self,
        external_id: &str,
        date: NaiveDate,
        party_size: u32,
    ) -> AdapterResult<AvailabilitySnapshot>;
}

/// Platforms with a calendar endpoint reporting the last day with
/// inventory in a bounded window (Resy-like).
#[async_trait]
pub trait CalendarAvailability: Send + Sync {
    async fn calendar(
        &self,
        external_id: &str,
        party_size: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AdapterResult<CalendarWindow>;
}

/// Platforms that only answer "which days in this small window have slots"
/// (SevenRooms-like). The probe search is built on this oracle.
#[async_trait]
pub trait WindowedAvailability: Send + Sync {
    async fn availability_window(
        &self,
        external_id: &str,
        start: NaiveDate,
        num_days: u32,
        party_size: u32,
    ) -> AdapterResult<Vec<DayAvailability>>;
}

/// What a rating adapter observed for one venue.
#[derive(Debug, Clone, Default)]
pub struct RatingObservation {
    pub external_id: Option<String>,
    pub rating: Option<f64>,
    pub rating_max: Option<f64>,
    pub review_count: Option<i64>,
    pub external_url: Option<String>,
    pub notes: Option<String>,
    /// Freshly observed hours-of-operation, written back to the venue.
    pub hours: Option<serde_json::Value>,
    pub permanently_closed: Option<bool>,
}

/// Auxiliary context a rating adapter needs beyond the venue row.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub city: Option<String>,
    /// Editorial-guide region for the venue's city, when configured.
    pub michelin_region: Option<String>,
}

/// Audit surface of a rating source. `Ok(None)` means the adapter ran but
/// found no match this time.
#[async_trait]
pub trait RatingAdapter: Send + Sync {
    fn source(&self) -> RatingSource;

    async fn audit(
        &self,
        venue: &Venue,
        known_external_id: Option<&str>,
        ctx: &AuditContext,
    ) -> AdapterResult<Option<RatingObservation>>;
}
