//! Audit records tracking the re-check lifecycle per (venue, provider).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::RatingSource;

/// Providers covered by scheduled audit sweeps: the four rating sources plus
/// the reservation re-detection sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditProvider {
    Google,
    Michelin,
    Yelp,
    Infatuation,
    Reservation,
}

impl AuditProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditProvider::Google => "google",
            AuditProvider::Michelin => "michelin",
            AuditProvider::Yelp => "yelp",
            AuditProvider::Infatuation => "infatuation",
            AuditProvider::Reservation => "reservation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "google" => Some(AuditProvider::Google),
            "michelin" => Some(AuditProvider::Michelin),
            "yelp" => Some(AuditProvider::Yelp),
            "infatuation" => Some(AuditProvider::Infatuation),
            "reservation" => Some(AuditProvider::Reservation),
            _ => None,
        }
    }

    pub fn all() -> [AuditProvider; 5] {
        [
            AuditProvider::Google,
            AuditProvider::Michelin,
            AuditProvider::Yelp,
            AuditProvider::Infatuation,
            AuditProvider::Reservation,
        ]
    }

    /// Days until the next audit after a successful check.
    pub fn ttl_days(&self) -> i64 {
        match self {
            // Cheap and fast, re-checked weekly.
            AuditProvider::Google => 7,
            AuditProvider::Yelp => 14,
            // Slow or rate-limited sources get a monthly cadence.
            AuditProvider::Michelin => 30,
            AuditProvider::Infatuation => 30,
            AuditProvider::Reservation => 30,
        }
    }

    /// Maximum due rows processed per sweep. Bounds one sweep's wall-clock
    /// time and external API load.
    pub fn batch_cap(&self) -> usize {
        match self {
            AuditProvider::Google => 50,
            _ => 30,
        }
    }

    pub fn rating_source(&self) -> Option<RatingSource> {
        match self {
            AuditProvider::Google => Some(RatingSource::Google),
            AuditProvider::Michelin => Some(RatingSource::Michelin),
            AuditProvider::Yelp => Some(RatingSource::Yelp),
            AuditProvider::Infatuation => Some(RatingSource::Infatuation),
            AuditProvider::Reservation => None,
        }
    }
}

/// Terminal status of the most recent audit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    /// The adapter ran but found no match this time. Not an error; the row
    /// still reschedules normally.
    NotFound,
    Failed,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::NotFound => "not_found",
            AuditStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(AuditStatus::Success),
            "not_found" => Some(AuditStatus::NotFound),
            "failed" => Some(AuditStatus::Failed),
            _ => None,
        }
    }
}

/// One row per (venue, provider). `next_audit_at <= now` makes a row due.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub venue_id: String,
    pub provider: AuditProvider,
    /// Last known external id for this provider, passed back to the adapter
    /// so it can skip re-searching.
    pub external_id: Option<String>,
    pub status: AuditStatus,
    pub last_error: Option<String>,
    pub last_audited_at: Option<DateTime<Utc>>,
    /// When null the row is not rescheduled. Failed audits keep their stale
    /// value so the next sweep picks them up again.
    pub next_audit_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    pub fn new(venue_id: String, provider: AuditProvider) -> Self {
        Self {
            venue_id,
            provider,
            external_id: None,
            status: AuditStatus::NotFound,
            last_error: None,
            last_audited_at: None,
            next_audit_at: Some(Utc::now()),
        }
    }
}
