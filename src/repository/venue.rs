//! Venue repository.
//!
//! Venues are owned by the surrounding tracker app; this subsystem reads
//! them and writes back the reservation block and observed facts.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rusqlite::{params, Connection, Row};

use super::{parse_datetime, parse_datetime_opt, to_option, Result};
use crate::models::{OpeningPattern, Provider, ReservationFields, Venue};

/// SQLite-backed venue repository.
pub struct VenueRepository {
    db_path: PathBuf,
}

impl VenueRepository {
    pub fn new(db_path: &Path) -> Result<Self> {
        let repo = Self {
            db_path: db_path.to_path_buf(),
        };
        repo.init_schema()?;
        Ok(repo)
    }

    fn connect(&self) -> Result<Connection> {
        super::connect(&self.db_path)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS venues (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                lat REAL,
                lng REAL,
                city TEXT,
                website_url TEXT,
                google_place_id TEXT,
                michelin_slug TEXT,
                hours TEXT,
                permanently_closed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                res_provider TEXT,
                res_external_id TEXT,
                res_booking_url TEXT,
                res_opening_window_days INTEGER,
                res_opening_time TEXT,
                res_opening_pattern TEXT,
                res_last_available_date TEXT,
                res_last_checked_at TEXT,
                res_last_success_at TEXT,
                res_last_status TEXT,
                res_notes TEXT
            );
        "#,
        )?;
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Venue> {
        let hours: Option<String> = row.get("hours")?;
        Ok(Venue {
            id: row.get("id")?,
            name: row.get("name")?,
            lat: row.get("lat")?,
            lng: row.get("lng")?,
            city: row.get("city")?,
            website_url: row.get("website_url")?,
            google_place_id: row.get("google_place_id")?,
            michelin_slug: row.get("michelin_slug")?,
            hours: hours.and_then(|h| serde_json::from_str(&h).ok()),
            permanently_closed: row.get::<_, i64>("permanently_closed")? != 0,
            created_at: parse_datetime(&row.get::<_, String>("created_at")?),
            reservation: ReservationFields {
                provider: row
                    .get::<_, Option<String>>("res_provider")?
                    .and_then(|s| Provider::from_str(&s)),
                external_id: row.get("res_external_id")?,
                booking_url: row.get("res_booking_url")?,
                opening_window_days: row.get("res_opening_window_days")?,
                opening_time: row
                    .get::<_, Option<String>>("res_opening_time")?
                    .and_then(|s| s.parse().ok()),
                opening_pattern: row
                    .get::<_, Option<String>>("res_opening_pattern")?
                    .and_then(|s| OpeningPattern::from_str(&s)),
                last_available_date: row
                    .get::<_, Option<String>>("res_last_available_date")?
                    .and_then(|s| NaiveDate::parse_from_str(&s, "%Y-%m-%d").ok()),
                last_checked_at: parse_datetime_opt(row.get("res_last_checked_at")?),
                last_successful_check_at: parse_datetime_opt(row.get("res_last_success_at")?),
                last_check_status: row.get("res_last_status")?,
                check_notes: row.get("res_notes")?,
            },
        })
    }

    /// Get a venue by id.
    pub fn get(&self, id: &str) -> Result<Option<Venue>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM venues WHERE id = ?")?;
        to_option(stmt.query_row(params![id], Self::from_row))
    }

    /// Get all venues.
    pub fn get_all(&self) -> Result<Vec<Venue>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM venues ORDER BY created_at")?;
        let venues = stmt
            .query_map([], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(venues)
    }

    /// Save a venue (insert or update all fields).
    pub fn save(&self, venue: &Venue) -> Result<()> {
        let conn = self.connect()?;
        let hours = venue
            .hours
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let r = &venue.reservation;
        conn.execute(
            r#"
            INSERT INTO venues (
                id, name, lat, lng, city, website_url, google_place_id,
                michelin_slug, hours, permanently_closed, created_at,
                res_provider, res_external_id, res_booking_url,
                res_opening_window_days, res_opening_time, res_opening_pattern,
                res_last_available_date, res_last_checked_at, res_last_success_at,
                res_last_status, res_notes
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11,
                    ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                lat = excluded.lat,
                lng = excluded.lng,
                city = excluded.city,
                website_url = excluded.website_url,
                google_place_id = excluded.google_place_id,
                michelin_slug = excluded.michelin_slug,
                hours = excluded.hours,
                permanently_closed = excluded.permanently_closed,
                res_provider = excluded.res_provider,
                res_external_id = excluded.res_external_id,
                res_booking_url = excluded.res_booking_url,
                res_opening_window_days = excluded.res_opening_window_days,
                res_opening_time = excluded.res_opening_time,
                res_opening_pattern = excluded.res_opening_pattern,
                res_last_available_date = excluded.res_last_available_date,
                res_last_checked_at = excluded.res_last_checked_at,
                res_last_success_at = excluded.res_last_success_at,
                res_last_status = excluded.res_last_status,
                res_notes = excluded.res_notes
            "#,
            params![
                venue.id,
                venue.name,
                venue.lat,
                venue.lng,
                venue.city,
                venue.website_url,
                venue.google_place_id,
                venue.michelin_slug,
                hours,
                venue.permanently_closed as i64,
                venue.created_at.to_rfc3339(),
                r.provider.map(|p| p.as_str()),
                r.external_id,
                r.booking_url,
                r.opening_window_days,
                r.opening_time.map(|t| t.format("%H:%M:%S").to_string()),
                r.opening_pattern.map(|p| p.as_str()),
                r.last_available_date.map(|d| d.format("%Y-%m-%d").to_string()),
                r.last_checked_at.map(|dt| dt.to_rfc3339()),
                r.last_successful_check_at.map(|dt| dt.to_rfc3339()),
                r.last_check_status,
                r.check_notes,
            ],
        )?;
        Ok(())
    }

    /// Write only the reservation block back onto an existing venue.
    pub fn update_reservation(&self, venue_id: &str, r: &ReservationFields) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            UPDATE venues SET
                res_provider = ?2,
                res_external_id = ?3,
                res_booking_url = ?4,
                res_opening_window_days = ?5,
                res_opening_time = ?6,
                res_opening_pattern = ?7,
                res_last_available_date = ?8,
                res_last_checked_at = ?9,
                res_last_success_at = ?10,
                res_last_status = ?11,
                res_notes = ?12
            WHERE id = ?1
            "#,
            params![
                venue_id,
                r.provider.map(|p| p.as_str()),
                r.external_id,
                r.booking_url,
                r.opening_window_days,
                r.opening_time.map(|t| t.format("%H:%M:%S").to_string()),
                r.opening_pattern.map(|p| p.as_str()),
                r.last_available_date.map(|d| d.format("%Y-%m-%d").to_string()),
                r.last_checked_at.map(|dt| dt.to_rfc3339()),
                r.last_successful_check_at.map(|dt| dt.to_rfc3339()),
                r.last_check_status,
                r.check_notes,
            ],
        )?;
        Ok(())
    }

    /// Write observed facts (hours, permanently-closed) from a rating adapter.
    pub fn update_observed(
        &self,
        venue_id: &str,
        hours: Option<&serde_json::Value>,
        permanently_closed: Option<bool>,
    ) -> Result<()> {
        let conn = self.connect()?;
        if let Some(hours) = hours {
            conn.execute(
                "UPDATE venues SET hours = ?2 WHERE id = ?1",
                params![venue_id, serde_json::to_string(hours)?],
            )?;
        }
        if let Some(closed) = permanently_closed {
            conn.execute(
                "UPDATE venues SET permanently_closed = ?2 WHERE id = ?1",
                params![venue_id, closed as i64],
            )?;
        }
        Ok(())
    }
}
