//! Rating repository.
//!
//! Idempotent upsert keyed on (venue_id, source): at most one row per pair,
//! updated in place on every audit, never deleted by this subsystem.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, Row};

use super::{parse_datetime, to_option, Result};
use crate::models::{RatingRecord, RatingSource};

/// SQLite-backed rating repository.
pub struct RatingRepository {
    db_path: PathBuf,
}

impl RatingRepository {
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
            CREATE TABLE IF NOT EXISTS ratings (
                venue_id TEXT NOT NULL,
                source TEXT NOT NULL,
                rating REAL,
                rating_max REAL,
                notes TEXT,
                review_count INTEGER,
                external_url TEXT,
                external_id TEXT,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (venue_id, source)
            );
        "#,
        )?;
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<RatingRecord> {
        Ok(RatingRecord {
            venue_id: row.get("venue_id")?,
            source: RatingSource::from_str(&row.get::<_, String>("source")?)
                .unwrap_or(RatingSource::Google),
            rating: row.get("rating")?,
            rating_max: row.get("rating_max")?,
            notes: row.get("notes")?,
            review_count: row.get("review_count")?,
            external_url: row.get("external_url")?,
            external_id: row.get("external_id")?,
            fetched_at: parse_datetime(&row.get::<_, String>("fetched_at")?),
        })
    }

    /// Get the rating row for a (venue, source) pair.
    pub fn get(&self, venue_id: &str, source: RatingSource) -> Result<Option<RatingRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM ratings WHERE venue_id = ? AND source = ?")?;
        to_option(stmt.query_row(params![venue_id, source.as_str()], Self::from_row))
    }

    /// Get all rating rows for a venue.
    pub fn get_for_venue(&self, venue_id: &str) -> Result<Vec<RatingRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM ratings WHERE venue_id = ? ORDER BY source")?;
        let rows = stmt
            .query_map(params![venue_id], Self::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Insert or update the single row for (venue, source).
    pub fn upsert(&self, record: &RatingRecord) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO ratings (
                venue_id, source, rating, rating_max, notes,
                review_count, external_url, external_id, fetched_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(venue_id, source) DO UPDATE SET
                rating = excluded.rating,
                rating_max = excluded.rating_max,
                notes = excluded.notes,
                review_count = excluded.review_count,
                external_url = excluded.external_url,
                external_id = excluded.external_id,
                fetched_at = excluded.fetched_at
            "#,
            params![
                record.venue_id,
                record.source.as_str(),
                record.rating,
                record.rating_max,
                record.notes,
                record.review_count,
                record.external_url,
                record.external_id,
                record.fetched_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Count rating rows (used by the status command).
    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM ratings", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
