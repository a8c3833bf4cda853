//! Audit repository.
//!
//! One row per (venue, provider) tracking the re-check lifecycle. Due-ness is
//! `next_audit_at <= now`; a null `next_audit_at` means the row is parked
//! until something writes a new schedule.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::{parse_datetime_opt, to_option, Result};
use crate::models::{AuditProvider, AuditRecord, AuditStatus};

/// SQLite-backed audit repository.
pub struct AuditRepository {
    db_path: PathBuf,
}

impl AuditRepository {
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
            CREATE TABLE IF NOT EXISTS audits (
                venue_id TEXT NOT NULL,
                provider TEXT NOT NULL,
                external_id TEXT,
                status TEXT NOT NULL,
                last_error TEXT,
                last_audited_at TEXT,
                next_audit_at TEXT,
                PRIMARY KEY (venue_id, provider)
            );
            CREATE INDEX IF NOT EXISTS idx_audits_due
                ON audits (provider, next_audit_at);
        "#,
        )?;
        Ok(())
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
        Ok(AuditRecord {
            venue_id: row.get("venue_id")?,
            provider: AuditProvider::from_str(&row.get::<_, String>("provider")?)
                .unwrap_or(AuditProvider::Google),
            external_id: row.get("external_id")?,
            status: AuditStatus::from_str(&row.get::<_, String>("status")?)
                .unwrap_or(AuditStatus::Failed),
            last_error: row.get("last_error")?,
            last_audited_at: parse_datetime_opt(row.get("last_audited_at")?),
            next_audit_at: parse_datetime_opt(row.get("next_audit_at")?),
        })
    }

    /// Get the audit row for a (venue, provider) pair.
    pub fn get(&self, venue_id: &str, provider: AuditProvider) -> Result<Option<AuditRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT * FROM audits WHERE venue_id = ? AND provider = ?")?;
        to_option(stmt.query_row(params![venue_id, provider.as_str()], Self::from_row))
    }

    /// Select rows due for re-audit, oldest first, capped at `limit`.
    pub fn due(
        &self,
        provider: AuditProvider,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<AuditRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT * FROM audits
            WHERE provider = ? AND next_audit_at IS NOT NULL AND next_audit_at <= ?
            ORDER BY next_audit_at ASC
            LIMIT ?
            "#,
        )?;
        let rows = stmt
            .query_map(
                params![provider.as_str(), now.to_rfc3339(), limit as i64],
                Self::from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Count rows currently due for a provider.
    pub fn due_count(&self, provider: AuditProvider, now: DateTime<Utc>) -> Result<u64> {
        let conn = self.connect()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audits
             WHERE provider = ? AND next_audit_at IS NOT NULL AND next_audit_at <= ?",
            params![provider.as_str(), now.to_rfc3339()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Insert or update the single row for (venue, provider).
    pub fn upsert(&self, record: &AuditRecord) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO audits (
                venue_id, provider, external_id, status,
                last_error, last_audited_at, next_audit_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(venue_id, provider) DO UPDATE SET
                external_id = excluded.external_id,
                status = excluded.status,
                last_error = excluded.last_error,
                last_audited_at = excluded.last_audited_at,
                next_audit_at = excluded.next_audit_at
            "#,
            params![
                record.venue_id,
                record.provider.as_str(),
                record.external_id,
                record.status.as_str(),
                record.last_error,
                record.last_audited_at.map(|dt| dt.to_rfc3339()),
                record.next_audit_at.map(|dt| dt.to_rfc3339()),
            ],
        )?;
        Ok(())
    }

    /// Record a terminal (success or not_found) audit and schedule the next
    /// check at `now + ttl` for the provider.
    pub fn mark_audited(
        &self,
        venue_id: &str,
        provider: AuditProvider,
        status: AuditStatus,
        external_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let next = now + chrono::Duration::days(provider.ttl_days());
        self.upsert(&AuditRecord {
            venue_id: venue_id.to_string(),
            provider,
            external_id: external_id.map(|s| s.to_string()),
            status,
            last_error: None,
            last_audited_at: Some(now),
            next_audit_at: Some(next),
        })
    }

    /// Record a failed audit without advancing `next_audit_at`.
    ///
    /// An existing row keeps its stale schedule so the next sweep retries it.
    /// A row created here (first contact failed) gets a null schedule and
    /// stays parked until a coverage run re-seeds it.
    pub fn mark_failed(
        &self,
        venue_id: &str,
        provider: AuditProvider,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            r#"
            UPDATE audits SET status = ?3, last_error = ?4, last_audited_at = ?5
            WHERE venue_id = ?1 AND provider = ?2
            "#,
            params![
                venue_id,
                provider.as_str(),
                AuditStatus::Failed.as_str(),
                error,
                now.to_rfc3339(),
            ],
        )?;
        if updated == 0 {
            conn.execute(
                r#"
                INSERT INTO audits (
                    venue_id, provider, external_id, status,
                    last_error, last_audited_at, next_audit_at
                )
                VALUES (?1, ?2, NULL, ?3, ?4, ?5, NULL)
                "#,
                params![
                    venue_id,
                    provider.as_str(),
                    AuditStatus::Failed.as_str(),
                    error,
                    now.to_rfc3339(),
                ],
            )?;
        }
        Ok(())
    }

    /// Seed a due-now audit row if none exists for the pair.
    pub fn ensure_scheduled(
        &self,
        venue_id: &str,
        provider: AuditProvider,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            r#"
            INSERT INTO audits (venue_id, provider, external_id, status,
                                last_error, last_audited_at, next_audit_at)
            VALUES (?1, ?2, NULL, ?3, NULL, NULL, ?4)
            ON CONFLICT(venue_id, provider) DO NOTHING
            "#,
            params![
                venue_id,
                provider.as_str(),
                AuditStatus::NotFound.as_str(),
                now.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn temp_repo() -> (tempfile::TempDir, AuditRepository) {
        let dir = tempfile::tempdir().unwrap();
        let repo = AuditRepository::new(&dir.path().join("test.db")).unwrap();
        (dir, repo)
    }

    #[test]
    fn test_due_selection_respects_cap_and_cutoff() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();

        for i in 0..5 {
            repo.upsert(&AuditRecord {
                venue_id: format!("v{i}"),
                provider: AuditProvider::Google,
                external_id: None,
                status: AuditStatus::Success,
                last_error: None,
                last_audited_at: Some(now - Duration::days(8)),
                next_audit_at: Some(now - Duration::hours(i + 1)),
            })
            .unwrap();
        }
        // Not yet due.
        repo.upsert(&AuditRecord {
            venue_id: "future".to_string(),
            provider: AuditProvider::Google,
            external_id: None,
            status: AuditStatus::Success,
            last_error: None,
            last_audited_at: Some(now),
            next_audit_at: Some(now + Duration::days(7)),
        })
        .unwrap();

        let due = repo.due(AuditProvider::Google, now, 3).unwrap();
        assert_eq!(due.len(), 3);
        // Oldest schedule first.
        assert_eq!(due[0].venue_id, "v4");
        assert_eq!(repo.due_count(AuditProvider::Google, now).unwrap(), 5);
    }

    #[test]
    fn test_mark_failed_preserves_schedule() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();
        let stale = now - Duration::days(1);

        repo.upsert(&AuditRecord {
            venue_id: "v1".to_string(),
            provider: AuditProvider::Yelp,
            external_id: Some("yelp-1".to_string()),
            status: AuditStatus::Success,
            last_error: None,
            last_audited_at: Some(stale),
            next_audit_at: Some(stale),
        })
        .unwrap();

        repo.mark_failed("v1", AuditProvider::Yelp, "HTTP 503", now)
            .unwrap();

        let row = repo.get("v1", AuditProvider::Yelp).unwrap().unwrap();
        assert_eq!(row.status, AuditStatus::Failed);
        assert_eq!(row.last_error.as_deref(), Some("HTTP 503"));
        // Schedule untouched: the row is still due and retried next sweep.
        assert_eq!(row.next_audit_at, Some(stale));
        assert_eq!(row.external_id.as_deref(), Some("yelp-1"));
        assert_eq!(repo.due(AuditProvider::Yelp, now, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_mark_failed_first_contact_parks_row() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();

        repo.mark_failed("v1", AuditProvider::Michelin, "timeout", now)
            .unwrap();

        let row = repo.get("v1", AuditProvider::Michelin).unwrap().unwrap();
        assert_eq!(row.status, AuditStatus::Failed);
        assert!(row.next_audit_at.is_none());
        assert!(repo.due(AuditProvider::Michelin, now, 10).unwrap().is_empty());
    }

    #[test]
    fn test_ensure_scheduled_does_not_clobber() {
        let (_dir, repo) = temp_repo();
        let now = Utc::now();
        let later = now + Duration::days(30);

        repo.mark_audited("v1", AuditProvider::Google, AuditStatus::Success, Some("g1"), now)
            .unwrap();
        repo.ensure_scheduled("v1", AuditProvider::Google, later).unwrap();

        let row = repo.get("v1", AuditProvider::Google).unwrap().unwrap();
        assert_eq!(row.status, AuditStatus::Success);
        assert_eq!(row.external_id.as_deref(), Some("g1"));
    }
}
