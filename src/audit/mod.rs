//! Scheduled coverage audits.
//!
//! Venues accumulate one audit row per provider; a sweep drains the due rows
//! for one provider under that provider's batch cap. Items are processed
//! sequentially so external APIs see a predictable request rate, and every
//! per-item failure is caught, recorded, and skipped past. Only failures of
//! the sweep machinery itself (the due query) abort a run.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::adapters::{AuditContext, RatingAdapter};
use crate::config::Config;
use crate::detection::DetectionEngine;
use crate::models::{
    AuditProvider, AuditStatus, EditorialHint, RatingRecord, ReservationDetectionResult, Venue,
};
use crate::repository::{AuditRepository, RatingRepository, VenueRepository};
use crate::utils::flatten_error;

/// Outcome counts of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepSummary {
    pub updated: u64,
    pub not_found: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl SweepSummary {
    pub fn processed(&self) -> u64 {
        self.updated + self.not_found + self.skipped + self.failed
    }
}

impl std::fmt::Display for SweepSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} updated, {} not found, {} skipped, {} failed",
            self.updated, self.not_found, self.skipped, self.failed
        )
    }
}

/// Re-detection surface the reservation sweep runs against.
#[async_trait]
pub trait ReservationDetector: Send + Sync {
    async fn redetect(
        &self,
        venue: &Venue,
        hint: Option<&EditorialHint>,
        today: chrono::NaiveDate,
    ) -> anyhow::Result<ReservationDetectionResult>;
}

#[async_trait]
impl ReservationDetector for DetectionEngine {
    async fn redetect(
        &self,
        venue: &Venue,
        hint: Option<&EditorialHint>,
        today: chrono::NaiveDate,
    ) -> anyhow::Result<ReservationDetectionResult> {
        self.detect(venue, venue.website_url.as_deref(), hint, today)
            .await
    }
}

/// Sweep and coverage orchestrator.
pub struct AuditEngine {
    venues: Arc<VenueRepository>,
    ratings: Arc<RatingRepository>,
    audits: Arc<AuditRepository>,
    rating_adapters: HashMap<AuditProvider, Arc<dyn RatingAdapter>>,
    detector: Arc<dyn ReservationDetector>,
    config: Arc<Config>,
}

impl AuditEngine {
    pub fn new(
        venues: Arc<VenueRepository>,
        ratings: Arc<RatingRepository>,
        audits: Arc<AuditRepository>,
        rating_adapters: HashMap<AuditProvider, Arc<dyn RatingAdapter>>,
        detector: Arc<dyn ReservationDetector>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            venues,
            ratings,
            audits,
            rating_adapters,
            detector,
            config,
        }
    }

    /// Run one sweep for a provider: drain its due rows up to the batch cap
    /// (or an explicit smaller limit), one item at a time.
    pub async fn run_sweep(
        &self,
        provider: AuditProvider,
        now: DateTime<Utc>,
        limit: Option<usize>,
    ) -> anyhow::Result<SweepSummary> {
        let cap = limit
            .map(|l| l.min(provider.batch_cap()))
            .unwrap_or_else(|| provider.batch_cap());
        let due = self
            .audits
            .due(provider, now, cap)
            .context("failed to select due audits")?;

        info!(
            provider = provider.as_str(),
            due = due.len(),
            cap,
            "starting audit sweep"
        );

        let mut summary = SweepSummary::default();
        for (i, record) in due.iter().enumerate() {
            // The mapping service throttles bursts; pace its items.
            if provider == AuditProvider::Google && i > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.sweep.google_delay_ms))
                    .await;
            }

            let venue = match self.venues.get(&record.venue_id)? {
                Some(v) => v,
                None => {
                    warn!(venue = %record.venue_id, "audit row has no venue, skipping");
                    summary.skipped += 1;
                    continue;
                }
            };

            let outcome = match provider {
                AuditProvider::Reservation => self.audit_reservation(&venue, now).await,
                _ => {
                    self.audit_rating(provider, &venue, record.external_id.as_deref(), now)
                        .await
                }
            };

            match outcome {
                Ok(AuditStatus::Success) => summary.updated += 1,
                Ok(AuditStatus::NotFound) => summary.not_found += 1,
                Ok(AuditStatus::Failed) => summary.failed += 1,
                Err(err) => {
                    // One bad item never aborts the batch.
                    let flat = flatten_error(&err);
                    warn!(
                        venue = %venue.id,
                        provider = provider.as_str(),
                        error = %flat,
                        "audit item failed"
                    );
                    self.audits
                        .mark_failed(&venue.id, provider, &flat, now)?;
                    summary.failed += 1;
                }
            }
        }

        info!(provider = provider.as_str(), %summary, "audit sweep finished");
        Ok(summary)
    }

    async fn audit_rating(
        &self,
        provider: AuditProvider,
        venue: &Venue,
        known_external_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AuditStatus> {
        let adapter = self
            .rating_adapters
            .get(&provider)
            .with_context(|| format!("no adapter configured for {}", provider.as_str()))?;
        let source = provider
            .rating_source()
            .with_context(|| format!("{} is not a rating provider", provider.as_str()))?;

        let policy = self.config.city_policy(venue.city.as_deref());
        let ctx = AuditContext {
            city: venue.city.clone(),
            michelin_region: policy.michelin_region,
        };

        let observation = adapter
            .audit(venue, known_external_id, &ctx)
            .await
            .with_context(|| format!("{} audit failed", provider.as_str()))?;

        let observation = match observation {
            Some(obs) => obs,
            None => {
                self.audits
                    .mark_audited(&venue.id, provider, AuditStatus::NotFound, None, now)?;
                return Ok(AuditStatus::NotFound);
            }
        };

        self.ratings.upsert(&RatingRecord {
            venue_id: venue.id.clone(),
            source,
            rating: observation.rating,
            rating_max: observation.rating_max,
            notes: observation.notes,
            review_count: observation.review_count,
            external_url: observation.external_url,
            external_id: observation.external_id.clone(),
            fetched_at: now,
        })?;
        self.venues.update_observed(
            &venue.id,
            observation.hours.as_ref(),
            observation.permanently_closed,
        )?;
        self.audits.mark_audited(
            &venue.id,
            provider,
            AuditStatus::Success,
            observation.external_id.as_deref(),
            now,
        )?;
        Ok(AuditStatus::Success)
    }

    async fn audit_reservation(
        &self,
        venue: &Venue,
        now: DateTime<Utc>,
    ) -> anyhow::Result<AuditStatus> {
        // Re-detection carries the previous decision forward as a weak hint
        // so a flaky website scan cannot erase a known booking URL.
        let hint = venue.reservation.provider.map(|p| EditorialHint {
            platform_name: Some(p.as_str().to_string()),
            reservation_url: venue.reservation.booking_url.clone(),
        });

        match self
            .detector
            .redetect(venue, hint.as_ref(), now.date_naive())
            .await
        {
            Ok(result) => {
                let mut fields = venue.reservation.clone();
                fields.apply(&result, now);
                self.venues.update_reservation(&venue.id, &fields)?;
                self.audits.mark_audited(
                    &venue.id,
                    AuditProvider::Reservation,
                    AuditStatus::Success,
                    result.external_id.as_deref(),
                    now,
                )?;
                Ok(AuditStatus::Success)
            }
            Err(err) => {
                // Record that a check was attempted even though it failed.
                let mut fields = venue.reservation.clone();
                fields.last_checked_at = Some(now);
                fields.last_check_status = Some("error".to_string());
                fields.check_notes = Some(flatten_error(&err));
                self.venues.update_reservation(&venue.id, &fields)?;
                Err(err)
            }
        }
    }

    /// Bring a venue under coverage: run reservation detection right away
    /// and seed audit rows for every provider the venue's city policy names.
    pub async fn initiate_coverage(
        &self,
        venue_id: &str,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Vec<AuditProvider>> {
        let venue = self
            .venues
            .get(venue_id)?
            .with_context(|| format!("unknown venue {venue_id}"))?;
        let policy = self.config.city_policy(venue.city.as_deref());

        let mut scheduled = Vec::new();
        for provider in policy.providers {
            if provider == AuditProvider::Michelin && policy.michelin_region.is_none() {
                info!(venue = venue_id, "city has no guide region, skipping guide audit");
                continue;
            }
            self.audits.ensure_scheduled(venue_id, provider, now)?;
            scheduled.push(provider);
        }

        // First detection runs immediately rather than waiting for a sweep;
        // a failure here leaves the seeded schedule to retry it.
        if scheduled.contains(&AuditProvider::Reservation) {
            if let Err(err) = self.audit_reservation(&venue, now).await {
                warn!(
                    venue = venue_id,
                    error = %flatten_error(&err),
                    "initial reservation detection failed"
                );
                self.audits.mark_failed(
                    venue_id,
                    AuditProvider::Reservation,
                    &flatten_error(&err),
                    now,
                )?;
            }
        }

        // Categorization is owned by the surrounding tracker; request it
        // best-effort so new venues get tagged without blocking coverage.
        info!(venue = venue_id, "categorization requested");

        info!(
            venue = venue_id,
            providers = scheduled.len(),
            "coverage initiated"
        );
        Ok(scheduled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::adapters::{AdapterError, AdapterResult, RatingObservation};
    use crate::models::RatingSource;

    struct Fixture {
        _dir: tempfile::TempDir,
        venues: Arc<VenueRepository>,
        ratings: Arc<RatingRepository>,
        audits: Arc<AuditRepository>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("test.db");
        Fixture {
            venues: Arc::new(VenueRepository::new(&db).unwrap()),
            ratings: Arc::new(RatingRepository::new(&db).unwrap()),
            audits: Arc::new(AuditRepository::new(&db).unwrap()),
            _dir: dir,
        }
    }

    /// Rating adapter double failing for a configurable set of venue ids.
    struct FlakyAdapter {
        source: RatingSource,
        fail_for: Vec<String>,
        audited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RatingAdapter for FlakyAdapter {
        fn source(&self) -> RatingSource {
            self.source
        }

        async fn audit(
            &self,
            venue: &Venue,
            _known_external_id: Option<&str>,
            _ctx: &AuditContext,
        ) -> AdapterResult<Option<RatingObservation>> {
            self.audited.lock().unwrap().push(venue.id.clone());
            if self.fail_for.contains(&venue.id) {
                return Err(AdapterError::unexpected("yelp", "HTTP 503"));
            }
            Ok(Some(RatingObservation {
                external_id: Some(format!("ext-{}", venue.id)),
                rating: Some(4.0),
                rating_max: Some(5.0),
                ..Default::default()
            }))
        }
    }

    /// Detector double returning a fixed result or error.
    struct FixedDetector {
        fail: bool,
        hints: Mutex<Vec<Option<EditorialHint>>>,
    }

    #[async_trait]
    impl ReservationDetector for FixedDetector {
        async fn redetect(
            &self,
            _venue: &Venue,
            hint: Option<&EditorialHint>,
            _today: chrono::NaiveDate,
        ) -> anyhow::Result<ReservationDetectionResult> {
            self.hints.lock().unwrap().push(hint.cloned());
            if self.fail {
                anyhow::bail!("enrichment failed");
            }
            let mut result = ReservationDetectionResult {
                provider: Some(crate::models::Provider::Resy),
                external_id: Some("slug".to_string()),
                ..Default::default()
            };
            result.signal("ok");
            Ok(result)
        }
    }

    fn engine(
        fx: &Fixture,
        adapter: Arc<dyn RatingAdapter>,
        detector: Arc<dyn ReservationDetector>,
    ) -> AuditEngine {
        let mut adapters: HashMap<AuditProvider, Arc<dyn RatingAdapter>> = HashMap::new();
        adapters.insert(AuditProvider::Yelp, adapter);
        AuditEngine::new(
            fx.venues.clone(),
            fx.ratings.clone(),
            fx.audits.clone(),
            adapters,
            detector,
            Arc::new(Config::default()),
        )
    }

    fn seed_venues(fx: &Fixture, provider: AuditProvider, now: DateTime<Utc>, n: usize) {
        for i in 0..n {
            let venue = Venue::new(format!("v{i}"), format!("Venue {i}"));
            fx.venues.save(&venue).unwrap();
            fx.audits.ensure_scheduled(&venue.id, provider, now).unwrap();
        }
    }

    #[tokio::test]
    async fn test_one_failure_never_aborts_the_batch() {
        let fx = fixture();
        let now = Utc::now();
        seed_venues(&fx, AuditProvider::Yelp, now - chrono::Duration::hours(1), 5);

        let adapter = Arc::new(FlakyAdapter {
            source: RatingSource::Yelp,
            fail_for: vec!["v2".to_string()],
            audited: Mutex::new(vec![]),
        });
        let engine = engine(
            &fx,
            adapter.clone(),
            Arc::new(FixedDetector {
                fail: false,
                hints: Mutex::new(vec![]),
            }),
        );

        let summary = engine.run_sweep(AuditProvider::Yelp, now, None).await.unwrap();
        assert_eq!(summary.updated, 4);
        assert_eq!(summary.failed, 1);
        assert_eq!(adapter.audited.lock().unwrap().len(), 5);

        // The failed row kept its stale schedule and stays due.
        let row = fx.audits.get("v2", AuditProvider::Yelp).unwrap().unwrap();
        assert_eq!(row.status, AuditStatus::Failed);
        assert!(row.next_audit_at.is_some());
        assert!(row.last_error.as_deref().unwrap().contains("HTTP 503"));

        // Successful rows rescheduled past now and wrote a rating.
        let row = fx.audits.get("v1", AuditProvider::Yelp).unwrap().unwrap();
        assert!(row.next_audit_at.unwrap() > now);
        assert!(fx.ratings.get("v1", RatingSource::Yelp).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_respects_explicit_limit() {
        let fx = fixture();
        let now = Utc::now();
        seed_venues(&fx, AuditProvider::Yelp, now - chrono::Duration::hours(1), 5);

        let engine = engine(
            &fx,
            Arc::new(FlakyAdapter {
                source: RatingSource::Yelp,
                fail_for: vec![],
                audited: Mutex::new(vec![]),
            }),
            Arc::new(FixedDetector {
                fail: false,
                hints: Mutex::new(vec![]),
            }),
        );

        let summary = engine.run_sweep(AuditProvider::Yelp, now, Some(2)).await.unwrap();
        assert_eq!(summary.processed(), 2);
        assert_eq!(fx.audits.due_count(AuditProvider::Yelp, now).unwrap(), 3);
    }

    #[tokio::test]
    async fn test_missing_venue_is_skipped() {
        let fx = fixture();
        let now = Utc::now();
        fx.audits
            .ensure_scheduled("ghost", AuditProvider::Yelp, now - chrono::Duration::hours(1))
            .unwrap();

        let engine = engine(
            &fx,
            Arc::new(FlakyAdapter {
                source: RatingSource::Yelp,
                fail_for: vec![],
                audited: Mutex::new(vec![]),
            }),
            Arc::new(FixedDetector {
                fail: false,
                hints: Mutex::new(vec![]),
            }),
        );

        let summary = engine.run_sweep(AuditProvider::Yelp, now, None).await.unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.processed(), 1);
    }

    #[tokio::test]
    async fn test_reservation_sweep_persists_and_reschedules() {
        let fx = fixture();
        let now = Utc::now();
        let venue = Venue::new("v1".to_string(), "Le Bistro".to_string());
        fx.venues.save(&venue).unwrap();
        fx.audits
            .ensure_scheduled("v1", AuditProvider::Reservation, now - chrono::Duration::hours(1))
            .unwrap();

        let engine = engine(
            &fx,
            Arc::new(FlakyAdapter {
                source: RatingSource::Yelp,
                fail_for: vec![],
                audited: Mutex::new(vec![]),
            }),
            Arc::new(FixedDetector {
                fail: false,
                hints: Mutex::new(vec![]),
            }),
        );

        let summary = engine
            .run_sweep(AuditProvider::Reservation, now, None)
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);

        let stored = fx.venues.get("v1").unwrap().unwrap();
        assert_eq!(stored.reservation.provider, Some(crate::models::Provider::Resy));
        assert_eq!(stored.reservation.external_id.as_deref(), Some("slug"));
        assert!(stored.reservation.last_checked_at.is_some());

        let row = fx.audits.get("v1", AuditProvider::Reservation).unwrap().unwrap();
        assert_eq!(row.status, AuditStatus::Success);
        assert!(row.next_audit_at.unwrap() > now);
    }

    #[tokio::test]
    async fn test_failed_redetection_still_marks_attempt() {
        let fx = fixture();
        let now = Utc::now();
        let mut venue = Venue::new("v1".to_string(), "Le Bistro".to_string());
        venue.reservation.provider = Some(crate::models::Provider::Resy);
        venue.reservation.booking_url = Some("https://resy.com/cities/ny/slug".to_string());
        fx.venues.save(&venue).unwrap();
        fx.audits
            .ensure_scheduled("v1", AuditProvider::Reservation, now - chrono::Duration::hours(1))
            .unwrap();

        let detector = Arc::new(FixedDetector {
            fail: true,
            hints: Mutex::new(vec![]),
        });
        let engine = engine(
            &fx,
            Arc::new(FlakyAdapter {
                source: RatingSource::Yelp,
                fail_for: vec![],
                audited: Mutex::new(vec![]),
            }),
            detector.clone(),
        );

        let summary = engine
            .run_sweep(AuditProvider::Reservation, now, None)
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);

        // The attempt is visible on the venue even though detection failed.
        let stored = fx.venues.get("v1").unwrap().unwrap();
        assert!(stored.reservation.last_checked_at.is_some());
        assert_eq!(stored.reservation.last_check_status.as_deref(), Some("error"));
        assert!(stored.reservation.last_successful_check_at.is_none());

        // The previous decision fed back in as a hint.
        let hints = detector.hints.lock().unwrap();
        let hint = hints[0].as_ref().unwrap();
        assert_eq!(hint.platform_name.as_deref(), Some("resy"));
    }

    #[tokio::test]
    async fn test_initiate_coverage_seeds_city_providers() {
        let fx = fixture();
        let now = Utc::now();
        let mut venue = Venue::new("v1".to_string(), "Le Bistro".to_string());
        venue.city = Some("Lisbon".to_string());
        fx.venues.save(&venue).unwrap();

        let engine = engine(
            &fx,
            Arc::new(FlakyAdapter {
                source: RatingSource::Yelp,
                fail_for: vec![],
                audited: Mutex::new(vec![]),
            }),
            Arc::new(FixedDetector {
                fail: false,
                hints: Mutex::new(vec![]),
            }),
        );

        let scheduled = engine.initiate_coverage("v1", now).await.unwrap();
        // Default policy: no guide region, so no guide audit.
        assert!(!scheduled.contains(&AuditProvider::Michelin));
        assert!(scheduled.contains(&AuditProvider::Google));
        assert!(scheduled.contains(&AuditProvider::Reservation));

        // Detection ran immediately and the rows are seeded due-now.
        let stored = fx.venues.get("v1").unwrap().unwrap();
        assert_eq!(stored.reservation.provider, Some(crate::models::Provider::Resy));
        assert!(fx
            .audits
            .get("v1", AuditProvider::Google)
            .unwrap()
            .unwrap()
            .next_audit_at
            .is_some());
    }
}
