//! End-to-end coverage lifecycle over a real SQLite database: initiate
//! coverage for a venue, drain sweeps with stub adapters, and verify the
//! schedule advances the way the TTLs say it should.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use tablescout::adapters::{AdapterResult, AuditContext, RatingAdapter, RatingObservation};
use tablescout::audit::{AuditEngine, ReservationDetector};
use tablescout::config::Config;
use tablescout::models::{
    AuditProvider, AuditStatus, EditorialHint, Provider, RatingSource,
    ReservationDetectionResult, Venue,
};
use tablescout::repository::{AuditRepository, RatingRepository, VenueRepository};

struct StubRatings {
    source: RatingSource,
}

#[async_trait]
impl RatingAdapter for StubRatings {
    fn source(&self) -> RatingSource {
        self.source
    }

    async fn audit(
        &self,
        venue: &Venue,
        _known_external_id: Option<&str>,
        _ctx: &AuditContext,
    ) -> AdapterResult<Option<RatingObservation>> {
        Ok(Some(RatingObservation {
            external_id: Some(format!("{}-{}", self.source.as_str(), venue.id)),
            rating: Some(4.2),
            rating_max: Some(5.0),
            review_count: Some(100),
            ..Default::default()
        }))
    }
}

struct StubDetector;

#[async_trait]
impl ReservationDetector for StubDetector {
    async fn redetect(
        &self,
        _venue: &Venue,
        _hint: Option<&EditorialHint>,
        _today: chrono::NaiveDate,
    ) -> anyhow::Result<ReservationDetectionResult> {
        Ok(ReservationDetectionResult {
            provider: Some(Provider::Opentable),
            external_id: Some("4242".to_string()),
            booking_url: Some("https://www.opentable.com/r/le-bistro".to_string()),
            opening_window_days: Some(30),
            ..Default::default()
        })
    }
}

fn build(
    dir: &tempfile::TempDir,
) -> (
    Arc<VenueRepository>,
    Arc<RatingRepository>,
    Arc<AuditRepository>,
    AuditEngine,
) {
    let db = dir.path().join("test.db");
    let venues = Arc::new(VenueRepository::new(&db).unwrap());
    let ratings = Arc::new(RatingRepository::new(&db).unwrap());
    let audits = Arc::new(AuditRepository::new(&db).unwrap());

    let mut adapters: HashMap<AuditProvider, Arc<dyn RatingAdapter>> = HashMap::new();
    adapters.insert(
        AuditProvider::Google,
        Arc::new(StubRatings {
            source: RatingSource::Google,
        }),
    );
    adapters.insert(
        AuditProvider::Yelp,
        Arc::new(StubRatings {
            source: RatingSource::Yelp,
        }),
    );
    adapters.insert(
        AuditProvider::Infatuation,
        Arc::new(StubRatings {
            source: RatingSource::Infatuation,
        }),
    );

    let engine = AuditEngine::new(
        venues.clone(),
        ratings.clone(),
        audits.clone(),
        adapters,
        Arc::new(StubDetector),
        Arc::new(Config::default()),
    );
    (venues, ratings, audits, engine)
}

#[tokio::test]
async fn coverage_then_sweeps_reach_steady_state() {
    let dir = tempfile::tempdir().unwrap();
    let (venues, ratings, audits, engine) = build(&dir);
    let now = Utc::now();

    let mut venue = Venue::new("bistro".to_string(), "Le Bistro".to_string());
    venue.city = Some("New York".to_string());
    venue.website_url = Some("https://lebistro.example".to_string());
    venues.save(&venue).unwrap();

    // Coverage initiation seeds the default provider set and runs the first
    // reservation detection inline.
    let scheduled = engine.initiate_coverage("bistro", now).await.unwrap();
    assert_eq!(scheduled.len(), 4);

    let stored = venues.get("bistro").unwrap().unwrap();
    assert_eq!(stored.reservation.provider, Some(Provider::Opentable));
    assert_eq!(stored.reservation.opening_window_days, Some(30));
    assert_eq!(
        stored.reservation.last_check_status.as_deref(),
        Some("detected:opentable")
    );

    // The inline detection already rescheduled the reservation row, so only
    // the three rating providers are still due.
    let later = now + Duration::minutes(1);
    for provider in [
        AuditProvider::Google,
        AuditProvider::Yelp,
        AuditProvider::Infatuation,
    ] {
        let summary = engine.run_sweep(provider, later, None).await.unwrap();
        assert_eq!(summary.updated, 1, "{} sweep", provider.as_str());
    }
    let summary = engine
        .run_sweep(AuditProvider::Reservation, later, None)
        .await
        .unwrap();
    assert_eq!(summary.processed(), 0);

    // Ratings landed, one row per source.
    assert_eq!(ratings.get_for_venue("bistro").unwrap().len(), 3);
    let google = ratings.get("bistro", RatingSource::Google).unwrap().unwrap();
    assert_eq!(google.rating, Some(4.2));
    assert_eq!(google.external_id.as_deref(), Some("google-bistro"));

    // Every row is rescheduled at its provider's TTL; nothing is due until
    // the shortest TTL elapses.
    for provider in scheduled {
        let row = audits.get("bistro", provider).unwrap().unwrap();
        assert_eq!(row.status, AuditStatus::Success);
        let next = row.next_audit_at.unwrap();
        assert!(next > later + Duration::days(provider.ttl_days() - 1));
    }
    assert_eq!(audits.due_count(AuditProvider::Google, later).unwrap(), 0);

    // A week later the mapping-service row is due again, the monthly ones
    // are not.
    let week_later = later + Duration::days(7) + Duration::minutes(1);
    assert_eq!(audits.due_count(AuditProvider::Google, week_later).unwrap(), 1);
    assert_eq!(
        audits.due_count(AuditProvider::Infatuation, week_later).unwrap(),
        0
    );
}
