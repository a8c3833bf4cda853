//! Reservation signal fusion.
//!
//! Combines editorial-guide hints, website classification, and platform
//! enrichment into one detection result under a strict precedence order:
//! the website scan overrides the editorial hint field-by-field, and a
//! platform's own horizon answer overrides anything parsed from prose.

pub mod hints;
pub mod horizon;
pub mod policy_text;

use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::adapters::{
    CalendarAvailability, DirectAvailability, GeoPoint, PlatformAdapter, WindowedAvailability,
};
use crate::classifier::WebsiteClassifier;
use crate::models::{
    DetectionSource, EditorialHint, Provider, ReservationDetectionResult, Venue,
};

/// Resy-like platform surface: search/lookup plus a calendar endpoint.
pub trait CalendarPlatform: PlatformAdapter + CalendarAvailability {}
impl<T: PlatformAdapter + CalendarAvailability> CalendarPlatform for T {}

/// OpenTable-like platform surface: search/lookup plus direct availability.
pub trait DirectPlatform: PlatformAdapter + DirectAvailability {}
impl<T: PlatformAdapter + DirectAvailability> DirectPlatform for T {}

/// SevenRooms-like platform surface: search/lookup plus the windowed oracle.
pub trait WindowedPlatform: PlatformAdapter + WindowedAvailability {}
impl<T: PlatformAdapter + WindowedAvailability> WindowedPlatform for T {}

/// Signal fusion orchestrator.
pub struct DetectionEngine {
    classifier: Arc<dyn WebsiteClassifier>,
    resy: Arc<dyn CalendarPlatform>,
    opentable: Arc<dyn DirectPlatform>,
    sevenrooms: Arc<dyn WindowedPlatform>,
}

impl DetectionEngine {
    pub fn new(
        classifier: Arc<dyn WebsiteClassifier>,
        resy: Arc<dyn CalendarPlatform>,
        opentable: Arc<dyn DirectPlatform>,
        sevenrooms: Arc<dyn WindowedPlatform>,
    ) -> Self {
        Self {
            classifier,
            resy,
            opentable,
            sevenrooms,
        }
    }

    /// Detect the reservation provider and booking horizon for a venue.
    ///
    /// Expected absences (no hint, no website, no platform match) are
    /// recorded as signals, never errors; only infrastructure failures from
    /// the enrichment adapters propagate. The caller still persists a
    /// "check attempted" marker in that case.
    pub async fn detect(
        &self,
        venue: &Venue,
        website_url: Option<&str>,
        editorial_hint: Option<&EditorialHint>,
        today: NaiveDate,
    ) -> anyhow::Result<ReservationDetectionResult> {
        let mut result = ReservationDetectionResult::default();

        self.apply_editorial_hint(editorial_hint, &mut result);
        self.apply_website_scan(website_url, &mut result).await;

        match result.provider {
            Some(provider) if provider.is_enrichable() => {
                self.enrich(venue, provider, today, &mut result)
                    .await
                    .with_context(|| {
                        format!("{} enrichment failed for {}", provider.as_str(), venue.id)
                    })?;
            }
            Some(provider) => {
                result.signal(format!(
                    "provider {} has no enrichment adapter",
                    provider.as_str()
                ));
            }
            None => result.signal("no provider resolved, skipping enrichment"),
        }

        info!(
            venue = %venue.id,
            provider = ?result.provider.map(|p| p.as_str()),
            source = ?result.source.map(|s| s.as_str()),
            window = ?result.opening_window_days,
            "reservation detection complete"
        );
        Ok(result)
    }

    /// Stage 1: weak signal from an editorial guide listing.
    fn apply_editorial_hint(
        &self,
        hint: Option<&EditorialHint>,
        result: &mut ReservationDetectionResult,
    ) {
        let hint = match hint {
            Some(h) => h,
            None => {
                result.signal("no editorial hint available");
                return;
            }
        };

        if let Some(name) = &hint.platform_name {
            match hints::map_platform_name(name) {
                Some(provider) => {
                    result.provider = Some(provider);
                    result.source = Some(DetectionSource::EditorialHint);
                    result.signal(format!(
                        "editorial hint \"{name}\" mapped to {}",
                        provider.as_str()
                    ));
                }
                None => result.signal(format!("editorial hint \"{name}\" not recognized")),
            }
        }

        if let Some(url) = hint.reservation_url.as_deref() {
            result.booking_url = Some(url.to_string());
            // Id extraction only makes sense once this stage has a provider.
            if let Some(provider) = result.provider {
                match hints::extract_external_id(provider, url) {
                    Some(id) => {
                        result.signal(format!("external id \"{id}\" extracted from editorial url"));
                        result.external_id = Some(id);
                    }
                    None => result.signal("editorial url had no recognizable external id"),
                }
            }
        }
    }

    /// Stage 2: strong signal from website classification. Every field the
    /// classifier returns overrides the editorial value.
    async fn apply_website_scan(
        &self,
        website_url: Option<&str>,
        result: &mut ReservationDetectionResult,
    ) {
        let url = match website_url {
            Some(u) => u,
            None => {
                result.signal("no website url to scan");
                return;
            }
        };

        let guess = self.classifier.scan(url).await;
        result.signals.extend(guess.signals);

        if let Some(provider) = guess.provider {
            result.provider = Some(provider);
            result.source = Some(DetectionSource::WebsiteScan);
        }
        if guess.booking_url.is_some() {
            result.booking_url = guess.booking_url;
        }
        if guess.external_id.is_some() {
            result.external_id = guess.external_id;
        }
        if guess.opening_window_days.is_some() {
            result.opening_window_days = guess.opening_window_days;
        }
        if guess.opening_pattern.is_some() {
            result.opening_pattern = guess.opening_pattern;
        }
        if guess.opening_time.is_some() {
            result.opening_time = guess.opening_time;
        }
    }

    /// Stage 3: platform enrichment for providers with a direct adapter.
    async fn enrich(
        &self,
        venue: &Venue,
        provider: Provider,
        today: NaiveDate,
        result: &mut ReservationDetectionResult,
    ) -> anyhow::Result<()> {
        let platform: &dyn PlatformAdapter = match provider {
            Provider::Resy => self.resy.as_ref(),
            Provider::Opentable => self.opentable.as_ref(),
            Provider::Sevenrooms => self.sevenrooms.as_ref(),
            _ => unreachable!("enrich called for non-enrichable provider"),
        };

        // A known external id is the strongest search key we have.
        let query = result
            .external_id
            .clone()
            .unwrap_or_else(|| venue.name.clone());
        let candidates = platform.search(&query, GeoPoint::from_venue(venue)).await?;

        let candidate = match candidates.into_iter().next() {
            Some(c) => c,
            None => {
                result.signal(format!(
                    "no {} match for \"{query}\", keeping earlier decision",
                    provider.as_str()
                ));
                return Ok(());
            }
        };
        result.signal(format!(
            "matched {} venue \"{}\" ({})",
            provider.as_str(),
            candidate.name,
            candidate.external_id
        ));
        result.external_id = Some(candidate.external_id.clone());
        if result.booking_url.is_none() {
            result.booking_url = candidate.url;
        }

        // Provisional opening policy from the platform's prose.
        if let Some(details) = platform.lookup(&candidate.external_id).await? {
            if let Some(text) = details.policy_text.as_deref() {
                let parsed = policy_text::extract(text);
                if parsed.opening_window_days.is_some() {
                    result.opening_window_days = parsed.opening_window_days;
                    result.signal(format!(
                        "policy text: opens {} days in advance",
                        parsed.opening_window_days.unwrap_or_default()
                    ));
                }
                if parsed.opening_time.is_some() {
                    result.opening_time = parsed.opening_time;
                }
                if parsed.opening_pattern.is_some() {
                    result.opening_pattern = parsed.opening_pattern;
                }
            }
        }

        // The platform's own availability answer beats prose parsing.
        let horizon = match provider {
            Provider::Resy => {
                horizon::calendar_read(self.resy.as_ref(), &candidate.external_id, today).await?
            }
            Provider::Opentable => {
                horizon::direct_read(self.opentable.as_ref(), &candidate.external_id, today)
                    .await?
            }
            Provider::Sevenrooms => {
                horizon::probe_search(self.sevenrooms.as_ref(), &candidate.external_id, today)
                    .await?
            }
            _ => unreachable!(),
        };

        if horizon.is_known() {
            result.opening_window_days = horizon.opening_window_days;
            result.last_available_date = horizon.last_available_date;
            result.signal(format!(
                "horizon: bookable through {} ({} days)",
                horizon
                    .last_available_date
                    .map(|d| d.to_string())
                    .unwrap_or_default(),
                horizon.opening_window_days.unwrap_or_default()
            ));
            if provider == Provider::Resy
                && horizon.opening_window_days == Some(horizon::CALENDAR_LOOKAHEAD_DAYS)
            {
                result.signal("calendar horizon saturates the lookahead, true horizon may be longer");
            }
        } else {
            result.signal("horizon discovery found no bookable dates");
        }
        debug!(venue = %venue.id, provider = provider.as_str(), "enrichment complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;

    use crate::adapters::{
        AdapterResult, AvailabilitySnapshot, CalendarWindow, DayAvailability, SearchCandidate,
        VenueDetails,
    };
    use crate::classifier::ClassifierGuess;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn venue() -> Venue {
        let mut v = Venue::new("v1".to_string(), "Le Bistro".to_string());
        v.city = Some("New York".to_string());
        v
    }

    /// Classifier double returning a fixed guess.
    struct FixedClassifier {
        guess: ClassifierGuess,
    }

    #[async_trait]
    impl WebsiteClassifier for FixedClassifier {
        async fn scan(&self, _url: &str) -> ClassifierGuess {
            self.guess.clone()
        }
    }

    /// Platform double: records searches, returns a fixed candidate list and
    /// a fixed horizon answer through all three availability surfaces.
    struct FixedPlatform {
        provider: Provider,
        candidates: Vec<SearchCandidate>,
        policy_text: Option<String>,
        last_day: Option<NaiveDate>,
        searches: std::sync::Mutex<Vec<String>>,
    }

    impl FixedPlatform {
        fn new(provider: Provider) -> Self {
            Self {
                provider,
                candidates: vec![],
                policy_text: None,
                last_day: None,
                searches: std::sync::Mutex::new(vec![]),
            }
        }

        fn with_candidate(mut self, id: &str, name: &str) -> Self {
            self.candidates.push(SearchCandidate {
                external_id: id.to_string(),
                name: name.to_string(),
                rating: None,
                url: None,
            });
            self
        }
    }

    #[async_trait]
    impl PlatformAdapter for FixedPlatform {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn search(
            &self,
            query: &str,
            _bias: Option<GeoPoint>,
        ) -> AdapterResult<Vec<SearchCandidate>> {
            self.searches.lock().unwrap().push(query.to_string());
            Ok(self.candidates.clone())
        }

        async fn lookup(&self, external_id: &str) -> AdapterResult<Option<VenueDetails>> {
            Ok(Some(VenueDetails {
                external_id: external_id.to_string(),
                name: "Le Bistro".to_string(),
                rating: None,
                url: None,
                policy_text: self.policy_text.clone(),
            }))
        }
    }

    #[async_trait]
    impl CalendarAvailability for FixedPlatform {
        async fn calendar(
            &self,
            _external_id: &str,
            _party_size: u32,
            _start: NaiveDate,
            _end: NaiveDate,
        ) -> AdapterResult<CalendarWindow> {
            Ok(CalendarWindow {
                last_calendar_day: self.last_day,
            })
        }
    }

    #[async_trait]
    impl DirectAvailability for FixedPlatform {
        async fn availability(
            &self,
            _external_id: &str,
            _date: NaiveDate,
            _party_size: u32,
        ) -> AdapterResult<AvailabilitySnapshot> {
            Ok(AvailabilitySnapshot {
                has_bookable_slot: self.last_day.is_some(),
                max_days_in_advance: self.last_day.map(|d| (d - today()).num_days()),
            })
        }
    }

    #[async_trait]
    impl WindowedAvailability for FixedPlatform {
        async fn availability_window(
            &self,
            _external_id: &str,
            start: NaiveDate,
            num_days: u32,
            _party_size: u32,
        ) -> AdapterResult<Vec<DayAvailability>> {
            let mut days = Vec::new();
            for i in 0..num_days as i64 {
                let date = start + Duration::days(i);
                let slots = if self.last_day.map(|c| date <= c).unwrap_or(false) {
                    vec![crate::adapters::Slot {
                        kind: crate::adapters::SlotKind::Book,
                        time: None,
                    }]
                } else {
                    vec![]
                };
                days.push(DayAvailability { date, slots });
            }
            Ok(days)
        }
    }

    fn engine(
        guess: ClassifierGuess,
        resy: FixedPlatform,
        opentable: FixedPlatform,
        sevenrooms: FixedPlatform,
    ) -> DetectionEngine {
        DetectionEngine::new(
            Arc::new(FixedClassifier { guess }),
            Arc::new(resy),
            Arc::new(opentable),
            Arc::new(sevenrooms),
        )
    }

    #[tokio::test]
    async fn test_website_scan_overrides_editorial_hint() {
        let guess = ClassifierGuess {
            provider: Some(Provider::Opentable),
            booking_url: Some("https://www.opentable.com/r/le-bistro".to_string()),
            ..Default::default()
        };
        let opentable = FixedPlatform::new(Provider::Opentable)
            .with_candidate("4242", "Le Bistro");
        let engine = engine(
            guess,
            FixedPlatform::new(Provider::Resy),
            opentable,
            FixedPlatform::new(Provider::Sevenrooms),
        );

        let hint = EditorialHint {
            platform_name: Some("Resy".to_string()),
            reservation_url: None,
        };
        let result = engine
            .detect(&venue(), Some("https://lebistro.example"), Some(&hint), today())
            .await
            .unwrap();

        assert_eq!(result.provider, Some(Provider::Opentable));
        assert_eq!(result.source, Some(DetectionSource::WebsiteScan));
    }

    #[tokio::test]
    async fn test_editorial_only_resy_flow() {
        let resy = FixedPlatform::new(Provider::Resy).with_candidate("some-slug", "Le Bistro");
        let engine = engine(
            ClassifierGuess::default(),
            resy,
            FixedPlatform::new(Provider::Opentable),
            FixedPlatform::new(Provider::Sevenrooms),
        );

        let hint = EditorialHint {
            platform_name: Some("Resy".to_string()),
            reservation_url: Some("https://resy.com/cities/ny/some-slug".to_string()),
        };
        let result = engine.detect(&venue(), None, Some(&hint), today()).await.unwrap();

        assert_eq!(result.provider, Some(Provider::Resy));
        assert_eq!(result.source, Some(DetectionSource::EditorialHint));
        assert_eq!(result.external_id.as_deref(), Some("some-slug"));
    }

    #[tokio::test]
    async fn test_editorial_slug_used_as_search_query() {
        let resy = FixedPlatform::new(Provider::Resy).with_candidate("some-slug", "Le Bistro");
        let searches_handle = Arc::new(resy);
        let engine = DetectionEngine::new(
            Arc::new(FixedClassifier {
                guess: ClassifierGuess::default(),
            }),
            searches_handle.clone(),
            Arc::new(FixedPlatform::new(Provider::Opentable)),
            Arc::new(FixedPlatform::new(Provider::Sevenrooms)),
        );

        let hint = EditorialHint {
            platform_name: Some("Resy".to_string()),
            reservation_url: Some("https://resy.com/cities/ny/some-slug".to_string()),
        };
        engine.detect(&venue(), None, Some(&hint), today()).await.unwrap();

        let searches = searches_handle.searches.lock().unwrap();
        assert_eq!(searches.as_slice(), ["some-slug"]);
    }

    #[tokio::test]
    async fn test_unrecognized_hint_sets_no_provider() {
        let engine = engine(
            ClassifierGuess::default(),
            FixedPlatform::new(Provider::Resy),
            FixedPlatform::new(Provider::Opentable),
            FixedPlatform::new(Provider::Sevenrooms),
        );
        let hint = EditorialHint {
            platform_name: Some("MysteryBookings".to_string()),
            reservation_url: None,
        };
        let result = engine.detect(&venue(), None, Some(&hint), today()).await.unwrap();

        assert_eq!(result.provider, None);
        assert!(result
            .signals
            .iter()
            .any(|s| s.contains("MysteryBookings")));
    }

    #[tokio::test]
    async fn test_non_enrichable_provider_skips_enrichment() {
        let engine = engine(
            ClassifierGuess {
                provider: Some(Provider::Tock),
                ..Default::default()
            },
            FixedPlatform::new(Provider::Resy),
            FixedPlatform::new(Provider::Opentable),
            FixedPlatform::new(Provider::Sevenrooms),
        );
        let result = engine
            .detect(&venue(), Some("https://lebistro.example"), None, today())
            .await
            .unwrap();

        assert_eq!(result.provider, Some(Provider::Tock));
        assert!(result.signals.iter().any(|s| s.contains("no enrichment adapter")));
    }

    #[tokio::test]
    async fn test_no_platform_match_keeps_provider() {
        // Search returns nothing: provider decision stands, horizon stays null.
        let engine = engine(
            ClassifierGuess {
                provider: Some(Provider::Sevenrooms),
                ..Default::default()
            },
            FixedPlatform::new(Provider::Resy),
            FixedPlatform::new(Provider::Opentable),
            FixedPlatform::new(Provider::Sevenrooms),
        );
        let result = engine
            .detect(&venue(), Some("https://lebistro.example"), None, today())
            .await
            .unwrap();

        assert_eq!(result.provider, Some(Provider::Sevenrooms));
        assert_eq!(result.last_available_date, None);
        assert!(result.signals.iter().any(|s| s.contains("no sevenrooms match")));
    }

    #[tokio::test]
    async fn test_horizon_overrides_policy_text() {
        let mut resy = FixedPlatform::new(Provider::Resy).with_candidate("slug", "Le Bistro");
        resy.policy_text = Some(
            "Reservations open 14 days in advance. Tables are available at 9 AM, each new date."
                .to_string(),
        );
        resy.last_day = Some(today() + Duration::days(45));

        let engine = engine(
            ClassifierGuess {
                provider: Some(Provider::Resy),
                ..Default::default()
            },
            resy,
            FixedPlatform::new(Provider::Opentable),
            FixedPlatform::new(Provider::Sevenrooms),
        );
        let result = engine
            .detect(&venue(), Some("https://lebistro.example"), None, today())
            .await
            .unwrap();

        // Calendar answer (45) wins over prose (14); prose still supplies
        // the fields the calendar cannot.
        assert_eq!(result.opening_window_days, Some(45));
        assert_eq!(result.last_available_date, Some(today() + Duration::days(45)));
        assert_eq!(result.opening_time, chrono::NaiveTime::from_hms_opt(9, 0, 0));
        assert_eq!(
            result.opening_pattern,
            Some(crate::models::OpeningPattern::Rolling)
        );
    }
}
