//! SevenRooms platform adapter.
//!
//! The only availability primitive is a small windowed query returning the
//! slots of 1-3 consecutive days. Slots are typed: only "book" slots are
//! instantly bookable; "request" slots need approval and never count. The
//! adaptive probe search is built on this oracle.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use tracing::debug;

use super::{
    build_client, AdapterResult, DayAvailability, GeoPoint, PlatformAdapter, SearchCandidate,
    SessionId, Slot, SlotKind, VenueDetails, WindowedAvailability, SESSION_HEADER,
};
use crate::models::Provider;

/// SevenRooms widget API client.
pub struct SevenroomsAdapter {
    client: reqwest::Client,
    base_url: String,
    session: SessionId,
}

impl SevenroomsAdapter {
    pub fn new(base_url: impl Into<String>, session: SessionId, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            session,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header(SESSION_HEADER, self.session.as_str())
    }
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct SearchData {
    #[serde(default)]
    venues: Vec<VenueHit>,
}

#[derive(Deserialize)]
struct VenueHit {
    url_key: String,
    name: String,
}

#[derive(Deserialize)]
struct VenueData {
    url_key: String,
    name: String,
    #[serde(default)]
    reservation_notes: Option<String>,
}

#[derive(Deserialize)]
struct RangeData {
    /// date -> slots for that date.
    #[serde(default)]
    availability: BTreeMap<NaiveDate, Vec<RawSlot>>,
}

#[derive(Deserialize)]
struct RawSlot {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    time: Option<String>,
}

#[async_trait]
impl PlatformAdapter for SevenroomsAdapter {
    fn provider(&self) -> Provider {
        Provider::Sevenrooms
    }

    async fn search(
        &self,
        query: &str,
        _bias: Option<GeoPoint>,
    ) -> AdapterResult<Vec<SearchCandidate>> {
        let response: Envelope<SearchData> = self
            .get("/api-yoa/venues/search")
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(query, hits = response.data.venues.len(), "sevenrooms search");

        Ok(response
            .data
            .venues
            .into_iter()
            .map(|hit| SearchCandidate {
                external_id: hit.url_key,
                name: hit.name,
                rating: None,
                url: None,
            })
            .collect())
    }

    async fn lookup(&self, external_id: &str) -> AdapterResult<Option<VenueDetails>> {
        let response = self
            .get("/api-yoa/venues")
            .query(&[("venue", external_id)])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let venue: Envelope<VenueData> = response.error_for_status()?.json().await?;

        Ok(Some(VenueDetails {
            external_id: venue.data.url_key,
            name: venue.data.name,
            rating: None,
            url: None,
            policy_text: venue.data.reservation_notes,
        }))
    }
}

#[async_trait]
impl WindowedAvailability for SevenroomsAdapter {
    async fn availability_window(
        &self,
        external_id: &str,
        start: NaiveDate,
        num_days: u32,
        party_size: u32,
    ) -> AdapterResult<Vec<DayAvailability>> {
        let response: Envelope<RangeData> = self
            .get("/api-yoa/availability/widget/range")
            .query(&[("venue", external_id)])
            .query(&[("start_date", start.format("%Y-%m-%d").to_string())])
            .query(&[("num_days", num_days), ("party_size", party_size)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let days: Vec<DayAvailability> = response
            .data
            .availability
            .into_iter()
            .map(|(date, slots)| DayAvailability {
                date,
                slots: slots
                    .into_iter()
                    .map(|raw| Slot {
                        kind: if raw.kind.eq_ignore_ascii_case("book") {
                            SlotKind::Book
                        } else {
                            SlotKind::Request
                        },
                        time: raw
                            .time
                            .and_then(|t| NaiveTime::parse_from_str(&t, "%H:%M").ok()),
                    })
                    .collect(),
            })
            .collect();

        debug!(external_id, %start, num_days, days = days.len(), "sevenrooms window");
        Ok(days)
    }
}
