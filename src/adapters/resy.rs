//! Resy platform adapter.
//!
//! Search and lookup identify a venue by its URL slug; the calendar endpoint
//! reports per-day inventory over a bounded window, which the calendar-read
//! horizon strategy consumes.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use super::{
    build_client, AdapterResult, CalendarAvailability, CalendarWindow, GeoPoint, PlatformAdapter,
    SearchCandidate, SessionId, VenueDetails, SESSION_HEADER,
};
use crate::models::Provider;

/// Resy API client.
pub struct ResyAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SessionId,
}

impl ResyAdapter {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        session: SessionId,
        timeout: Duration,
    ) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            api_key: api_key.into(),
            session,
        }
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("ResyAPI api_key=\"{}\"", self.api_key))
            .header(SESSION_HEADER, self.session.as_str())
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    name: String,
    url_slug: String,
    #[serde(default)]
    rating: Option<f64>,
}

#[derive(Deserialize)]
struct VenueResponse {
    name: String,
    url_slug: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    content: Option<VenueContent>,
}

#[derive(Deserialize)]
struct VenueContent {
    #[serde(default)]
    need_to_know: Option<String>,
    #[serde(default)]
    why_we_like_it: Option<String>,
}

#[derive(Deserialize)]
struct CalendarResponse {
    #[serde(default)]
    scheduled: Vec<CalendarDay>,
}

#[derive(Deserialize)]
struct CalendarDay {
    date: NaiveDate,
    inventory: CalendarInventory,
}

#[derive(Deserialize)]
struct CalendarInventory {
    reservation: String,
}

#[async_trait]
impl PlatformAdapter for ResyAdapter {
    fn provider(&self) -> Provider {
        Provider::Resy
    }

    async fn search(
        &self,
        query: &str,
        bias: Option<GeoPoint>,
    ) -> AdapterResult<Vec<SearchCandidate>> {
        let mut request = self
            .get("/3/venuesearch/search")
            .query(&[("query", query)]);
        if let Some(geo) = bias {
            request = request.query(&[("lat", geo.lat), ("lng", geo.lng)]);
        }

        let response: SearchResponse = request.send().await?.error_for_status()?.json().await?;
        debug!(query, hits = response.hits.len(), "resy search");

        Ok(response
            .hits
            .into_iter()
            .map(|hit| SearchCandidate {
                external_id: hit.url_slug,
                name: hit.name,
                rating: hit.rating,
                url: None,
            })
            .collect())
    }

    async fn lookup(&self, external_id: &str) -> AdapterResult<Option<VenueDetails>> {
        let response = self
            .get("/3/venue")
            .query(&[("url_slug", external_id)])
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let venue: VenueResponse = response.error_for_status()?.json().await?;

        let policy_text = venue.content.and_then(|c| match (c.need_to_know, c.why_we_like_it) {
            (Some(a), Some(b)) => Some(format!("{a}\n{b}")),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        });

        Ok(Some(VenueDetails {
            external_id: venue.url_slug,
            name: venue.name,
            rating: venue.rating,
            url: None,
            policy_text,
        }))
    }
}

#[async_trait]
impl CalendarAvailability for ResyAdapter {
    async fn calendar(
        &self,
        external_id: &str,
        party_size: u32,
        start: NaiveDate,
        end: NaiveDate,
    ) -> AdapterResult<CalendarWindow> {
        let response: CalendarResponse = self
            .get("/4/venue/calendar")
            .query(&[("url_slug", external_id)])
            .query(&[("num_seats", party_size)])
            .query(&[
                ("start_date", start.format("%Y-%m-%d").to_string()),
                ("end_date", end.format("%Y-%m-%d").to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let last_calendar_day = response
            .scheduled
            .iter()
            .filter(|day| day.inventory.reservation == "available")
            .map(|day| day.date)
            .max();
        debug!(external_id, ?last_calendar_day, "resy calendar");

        Ok(CalendarWindow { last_calendar_day })
    }
}
