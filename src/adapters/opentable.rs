//! OpenTable platform adapter.
//!
//! The availability response states the platform's maximum days-in-advance
//! directly, so horizon discovery needs a single call here.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::debug;

use super::{
    build_client, AdapterResult, AvailabilitySnapshot, DirectAvailability, GeoPoint,
    PlatformAdapter, SearchCandidate, SessionId, VenueDetails, SESSION_HEADER,
};
use crate::models::Provider;

/// OpenTable API client.
pub struct OpentableAdapter {
    client: reqwest::Client,
    base_url: String,
    session: SessionId,
}

impl OpentableAdapter {
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
struct SearchResponse {
    #[serde(default)]
    restaurants: Vec<Restaurant>,
}

#[derive(Deserialize)]
struct Restaurant {
    rid: i64,
    name: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    reserve_url: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct AvailabilityResponse {
    #[serde(default)]
    days_in_advance: Option<i64>,
    #[serde(default)]
    times: Vec<TimeSlot>,
}

#[derive(Deserialize)]
struct TimeSlot {
    #[serde(default)]
    #[allow(dead_code)]
    time: Option<String>,
}

#[async_trait]
impl PlatformAdapter for OpentableAdapter {
    fn provider(&self) -> Provider {
        Provider::Opentable
    }

    async fn search(
        &self,
        query: &str,
        bias: Option<GeoPoint>,
    ) -> AdapterResult<Vec<SearchCandidate>> {
        let mut request = self.get("/api/v2/restaurants/search").query(&[("term", query)]);
        if let Some(geo) = bias {
            request = request.query(&[("latitude", geo.lat), ("longitude", geo.lng)]);
        }

        let response: SearchResponse = request.send().await?.error_for_status()?.json().await?;
        debug!(query, results = response.restaurants.len(), "opentable search");

        Ok(response
            .restaurants
            .into_iter()
            .map(|r| SearchCandidate {
                external_id: r.rid.to_string(),
                name: r.name,
                rating: r.rating,
                url: r.reserve_url,
            })
            .collect())
    }

    async fn lookup(&self, external_id: &str) -> AdapterResult<Option<VenueDetails>> {
        let response = self
            .get(&format!("/api/v2/restaurants/{external_id}"))
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let restaurant: Restaurant = response.error_for_status()?.json().await?;

        Ok(Some(VenueDetails {
            external_id: restaurant.rid.to_string(),
            name: restaurant.name,
            rating: restaurant.rating,
            url: restaurant.reserve_url,
            policy_text: restaurant.description,
        }))
    }
}

#[async_trait]
impl DirectAvailability for OpentableAdapter {
    async fn availability(
        &self,
        external_id: &str,
        date: NaiveDate,
        party_size: u32,
    ) -> AdapterResult<AvailabilitySnapshot> {
        let response: AvailabilityResponse = self
            .get(&format!("/api/v2/restaurants/{external_id}/availability"))
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .query(&[("party_size", party_size)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            external_id,
            days_in_advance = ?response.days_in_advance,
            "opentable availability"
        );

        Ok(AvailabilitySnapshot {
            has_bookable_slot: !response.times.is_empty(),
            max_days_in_advance: response.days_in_advance,
        })
    }
}
