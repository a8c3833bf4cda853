//! Google Places rating adapter.
//!
//! Highest-volume, cheapest source: audited weekly with the largest batch
//! cap. Also the source of hours-of-operation and permanently-closed flags.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    build_client, AdapterResult, AuditContext, RatingAdapter, RatingObservation, SessionId,
    SESSION_HEADER,
};
use crate::models::{RatingSource, Venue};

/// Google Places API client.
pub struct GoogleAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SessionId,
}

impl GoogleAdapter {
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

    async fn find_place_id(&self, venue: &Venue) -> AdapterResult<Option<String>> {
        let mut query = venue.name.clone();
        if let Some(city) = &venue.city {
            query.push_str(", ");
            query.push_str(city);
        }

        let mut request = self
            .client
            .get(format!("{}/maps/api/place/textsearch/json", self.base_url))
            .header(SESSION_HEADER, self.session.as_str())
            .query(&[("query", query.as_str()), ("key", self.api_key.as_str())]);
        if let (Some(lat), Some(lng)) = (venue.lat, venue.lng) {
            request = request.query(&[("location", format!("{lat},{lng}"))]);
        }

        let response: TextSearchResponse =
            request.send().await?.error_for_status()?.json().await?;
        Ok(response.results.into_iter().next().map(|r| r.place_id))
    }

    async fn details(&self, place_id: &str) -> AdapterResult<Option<PlaceDetails>> {
        let response: DetailsResponse = self
            .client
            .get(format!("{}/maps/api/place/details/json", self.base_url))
            .header(SESSION_HEADER, self.session.as_str())
            .query(&[
                ("place_id", place_id),
                (
                    "fields",
                    "rating,user_ratings_total,url,opening_hours,business_status",
                ),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.result)
    }
}

#[derive(Deserialize)]
struct TextSearchResponse {
    #[serde(default)]
    results: Vec<TextSearchResult>,
}

#[derive(Deserialize)]
struct TextSearchResult {
    place_id: String,
}

#[derive(Deserialize)]
struct DetailsResponse {
    result: Option<PlaceDetails>,
}

#[derive(Deserialize)]
struct PlaceDetails {
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    user_ratings_total: Option<i64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    opening_hours: Option<serde_json::Value>,
    #[serde(default)]
    business_status: Option<String>,
}

#[async_trait]
impl RatingAdapter for GoogleAdapter {
    fn source(&self) -> RatingSource {
        RatingSource::Google
    }

    async fn audit(
        &self,
        venue: &Venue,
        known_external_id: Option<&str>,
        _ctx: &AuditContext,
    ) -> AdapterResult<Option<RatingObservation>> {
        // A known place id skips the search round trip.
        let place_id = match known_external_id
            .map(|s| s.to_string())
            .or_else(|| venue.google_place_id.clone())
        {
            Some(id) => id,
            None => match self.find_place_id(venue).await? {
                Some(id) => id,
                None => {
                    debug!(venue = %venue.name, "google: no place match");
                    return Ok(None);
                }
            },
        };

        let details = match self.details(&place_id).await? {
            Some(d) => d,
            None => return Ok(None),
        };

        Ok(Some(RatingObservation {
            external_id: Some(place_id),
            rating: details.rating,
            rating_max: Some(5.0),
            review_count: details.user_ratings_total,
            external_url: details.url,
            notes: None,
            hours: details.opening_hours,
            permanently_closed: details
                .business_status
                .map(|s| s == "CLOSED_PERMANENTLY"),
        }))
    }
}
