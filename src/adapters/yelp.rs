//! Yelp Fusion rating adapter.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    build_client, AdapterResult, AuditContext, RatingAdapter, RatingObservation, SessionId,
    SESSION_HEADER,
};
use crate::models::{RatingSource, Venue};

/// Yelp Fusion API client.
pub struct YelpAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    session: SessionId,
}

impl YelpAdapter {
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
            .bearer_auth(&self.api_key)
            .header(SESSION_HEADER, self.session.as_str())
    }

    async fn find_business(&self, venue: &Venue) -> AdapterResult<Option<Business>> {
        let mut request = self
            .get("/v3/businesses/search")
            .query(&[("term", venue.name.as_str()), ("limit", "5")]);
        match (venue.lat, venue.lng) {
            (Some(lat), Some(lng)) => {
                request = request.query(&[("latitude", lat), ("longitude", lng)]);
            }
            _ => {
                if let Some(city) = &venue.city {
                    request = request.query(&[("location", city.as_str())]);
                }
            }
        }

        let response: SearchResponse = request.send().await?.error_for_status()?.json().await?;
        Ok(response.businesses.into_iter().next())
    }

    async fn business(&self, id: &str) -> AdapterResult<Option<Business>> {
        let response = self.get(&format!("/v3/businesses/{id}")).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    businesses: Vec<Business>,
}

#[derive(Deserialize)]
struct Business {
    id: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    review_count: Option<i64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    is_closed: Option<bool>,
    #[serde(default)]
    hours: Option<serde_json::Value>,
}

#[async_trait]
impl RatingAdapter for YelpAdapter {
    fn source(&self) -> RatingSource {
        RatingSource::Yelp
    }

    async fn audit(
        &self,
        venue: &Venue,
        known_external_id: Option<&str>,
        _ctx: &AuditContext,
    ) -> AdapterResult<Option<RatingObservation>> {
        let business = match known_external_id {
            Some(id) => self.business(id).await?,
            None => self.find_business(venue).await?,
        };
        let business = match business {
            Some(b) => b,
            None => {
                debug!(venue = %venue.name, "yelp: no business match");
                return Ok(None);
            }
        };

        Ok(Some(RatingObservation {
            external_id: Some(business.id),
            rating: business.rating,
            rating_max: Some(5.0),
            review_count: business.review_count,
            external_url: business.url,
            notes: None,
            hours: business.hours,
            permanently_closed: business.is_closed,
        }))
    }
}
