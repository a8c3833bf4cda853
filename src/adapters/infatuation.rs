//! The Infatuation critic rating adapter.
//!
//! Editorial reviews on a 0-10 scale, searched per city. Slow source,
//! audited monthly.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    build_client, AdapterResult, AuditContext, RatingAdapter, RatingObservation, SessionId,
    SESSION_HEADER,
};
use crate::models::{RatingSource, Venue};

/// Infatuation review API client.
pub struct InfatuationAdapter {
    client: reqwest::Client,
    base_url: String,
    session: SessionId,
}

impl InfatuationAdapter {
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
    reviews: Vec<Review>,
}

#[derive(Deserialize)]
struct Review {
    slug: String,
    title: String,
    #[serde(default)]
    rating: Option<f64>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    snippet: Option<String>,
}

#[async_trait]
impl RatingAdapter for InfatuationAdapter {
    fn source(&self) -> RatingSource {
        RatingSource::Infatuation
    }

    async fn audit(
        &self,
        venue: &Venue,
        known_external_id: Option<&str>,
        ctx: &AuditContext,
    ) -> AdapterResult<Option<RatingObservation>> {
        let mut request = self
            .get("/api/v1/reviews")
            .query(&[("query", venue.name.as_str())]);
        if let Some(city) = ctx.city.as_deref().or(venue.city.as_deref()) {
            request = request.query(&[("city", city)]);
        }

        let response: SearchResponse = request.send().await?.error_for_status()?.json().await?;

        // Prefer the previously matched review; otherwise take an exact
        // title match, never a fuzzy first hit (editorial titles collide).
        let review = match known_external_id {
            Some(id) => response.reviews.into_iter().find(|r| r.slug == id),
            None => {
                let wanted = venue.name.to_lowercase();
                response
                    .reviews
                    .into_iter()
                    .find(|r| r.title.to_lowercase() == wanted)
            }
        };

        let review = match review {
            Some(r) => r,
            None => {
                debug!(venue = %venue.name, "infatuation: no review match");
                return Ok(None);
            }
        };

        Ok(Some(RatingObservation {
            external_id: Some(review.slug),
            rating: review.rating,
            rating_max: Some(10.0),
            external_url: review.url,
            notes: review.snippet,
            ..Default::default()
        }))
    }
}
