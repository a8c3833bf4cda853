//! Michelin guide rating adapter.
//!
//! The guide has no public API; listings are scraped from the regional guide
//! site. A venue is only auditable when its city has a configured guide
//! region, so callers check `AuditContext::michelin_region` before invoking.

use std::time::Duration;

use async_trait::async_trait;
use scraper::{Html, Selector};
use tracing::debug;

use super::{
    build_client, AdapterError, AdapterResult, AuditContext, RatingAdapter, RatingObservation,
    SessionId, SESSION_HEADER,
};
use crate::models::{RatingSource, Venue};

/// Michelin guide site client.
pub struct MichelinAdapter {
    client: reqwest::Client,
    base_url: String,
    session: SessionId,
}

/// Award labels, best first. The numeric rating is the star count; Bib
/// Gourmand and Selected carry no stars but are still worth recording.
const AWARDS: [(&str, f64); 5] = [
    ("Three Stars", 3.0),
    ("Two Stars", 2.0),
    ("One Star", 1.0),
    ("Bib Gourmand", 0.0),
    ("Selected", 0.0),
];

impl MichelinAdapter {
    pub fn new(base_url: impl Into<String>, session: SessionId, timeout: Duration) -> Self {
        Self {
            client: build_client(timeout),
            base_url: base_url.into(),
            session,
        }
    }

    async fn fetch(&self, path: &str) -> AdapterResult<Option<String>> {
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .header(SESSION_HEADER, self.session.as_str())
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.text().await?))
    }

    /// Find a venue's guide slug in the region's search results.
    fn parse_search(html: &str, venue_name: &str) -> AdapterResult<Option<String>> {
        let document = Html::parse_document(html);
        let card = Selector::parse("a.restaurant-card")
            .map_err(|e| AdapterError::unexpected("michelin", e.to_string()))?;
        let title = Selector::parse(".restaurant-card__title")
            .map_err(|e| AdapterError::unexpected("michelin", e.to_string()))?;

        let wanted = venue_name.to_lowercase();
        for element in document.select(&card) {
            let name = element
                .select(&title)
                .next()
                .map(|t| t.text().collect::<String>())
                .unwrap_or_default();
            if name.trim().to_lowercase() == wanted {
                if let Some(href) = element.value().attr("href") {
                    let slug = href.trim_end_matches('/').rsplit('/').next();
                    return Ok(slug.map(|s| s.to_string()));
                }
            }
        }
        Ok(None)
    }

    fn parse_award(html: &str) -> Option<(&'static str, f64)> {
        AWARDS
            .iter()
            .find(|(label, _)| html.contains(label))
            .map(|(label, stars)| (*label, *stars))
    }
}

#[async_trait]
impl RatingAdapter for MichelinAdapter {
    fn source(&self) -> RatingSource {
        RatingSource::Michelin
    }

    async fn audit(
        &self,
        venue: &Venue,
        known_external_id: Option<&str>,
        ctx: &AuditContext,
    ) -> AdapterResult<Option<RatingObservation>> {
        let slug = match known_external_id
            .map(|s| s.to_string())
            .or_else(|| venue.michelin_slug.clone())
        {
            Some(slug) => slug,
            None => {
                let region = match &ctx.michelin_region {
                    Some(r) => r.clone(),
                    // No guide region for this city; nothing to search.
                    None => return Ok(None),
                };
                let query = urlencoding::encode(&venue.name);
                let path = format!("/{region}/en/restaurants?q={query}");
                let html = match self.fetch(&path).await? {
                    Some(html) => html,
                    None => return Ok(None),
                };
                match Self::parse_search(&html, &venue.name)? {
                    Some(slug) => slug,
                    None => {
                        debug!(venue = %venue.name, %region, "michelin: no listing match");
                        return Ok(None);
                    }
                }
            }
        };

        let path = format!("/en/restaurant/{slug}");
        let html = match self.fetch(&path).await? {
            Some(html) => html,
            None => return Ok(None),
        };

        let award = Self::parse_award(&html);
        debug!(venue = %venue.name, %slug, ?award, "michelin listing");

        Ok(Some(RatingObservation {
            external_url: Some(format!("{}{}", self.base_url, path)),
            external_id: Some(slug),
            rating: award.map(|(_, stars)| stars),
            rating_max: Some(3.0),
            notes: award.map(|(label, _)| label.to_string()),
            ..Default::default()
        }))
    }
}
