//! Editorial hint interpretation.
//!
//! Pure functions mapping guide-supplied platform names and reservation URLs
//! to canonical providers and platform external ids.

use url::Url;

use crate::models::Provider;

/// Map a free-form platform name to a canonical provider by string
/// containment. Unrecognized names map to nothing (the caller records the
/// raw string as a signal).
pub fn map_platform_name(name: &str) -> Option<Provider> {
    let name = name.to_lowercase();
    if name.contains("resy") {
        Some(Provider::Resy)
    } else if name.contains("opentable") || name.contains("open table") {
        Some(Provider::Opentable)
    } else if name.contains("sevenrooms") || name.contains("seven rooms") {
        Some(Provider::Sevenrooms)
    } else if name.contains("tock") {
        Some(Provider::Tock)
    } else if name.contains("walk") {
        Some(Provider::WalkIn)
    } else if name.contains("phone") || name.contains("call") {
        Some(Provider::Phone)
    } else if name.contains("yelp") {
        Some(Provider::Other)
    } else {
        None
    }
}

/// Extract a platform-specific external id from a reservation URL.
///
/// Only called once a provider is already known; each platform has its own
/// URL shape:
/// - OpenTable: `rid` query parameter, or the segment after `/r/`
/// - Resy: last segment of `/cities/<city>/<slug>`
/// - SevenRooms: segment after `/reservations/`
pub fn extract_external_id(provider: Provider, raw_url: &str) -> Option<String> {
    let url = Url::parse(raw_url).ok()?;
    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    match provider {
        Provider::Opentable => {
            if let Some((_, rid)) = url.query_pairs().find(|(k, _)| k == "rid") {
                if !rid.is_empty() {
                    return Some(rid.into_owned());
                }
            }
            segment_after(&segments, "r")
        }
        Provider::Resy => {
            let cities = segments.iter().position(|s| *s == "cities")?;
            // /cities/<city>/<slug>: the slug is the segment after the city.
            segments.get(cities + 2).map(|s| s.to_string())
        }
        Provider::Sevenrooms => segment_after(&segments, "reservations"),
        _ => None,
    }
}

fn segment_after(segments: &[&str], marker: &str) -> Option<String> {
    let idx = segments.iter().position(|s| *s == marker)?;
    segments.get(idx + 1).map(|s| s.to_string())
}
