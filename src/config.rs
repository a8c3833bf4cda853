//! Configuration.
//!
//! Loaded from a TOML file (default `~/.config/tablescout/config.toml`),
//! with API keys overridable from the environment so they can live in a
//! `.env` file instead of the config.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::models::AuditProvider;

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the SQLite database.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub adapters: AdapterConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub sweep: SweepConfig,
    /// Per-city coverage policy, keyed by city name as stored on venues.
    #[serde(default)]
    pub cities: HashMap<String, CityPolicy>,
}

/// Endpoints and credentials for the platform adapters. Base URLs are
/// configurable so tests and proxies can redirect them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    #[serde(default = "default_resy_url")]
    pub resy_base_url: String,
    #[serde(default = "default_opentable_url")]
    pub opentable_base_url: String,
    #[serde(default = "default_sevenrooms_url")]
    pub sevenrooms_base_url: String,
    #[serde(default = "default_google_url")]
    pub google_base_url: String,
    #[serde(default = "default_yelp_url")]
    pub yelp_base_url: String,
    #[serde(default = "default_michelin_url")]
    pub michelin_base_url: String,
    #[serde(default = "default_infatuation_url")]
    pub infatuation_base_url: String,
    #[serde(default)]
    pub resy_api_key: Option<String>,
    #[serde(default)]
    pub google_api_key: Option<String>,
    #[serde(default)]
    pub yelp_api_key: Option<String>,
    /// Per-request timeout for all adapter clients.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Sweep pacing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// Fixed delay between consecutive mapping-service items; that API
    /// throttles aggressively on bursts.
    #[serde(default = "default_google_delay_ms")]
    pub google_delay_ms: u64,
}

/// Coverage policy for one city: which audit providers apply to its venues.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CityPolicy {
    /// Guide region slug for this city (e.g. "new-york-usa"). Venues in
    /// cities without one skip the guide audit.
    pub michelin_region: Option<String>,
    #[serde(default = "default_city_providers")]
    pub providers: Vec<AuditProvider>,
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tablescout")
}

fn default_resy_url() -> String {
    "https://api.resy.com".to_string()
}
fn default_opentable_url() -> String {
    "https://mobile-api.opentable.com".to_string()
}
fn default_sevenrooms_url() -> String {
    "https://www.sevenrooms.com".to_string()
}
fn default_google_url() -> String {
    "https://maps.googleapis.com".to_string()
}
fn default_yelp_url() -> String {
    "https://api.yelp.com".to_string()
}
fn default_michelin_url() -> String {
    "https://guide.michelin.com".to_string()
}
fn default_infatuation_url() -> String {
    "https://www.theinfatuation.com".to_string()
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_google_delay_ms() -> u64 {
    1200
}
fn default_city_providers() -> Vec<AuditProvider> {
    vec![
        AuditProvider::Google,
        AuditProvider::Yelp,
        AuditProvider::Infatuation,
        AuditProvider::Reservation,
    ]
}

impl Default for AdapterConfig {
    fn default() -> Self {
        toml::from_str("").expect("empty adapter config must deserialize")
    }
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            google_delay_ms: default_google_delay_ms(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str("").expect("empty config must deserialize")
    }
}

impl Config {
    /// Load configuration, falling back to defaults when the file is absent.
    /// API keys from the environment override the file.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("tablescout")
                .join("config.toml"),
        };

        let mut config: Config = if path.exists() {
            let raw = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config at {}", path.display()))?;
            toml::from_str(&raw)
                .with_context(|| format!("invalid config at {}", path.display()))?
        } else {
            Config::default()
        };

        if let Ok(key) = std::env::var("RESY_API_KEY") {
            config.adapters.resy_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("GOOGLE_API_KEY") {
            config.adapters.google_api_key = Some(key);
        }
        if let Ok(key) = std::env::var("YELP_API_KEY") {
            config.adapters.yelp_api_key = Some(key);
        }
        if let Ok(dir) = std::env::var("TABLESCOUT_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("tablescout.db")
    }

    /// Coverage policy for a venue's city; unknown cities get the default
    /// provider set and no guide region.
    pub fn city_policy(&self, city: Option<&str>) -> CityPolicy {
        city.and_then(|c| self.cities.get(c).cloned())
            .unwrap_or_else(|| CityPolicy {
                michelin_region: None,
                providers: default_city_providers(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.adapters.resy_base_url, "https://api.resy.com");
        assert_eq!(config.sweep.google_delay_ms, 1200);
        assert!(config.cities.is_empty());
    }

    #[test]
    fn test_city_policy_parsing() {
        let config: Config = toml::from_str(
            r#"
            [cities."New York"]
            michelin_region = "new-york-usa"
            providers = ["google", "michelin", "reservation"]
            "#,
        )
        .unwrap();

        let policy = config.city_policy(Some("New York"));
        assert_eq!(policy.michelin_region.as_deref(), Some("new-york-usa"));
        assert_eq!(policy.providers.len(), 3);
        assert!(policy.providers.contains(&AuditProvider::Michelin));

        // Unknown city: default provider set, guide audit excluded.
        let fallback = config.city_policy(Some("Lisbon"));
        assert!(fallback.michelin_region.is_none());
        assert!(!fallback.providers.contains(&AuditProvider::Michelin));
        assert!(fallback.providers.contains(&AuditProvider::Reservation));
    }

    #[test]
    fn test_partial_adapter_overrides() {
        let config: Config = toml::from_str(
            r#"
            [adapters]
            resy_api_key = "abc"
            request_timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.adapters.resy_api_key.as_deref(), Some("abc"));
        assert_eq!(config.adapters.request_timeout_secs, 5);
        assert_eq!(config.adapters.yelp_base_url, "https://api.yelp.com");
    }
}
