//! Website content classifier.
//!
//! Given a venue's website URL, produces a best-guess reservation
//! classification by fetching the page, reducing it to text, and asking a
//! local LLM (Ollama API) for a structured answer. This is a collaborator
//! from the detection engine's point of view: `scan` never fails, it returns
//! whatever it could determine plus a signal trace explaining the rest.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveTime;
use scraper::Html;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adapters::{SessionId, SESSION_HEADER, USER_AGENT};
use crate::detection::hints::map_platform_name;
use crate::models::{OpeningPattern, Provider};

/// Prompt for website reservation classification. `{content}` is replaced
/// with the page text.
const CLASSIFY_PROMPT: &str = r#"You are analyzing the text of a restaurant's website to determine how it takes reservations.

Identify, when present:
1. The reservation PLATFORM the site links to or embeds (resy, opentable, sevenrooms, tock), or "walk_in"/"phone" if the site says so explicitly.
2. The direct BOOKING URL.
3. The platform-specific venue identifier visible in that URL.
4. How far ahead bookings open (a number of days), at what local time, and whether dates open one-by-one ("rolling") or in batches ("bulk").

Website text:
{content}

Respond with ONLY a JSON object, no prose, using null for unknown fields:
{"provider": string|null, "booking_url": string|null, "external_id": string|null, "opening_window_days": number|null, "opening_pattern": "rolling"|"bulk"|null, "opening_time": "HH:MM"|null}"#;

/// Classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Ollama API endpoint.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Hard cap on one website fetch; on expiry whatever content arrived is
    /// classified as-is.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    /// Maximum characters of page text sent to the model.
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_model() -> String {
    "llama3.2:instruct".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_fetch_timeout_secs() -> u64 {
    20
}
fn default_max_content_chars() -> usize {
    12000
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            temperature: default_temperature(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

/// Best-guess classification of a venue website.
#[derive(Debug, Clone, Default)]
pub struct ClassifierGuess {
    pub provider: Option<Provider>,
    pub booking_url: Option<String>,
    pub external_id: Option<String>,
    pub opening_window_days: Option<i64>,
    pub opening_pattern: Option<OpeningPattern>,
    pub opening_time: Option<NaiveTime>,
    pub signals: Vec<String>,
}

/// Classifier contract. Absence of a signal is null fields, never an error.
#[async_trait]
pub trait WebsiteClassifier: Send + Sync {
    async fn scan(&self, url: &str) -> ClassifierGuess;
}

/// Production classifier backed by an Ollama-compatible LLM endpoint.
pub struct LlmClassifier {
    client: reqwest::Client,
    config: ClassifierConfig,
    session: SessionId,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Raw JSON shape the model is asked to emit.
#[derive(Deserialize)]
struct RawGuess {
    provider: Option<String>,
    booking_url: Option<String>,
    external_id: Option<String>,
    opening_window_days: Option<i64>,
    opening_pattern: Option<String>,
    opening_time: Option<String>,
}

impl LlmClassifier {
    pub fn new(config: ClassifierConfig, session: SessionId) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            config,
            session,
        }
    }

    /// Fetch a page under a hard deadline, keeping whatever arrived if the
    /// deadline expires mid-body.
    async fn fetch_page(&self, url: &str, guess: &mut ClassifierGuess) -> Option<String> {
        let deadline = Duration::from_secs(self.config.fetch_timeout_secs);
        let started = tokio::time::Instant::now();

        let response = match tokio::time::timeout(
            deadline,
            self.client
                .get(url)
                .header(SESSION_HEADER, self.session.as_str())
                .send(),
        )
        .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                guess.signal(format!("website fetch failed: {e}"));
                return None;
            }
            Err(_) => {
                guess.signal("website fetch timed out before response");
                return None;
            }
        };

        if !response.status().is_success() {
            guess.signal(format!("website returned HTTP {}", response.status()));
            return None;
        }

        let mut body: Vec<u8> = Vec::new();
        let mut response = response;
        loop {
            let remaining = match deadline.checked_sub(started.elapsed()) {
                Some(d) => d,
                None => {
                    guess.signal("website fetch timed out, classifying partial content");
                    break;
                }
            };
            match tokio::time::timeout(remaining, response.chunk()).await {
                Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
                Ok(Ok(None)) => break,
                Ok(Err(e)) => {
                    guess.signal(format!("website body truncated: {e}"));
                    break;
                }
                Err(_) => {
                    guess.signal("website fetch timed out, classifying partial content");
                    break;
                }
            }
        }

        if body.is_empty() {
            guess.signal("website returned no content");
            return None;
        }
        Some(String::from_utf8_lossy(&body).into_owned())
    }

    /// Reduce an HTML page to whitespace-collapsed text.
    fn page_text(&self, html: &str) -> String {
        let document = Html::parse_document(html);
        let mut text: String = document
            .root_element()
            .text()
            .collect::<Vec<_>>()
            .join(" ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        if text.chars().count() > self.config.max_content_chars {
            text = text.chars().take(self.config.max_content_chars).collect();
        }
        text
    }

    async fn generate(&self, content: &str) -> Result<RawGuess, String> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: CLASSIFY_PROMPT.replace("{content}", content),
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
            },
        };

        let response: GenerateResponse = self
            .client
            .post(format!("{}/api/generate", self.config.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| format!("classifier request failed: {e}"))?
            .error_for_status()
            .map_err(|e| format!("classifier request failed: {e}"))?
            .json()
            .await
            .map_err(|e| format!("classifier response unreadable: {e}"))?;

        // Models wrap JSON in prose more often than not; take the outermost
        // object.
        let text = &response.response;
        let start = text.find('{').ok_or("classifier returned no JSON")?;
        let end = text.rfind('}').ok_or("classifier returned no JSON")?;
        serde_json::from_str(&text[start..=end])
            .map_err(|e| format!("classifier JSON malformed: {e}"))
    }
}

#[async_trait]
impl WebsiteClassifier for LlmClassifier {
    async fn scan(&self, url: &str) -> ClassifierGuess {
        let mut guess = ClassifierGuess::default();

        let html = match self.fetch_page(url, &mut guess).await {
            Some(html) => html,
            None => return guess,
        };
        let content = self.page_text(&html);
        if content.is_empty() {
            guess.signal("website had no readable text");
            return guess;
        }

        let raw = match self.generate(&content).await {
            Ok(raw) => raw,
            Err(reason) => {
                warn!(url, %reason, "website classification failed");
                guess.signal(reason);
                return guess;
            }
        };

        guess.provider = raw.provider.as_deref().and_then(map_platform_name);
        guess.booking_url = raw.booking_url;
        guess.external_id = raw.external_id;
        guess.opening_window_days = raw.opening_window_days;
        guess.opening_pattern = raw
            .opening_pattern
            .as_deref()
            .and_then(OpeningPattern::from_str);
        guess.opening_time = raw
            .opening_time
            .as_deref()
            .and_then(|t| NaiveTime::parse_from_str(t, "%H:%M").ok());

        match guess.provider {
            Some(p) => guess.signal(format!("website scan identified provider {}", p.as_str())),
            None => guess.signal("website scan found no reservation platform"),
        }
        debug!(url, provider = ?guess.provider, "website classified");
        guess
    }
}

impl ClassifierGuess {
    pub fn signal(&mut self, message: impl Into<String>) {
        self.signals.push(message.into());
    }
}
