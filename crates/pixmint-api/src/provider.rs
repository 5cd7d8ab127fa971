//! Client for the external image-generation provider.
//!
//! The provider takes `{prompt, size, quality, style}` and answers with
//! `{data: [...]}`. Entries in `data` are either bare URL strings or
//! `{url}` objects depending on the deployment; both are accepted.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::ProviderError;

/// Prepended to every user prompt.
pub const PROMPT_PREFIX: &str = "Ultra high resolution 4K masterpiece, extremely detailed: ";
/// Largest landscape size the provider supports.
pub const IMAGE_SIZE: &str = "1792x1024";
pub const IMAGE_QUALITY: &str = "hd";
pub const IMAGE_STYLE: &str = "vivid";

pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/images/generations";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProviderRequest {
    pub prompt: String,
    pub size: &'static str,
    pub quality: &'static str,
    pub style: &'static str,
}

impl ProviderRequest {
    /// Build the fixed-configuration request for a user prompt.
    pub fn for_prompt(prompt: &str) -> Self {
        Self {
            prompt: format!("{}{}", PROMPT_PREFIX, prompt),
            size: IMAGE_SIZE,
            quality: IMAGE_QUALITY,
            style: IMAGE_STYLE,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ProviderResponse {
    #[serde(default)]
    data: Option<Vec<ImageDatum>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageDatum {
    Url(String),
    Object {
        #[serde(default)]
        url: Option<String>,
    },
}

impl ProviderResponse {
    /// URL of the first usable `data` entry. An empty URL there counts as no
    /// image; later entries are not consulted.
    pub fn first_url(&self) -> Option<&str> {
        self.data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find_map(|d| match d {
                ImageDatum::Url(url) => Some(url.as_str()),
                ImageDatum::Object { url } => url.as_deref(),
            })
            .filter(|url| !url.trim().is_empty())
    }
}

#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate one image and return its URL.
    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Provider timeout from a seconds value; `None` gives the default.
pub fn parse_timeout(secs: Option<&str>) -> Result<Duration, std::num::ParseIntError> {
    match secs {
        Some(raw) => Ok(Duration::from_secs(raw.trim().parse()?)),
        None => Ok(DEFAULT_TIMEOUT),
    }
}

pub struct HttpImageProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpImageProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint,
            api_key: config.api_key.filter(|k| !k.trim().is_empty()),
        })
    }
}

#[async_trait]
impl ImageProvider for HttpImageProvider {
    async fn generate(&self, request: &ProviderRequest) -> Result<String, ProviderError> {
        info!("Provider image generation: prompt={} chars", request.prompt.len());

        let mut builder = self
            .client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .json(request);
        if let Some(key) = &self.api_key {
            builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
        }

        let response = builder.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // Truncate to avoid dumping large error pages into the log
            let truncated: String = body.chars().take(200).collect();
            warn!("Provider returned {}: {}", status, truncated);
            return Err(ProviderError::Status { status: status.as_u16() });
        }

        let bytes = response.bytes().await?;
        let parsed: ProviderResponse = serde_json::from_slice(&bytes)?;

        parsed
            .first_url()
            .map(str::to_string)
            .ok_or(ProviderError::NoImage)
    }
}
