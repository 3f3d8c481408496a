//! Generative Client
//!
//! Seam between callers and the Gemini `generateContent` REST call.
//!
//! [`GeminiClient`] talks to the provider directly. [`GatedClient`] wraps any
//! [`GenerativeClient`] so every call goes through the rate limiter's FIFO
//! queue; it is the only way application code should reach the provider.
//!
//! # Example
//!
//! ```ignore
//! let inner = Arc::new(GeminiClient::from_config(&config.provider)?);
//! let client = GatedClient::new(limiter.clone(), inner, &config.provider.default_model);
//!
//! let response = client
//!     .generate_content(GenerateContentRequest::new("Predict hourly visitors"))
//!     .await?;
//! println!("{}", response.text().unwrap_or_default());
//! ```

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;

use crate::config::ProviderConfig;
use crate::error::GateError;
use crate::rate_limit::RateLimiter;

/// One generation call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    /// Model to call; the configured default when absent
    #[serde(default)]
    pub model: Option<String>,

    /// Generation settings (`responseMimeType`, `responseSchema`,
    /// `systemInstruction`, `temperature`, ...)
    #[serde(default)]
    pub config: Option<Value>,

    /// Prompt text
    pub contents: String,
}

impl GenerateContentRequest {
    /// Request for `contents` on the default model
    pub fn new(contents: impl Into<String>) -> Self {
        Self {
            model: None,
            config: None,
            contents: contents.into(),
        }
    }

    /// Set the model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the generation config
    pub fn config(mut self, config: Value) -> Self {
        self.config = Some(config);
        self
    }
}

/// Raw provider response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GenerateContentResponse {
    pub raw: Value,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    pub fn text(&self) -> Option<String> {
        let parts = self
            .raw
            .get("candidates")?
            .get(0)?
            .get("content")?
            .get("parts")?
            .as_array()?;

        let text: String = parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Anything that can run a generation call
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    /// Call `model` with `request`
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse>;
}

/// Direct Gemini REST client
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    /// Create a client for `base_url`
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Create a client from the provider configuration
    ///
    /// # Errors
    ///
    /// Returns an error if no API key is configured.
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .context("No Gemini API key configured (set GEMINI_API_KEY)")?;
        Self::new(&config.base_url, api_key, Duration::from_secs(config.timeout_secs))
    }

    /// Endpoint for `model`
    pub fn endpoint(&self, model: &str) -> String {
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        let url = self.endpoint(model);
        let body = request_body(request);
        tracing::debug!("Sending generateContent request to {}", url);

        let http_response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .context("Failed to send generateContent request")?;

        let status = http_response.status();
        let response_text = http_response
            .text()
            .await
            .context("Failed to read generateContent response body")?;

        if !status.is_success() {
            anyhow::bail!("Gemini API request failed with status {}: {}", status, response_text);
        }

        let raw: Value = serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse Gemini response: {}", response_text))?;
        Ok(GenerateContentResponse { raw })
    }
}

/// Build the REST body for a request
///
/// `systemInstruction` moves to the top level; every other config key is
/// sent as `generationConfig`.
pub fn request_body(request: &GenerateContentRequest) -> Value {
    let mut body = Map::new();
    body.insert(
        "contents".to_string(),
        json!([{ "role": "user", "parts": [{ "text": request.contents }] }]),
    );

    if let Some(Value::Object(config)) = &request.config {
        let mut generation_config = config.clone();
        if let Some(instruction) = generation_config.remove("systemInstruction") {
            let instruction = match instruction {
                Value::String(text) => json!({ "parts": [{ "text": text }] }),
                other => other,
            };
            body.insert("systemInstruction".to_string(), instruction);
        }
        if !generation_config.is_empty() {
            body.insert(
                "generationConfig".to_string(),
                Value::Object(generation_config),
            );
        }
    }

    Value::Object(body)
}

/// Client whose every call passes through the rate limiter
#[derive(Clone)]
pub struct GatedClient {
    limiter: RateLimiter,
    inner: Arc<dyn GenerativeClient>,
    default_model: String,
}

impl GatedClient {
    /// Wrap `inner` behind `limiter`
    pub fn new(
        limiter: RateLimiter,
        inner: Arc<dyn GenerativeClient>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            limiter,
            inner,
            default_model: default_model.into(),
        }
    }

    /// Queue a generation call and wait for its response
    ///
    /// # Errors
    ///
    /// `DailyLimitReached`, `Unavailable` and `PersistFailed` mean the call
    /// was blocked for quota reasons and callers should fall back.
    /// `Execution` carries the provider error.
    pub async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GateError> {
        let model = request
            .model
            .clone()
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| self.default_model.clone());
        let inner = self.inner.clone();
        let call_model = model.clone();

        self.limiter
            .submit(model, move || async move {
                inner.generate_content(&call_model, &request).await
            })
            .await
    }

    /// Underlying rate limiter
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Model used when a request names none
    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

impl std::fmt::Debug for GatedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatedClient")
            .field("limiter", &self.limiter)
            .field("default_model", &self.default_model)
            .finish_non_exhaustive()
    }
}
