//! Gemini [`TextGenerator`] over the Generative Language REST API.
//!
//! Unary calls use `models/{model}:generateContent`; streaming calls use
//! `models/{model}:streamGenerateContent?alt=sse` and concatenate the text
//! of every SSE chunk in arrival order. A prompt-level `blockReason` or a
//! safety-type `finishReason` becomes [`ReviewError::SafetyBlocked`].

use std::time::Duration;

use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use serde::Deserialize;

use crate::config::ModelConfig;
use crate::error::{Result, ReviewError};

use super::traits::{collect_fragments, ReviewRequest, TextGenerator};

/// Harm categories sent in `safetySettings` when a threshold is configured.
const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_HARASSMENT",
];

/// `finishReason` values that mean the provider refused on policy grounds.
const BLOCKING_FINISH_REASONS: [&str; 4] = ["SAFETY", "BLOCKLIST", "PROHIBITED_CONTENT", "SPII"];

pub struct GeminiGenerator {
    model: String,
    base_url: String,
    api_key: String,
    stream: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            model,
            base_url: crate::config::schema::DEFAULT_BASE_URL.into(),
            api_key,
            stream: false,
            timeout: Duration::from_secs(120),
            client: reqwest::Client::new(),
        }
    }

    /// Build from config. A missing API key is a configuration error.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let api_key = config.resolve_api_key().ok_or_else(|| {
            ReviewError::Config(format!(
                "no API key: set model.api_key or the {} environment variable",
                config.api_key_env
            ))
        })?;
        Ok(Self::new(api_key, config.model.clone())
            .with_base_url(&config.base_url)
            .with_streaming(config.stream)
            .with_timeout(Duration::from_secs(config.request_timeout_secs)))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self) -> String {
        if self.stream {
            format!(
                "{}/models/{}:streamGenerateContent?alt=sse",
                self.base_url, self.model
            )
        } else {
            format!("{}/models/{}:generateContent", self.base_url, self.model)
        }
    }

    fn build_payload(request: &ReviewRequest) -> serde_json::Value {
        let params = &request.params;
        let mut payload = serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": {
                "maxOutputTokens": params.max_output_tokens,
                "temperature": params.temperature,
                "topP": params.top_p,
            }
        });
        if let Some(threshold) = params.safety_threshold.as_api_str() {
            payload["safetySettings"] = HARM_CATEGORIES
                .iter()
                .map(|category| serde_json::json!({ "category": category, "threshold": threshold }))
                .collect();
        }
        payload
    }

    async fn send(&self, request: &ReviewRequest) -> Result<reqwest::Response> {
        let resp = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&Self::build_payload(request))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ReviewError::Service(format!("request to Gemini failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ReviewError::Service(format!(
                "Gemini API error {status}: {}",
                body.trim()
            )));
        }
        Ok(resp)
    }

    async fn generate_unary(&self, request: &ReviewRequest) -> Result<String> {
        let resp = self.send(request).await?;
        let body: GenerateContentResponse = resp
            .json()
            .await
            .map_err(|e| ReviewError::Service(format!("invalid Gemini response: {e}")))?;
        body.into_text()
    }

    async fn generate_streaming(&self, request: &ReviewRequest) -> Result<String> {
        let resp = self.send(request).await?;
        let fragments = resp.bytes_stream().eventsource().map(|event| {
            let event =
                event.map_err(|e| ReviewError::Service(format!("Gemini stream error: {e}")))?;
            let chunk: GenerateContentResponse = serde_json::from_str(&event.data)
                .map_err(|e| ReviewError::Service(format!("invalid Gemini stream chunk: {e}")))?;
            chunk.into_text()
        });
        collect_fragments(fragments).await
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, request: &ReviewRequest) -> Result<String> {
        if self.stream {
            self.generate_streaming(request).await
        } else {
            self.generate_unary(request).await
        }
    }
}

// ── Wire types ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn block_reason(&self) -> Option<String> {
        if let Some(reason) = self
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.clone())
        {
            return Some(format!("prompt blocked ({reason})"));
        }
        self.candidates
            .iter()
            .filter_map(|c| c.finish_reason.as_deref())
            .find(|r| BLOCKING_FINISH_REASONS.contains(r))
            .map(|r| format!("response blocked (finish reason {r})"))
    }

    /// Text of the first candidate, or the block reason as an error.
    fn into_text(self) -> Result<String> {
        if let Some(reason) = self.block_reason() {
            return Err(ReviewError::SafetyBlocked(reason));
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<String>()
            })
            .unwrap_or_default())
    }
}

// ── Tests ────────────────────────────────────────────────────────
