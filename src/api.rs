//! Text-generation client with bounded retry.
//!
//! This module wraps the external generative text API used for every model
//! call in the pipeline (topic dedup, ranking, persona rewrite, image
//! keywords).
//!
//! # Architecture
//!
//! - [`CompletionBackend`]: one raw request, `Result` on failure
//! - [`GeminiBackend`]: the `generateContent` REST backend
//! - [`RetryingGenerator`]: decorator that retries the *same* prompt and turns
//!   exhausted retries into `None`
//! - [`TextGenerator`]: what orchestration code depends on. `None` means
//!   "could not generate" and callers must abort their stage gracefully.
//!
//! # Retry Strategy
//!
//! - Fixed number of attempts (4 by default)
//! - Exponential backoff starting at 1 second, capped at 30 seconds
//! - Random jitter (0-250ms) added to each delay

use crate::config::GenerationConfig;
use crate::error::GenerationError;
use async_trait::async_trait;
use rand::{rng, Rng};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// One segment of a structured prompt.
///
/// Segments are sent in order: instructions first, then few-shot pairs, then
/// the actual input.
#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Instruction(String),
    Example { input: String, output: String },
    Input(String),
}

/// Sampling parameters for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
    /// Ask the backend for `application/json` output.
    pub json_output: bool,
}

impl GenerationParams {
    pub fn from_config(config: &GenerationConfig) -> Self {
        Self {
            temperature: config.temperature,
            top_k: config.top_k,
            top_p: config.top_p,
            max_output_tokens: config.max_output_tokens,
            json_output: false,
        }
    }

    /// Same sampling, structured output requested.
    pub fn structured(&self) -> Self {
        Self {
            json_output: true,
            ..self.clone()
        }
    }
}

/// A single, unretried call to a text-generation backend.
#[async_trait]
pub trait CompletionBackend: Send + Sync + fmt::Debug {
    async fn complete(
        &self,
        parts: &[PromptPart],
        params: &GenerationParams,
    ) -> Result<String, GenerationError>;
}

/// What the pipeline calls. Stateless; `None` is the "could not generate" signal.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, parts: &[PromptPart], params: &GenerationParams) -> Option<String>;
}

/// Render prompt segments as the `input:`/`output:` text parts the backend expects.
pub fn render_parts(parts: &[PromptPart]) -> Vec<String> {
    let mut rendered = Vec::with_capacity(parts.len() * 2 + 1);
    for part in parts {
        match part {
            PromptPart::Instruction(text) => rendered.push(text.clone()),
            PromptPart::Example { input, output } => {
                rendered.push(format!("input: {input}"));
                rendered.push(format!("output: {output}"));
            }
            PromptPart::Input(text) => {
                rendered.push(format!("input: {text}"));
                rendered.push("output: ".to_string());
            }
        }
    }
    rendered
}

/// Wrapper that adds bounded exponential backoff to any [`CompletionBackend`].
///
/// The delay between attempts follows:
/// ```text
/// delay = min(base_delay * 2^(attempt-1), max_delay) + random_jitter(0..250ms)
/// ```
/// After `max_attempts` failures the call resolves to `None` instead of an error.
pub struct RetryingGenerator<T> {
    inner: T,
    max_attempts: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryingGenerator<T>
where
    T: CompletionBackend,
{
    pub fn new(inner: T, max_attempts: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: StdDuration::from_secs(30),
        }
    }

    pub fn from_config(inner: T, config: &GenerationConfig) -> Self {
        Self::new(
            inner,
            config.max_attempts,
            StdDuration::from_millis(config.base_delay_ms),
        )
        .with_max_delay(StdDuration::from_millis(config.max_delay_ms))
    }

    pub fn with_max_delay(mut self, max_delay: StdDuration) -> Self {
        self.max_delay = max_delay;
        self
    }

    fn backoff(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryingGenerator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryingGenerator")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

#[async_trait]
impl<T> TextGenerator for RetryingGenerator<T>
where
    T: CompletionBackend,
{
    #[instrument(level = "info", skip_all, fields(parts = parts.len()))]
    async fn complete(&self, parts: &[PromptPart], params: &GenerationParams) -> Option<String> {
        let total_t0 = Instant::now();

        for attempt in 1..=self.max_attempts {
            let attempt_t0 = Instant::now();
            match self.inner.complete(parts, params).await {
                Ok(text) => {
                    info!(
                        attempt,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        bytes = text.len(),
                        "complete() succeeded"
                    );
                    return Some(text);
                }
                Err(e) if attempt == self.max_attempts => {
                    error!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        error = %e,
                        "complete() exhausted retries"
                    );
                }
                Err(e) => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max = self.max_attempts,
                        elapsed_ms_attempt = attempt_t0.elapsed().as_millis(),
                        ?delay,
                        error = %e,
                        "complete() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
        None
    }
}

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    contents: Vec<Content>,
    generation_config: RequestConfig,
    safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestConfig {
    temperature: f32,
    top_k: u32,
    top_p: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Serialize)]
struct SafetySetting {
    category: &'static str,
    threshold: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

fn build_request(parts: &[PromptPart], params: &GenerationParams) -> GenerateRequest {
    GenerateRequest {
        contents: vec![Content {
            role: Some("user".to_string()),
            parts: render_parts(parts)
                .into_iter()
                .map(|text| Part { text: Some(text) })
                .collect(),
        }],
        generation_config: RequestConfig {
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            max_output_tokens: params.max_output_tokens,
            response_mime_type: params.json_output.then_some("application/json"),
        },
        // The persona is deliberately rude; any filtering silently kills the article.
        safety_settings: SAFETY_CATEGORIES
            .into_iter()
            .map(|category| SafetySetting {
                category,
                threshold: "BLOCK_NONE",
            })
            .collect(),
    }
}

fn extract_text(response: GenerateResponse) -> Result<String, GenerationError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(GenerationError::Blocked(reason));
    }
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(GenerationError::Empty)?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return match candidate.finish_reason {
            Some(reason) if reason == "SAFETY" => Err(GenerationError::Blocked(reason)),
            _ => Err(GenerationError::Empty),
        };
    }
    Ok(text)
}

/// `generateContent` REST backend.
pub struct GeminiBackend {
    client: Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl GeminiBackend {
    pub fn new(client: Client, api_key: String, config: &GenerationConfig) -> Self {
        Self {
            client,
            api_key,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
        }
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

impl fmt::Debug for GeminiBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiBackend")
            .field("api_key", &"<redacted>")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .finish()
    }
}

#[async_trait]
impl CompletionBackend for GeminiBackend {
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    async fn complete(
        &self,
        parts: &[PromptPart],
        params: &GenerationParams,
    ) -> Result<String, GenerationError> {
        let t0 = Instant::now();
        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&build_request(parts, params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(elapsed_ms = t0.elapsed().as_millis(), %status, "API call failed");
            return Err(GenerationError::Status {
                status: status.as_u16(),
                body: crate::utils::truncate_for_log(&body, 300),
            });
        }

        let parsed: GenerateResponse = response.json().await?;
        extract_text(parsed)
    }
}
