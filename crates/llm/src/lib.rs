//! Autopress generation-service infrastructure adapter.
//!
//! Implements the [`pipeline::GenerationProvider`] trait over the external
//! LLM service's HTTP API. Additional providers are added as new client types
//! in this crate without any changes to the `pipeline` crate.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** HTTP transport, request formatting, response parsing,
//! and limiter acquisition live here. The orchestrator sees only
//! [`pipeline::GenerationProvider`] and the [`pipeline::GenerationError`]
//! taxonomy; it never learns it is talking HTTP.
//!
//! ## Retry discipline
//!
//! One request per `generate` call, with a bounded timeout. No internal
//! retries: retry policy belongs to the orchestrator, which distinguishes
//! "rate limited, try later" from "service rejected the input" from
//! "transport failure" via [`pipeline::GenerationError::retry_policy`].

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use pipeline::{
    Acquisition, GenerationError, GenerationOptions, GenerationProvider, LimiterKey, Prompt,
    RateLimiter,
};

/// How the client behaves when the shared cooldown window is still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PacingMode {
    /// Fail fast with [`GenerationError::RateLimited`]; the orchestrator
    /// defers the item to the next scheduled invocation.
    #[default]
    Defer,
    /// Sleep until the window opens. Used by interactive/batch runs that
    /// prefer pacing over deferral.
    Block,
}

/// Wire request accepted by the generation service.
#[derive(Debug, Serialize, PartialEq)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    max_output_tokens: u32,
    temperature: f64,
}

/// Wire response returned by the generation service.
#[derive(Debug, Deserialize)]
struct GenerateResponse {
    content: Option<String>,
}

fn request_body<'a>(prompt: &'a Prompt, options: &'a GenerationOptions) -> GenerateRequest<'a> {
    GenerateRequest {
        model: options.model.as_str(),
        prompt: &prompt.text,
        max_output_tokens: options.max_output_tokens,
        temperature: options.temperature,
    }
}

/// Extracts the response text, treating empty content as malformed.
fn response_text(raw: &str) -> Result<String, GenerationError> {
    let parsed: GenerateResponse =
        serde_json::from_str(raw).map_err(|e| GenerationError::MalformedResponse {
            reason: format!("response envelope: {e}"),
            raw: raw.to_owned(),
        })?;
    match parsed.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(GenerationError::MalformedResponse {
            reason: "empty content".to_owned(),
            raw: raw.to_owned(),
        }),
    }
}

/// HTTP client for the external generation service.
pub struct HttpGenerationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    limiter: RateLimiter,
    limiter_key: LimiterKey,
    pacing: PacingMode,
    /// Extra inter-call pacing additive to the cooldown (`--delay`).
    extra_delay: Duration,
}

impl HttpGenerationClient {
    /// Builds a client against `base_url`, gated by `limiter` under
    /// `limiter_key`.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        limiter: RateLimiter,
        limiter_key: LimiterKey,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            limiter,
            limiter_key,
            pacing: PacingMode::default(),
            extra_delay: Duration::ZERO,
        }
    }

    /// Selects blocking or deferring behaviour on a closed window.
    pub fn with_pacing(mut self, pacing: PacingMode) -> Self {
        self.pacing = pacing;
        self
    }

    /// Adds fixed inter-call pacing on top of the cooldown.
    pub fn with_extra_delay(mut self, delay: Duration) -> Self {
        self.extra_delay = delay;
        self
    }

    async fn acquire_window(&self) -> Result<(), GenerationError> {
        match self.pacing {
            PacingMode::Block => self
                .limiter
                .acquire_blocking(&self.limiter_key, self.extra_delay)
                .await
                .map_err(|e| GenerationError::Transport { message: e.to_string() }),
            PacingMode::Defer => {
                if !self.extra_delay.is_zero() {
                    tokio::time::sleep(self.extra_delay).await;
                }
                match self.limiter.try_acquire(&self.limiter_key) {
                    Ok(Acquisition::Allowed) => Ok(()),
                    Ok(Acquisition::Cooldown { remaining }) => {
                        Err(GenerationError::RateLimited { remaining })
                    }
                    Err(e) => Err(GenerationError::Transport { message: e.to_string() }),
                }
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for HttpGenerationClient {
    #[instrument(skip_all, fields(model = %options.model, timeout = options.timeout_secs))]
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        self.acquire_window().await?;

        let url = format!("{}/v1/generate", self.base_url.trim_end_matches('/'));
        debug!(url = %url, "issuing generation request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .timeout(Duration::from_secs(options.timeout_secs))
            .json(&request_body(prompt, options))
            .send()
            .await
            .map_err(|e| GenerationError::Transport { message: e.to_string() })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| GenerationError::Transport { message: e.to_string() })?;

        if !status.is_success() {
            return Err(GenerationError::ServiceRejected {
                status: status.as_u16(),
                message: body,
            });
        }

        response_text(&body)
    }
}
