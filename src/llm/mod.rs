//! Clients for hosted language models.
//!
//! Everything the pipeline needs from a model goes through the small `Llm` trait: one role-based
//! completion request in, the model's text out. Two hosted providers implement it, plus
//! `TestLlm`, which answers from a script so that the whole program can run offline.

mod gemini;
mod openai;
mod test_client;

use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::Context;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, trace};

pub use test_client::TestLlm;

/// When this environment variable is set and non-empty, `Mode::from_env` returns `Mode::Testing`.
pub const TEST_MODE_ENV: &str = "EXPENSE_IN_TEST_MODE";

/// Response bodies quoted in errors are cut to this many characters.
const MAX_ERROR_BODY: usize = 500;

/// Whether to talk to a real provider or to the in-memory `TestLlm`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    #[default]
    Live,
    Testing,
}

impl Mode {
    pub fn from_env() -> Self {
        match std::env::var(TEST_MODE_ENV) {
            Ok(v) if !v.is_empty() => Mode::Testing,
            _ => Mode::Live,
        }
    }
}

/// The hosted model API that requests are sent to.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    schemars::JsonSchema,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Google Gemini `generateContent`.
    #[default]
    Gemini,
    /// Any OpenAI-compatible `chat/completions` endpoint, e.g. Groq.
    #[value(name = "openai")]
    OpenAi,
}

serde_plain::derive_display_from_serialize!(Provider);
serde_plain::derive_fromstr_from_deserialize!(Provider);

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Gemini => gemini::DEFAULT_BASE_URL,
            Provider::OpenAi => openai::DEFAULT_BASE_URL,
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash",
            Provider::OpenAi => "llama-3.3-70b-versatile",
        }
    }

    pub fn default_vision_model(&self) -> &'static str {
        match self {
            Provider::Gemini => "gemini-2.5-flash",
            Provider::OpenAi => "meta-llama/llama-4-scout-17b-16e-instruct",
        }
    }

    pub fn default_api_key_env(&self) -> &'static str {
        match self {
            Provider::Gemini => "GEMINI_API_KEY",
            Provider::OpenAi => "GROQ_API_KEY",
        }
    }
}

/// An image attached to the user turn of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// A single completion request: a system turn, a user turn and sampling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub system: String,
    pub user: String,
    pub image: Option<ImagePart>,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Ask the provider to constrain its output to a JSON object.
    pub json_output: bool,
}

/// Ways a call to a model provider can fail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LlmError {
    #[error("no response from the model within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited by the provider{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<u64> },

    #[error("provider returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("the model returned no text")]
    EmptyResponse,

    #[error("unexpected provider response: {0}")]
    Protocol(String),
}

fn retry_hint(retry_after: &Option<u64>) -> String {
    match retry_after {
        Some(secs) => format!(", retry after {secs}s"),
        None => String::new(),
    }
}

/// A hosted language model.
#[async_trait::async_trait]
pub trait Llm: Send + Sync {
    /// A short name for logs and error messages, e.g. `gemini:gemini-2.5-flash`.
    fn name(&self) -> String;

    async fn complete(&self, request: &CompletionRequest) -> std::result::Result<String, LlmError>;
}

/// Creates the model client for `model` as configured in `config`. In `Mode::Testing` this is an
/// empty `TestLlm`, which answers with canned data.
pub fn client(config: &Config, mode: Mode, model: &str) -> Result<Arc<dyn Llm>> {
    if mode == Mode::Testing {
        debug!("Using the in-memory test model instead of {}", config.provider());
        return Ok(Arc::new(TestLlm::new()));
    }

    let api_key = config.api_key().pub_result(ErrorType::Config)?;
    let timeout = config.stage_timeout();
    let http = reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Unable to create the HTTP client")?;
    let base_url = config.base_url().pub_result(ErrorType::Config)?;

    let llm: Arc<dyn Llm> = match config.provider() {
        Provider::Gemini => Arc::new(gemini::GeminiClient::new(
            http, base_url, model, api_key, timeout,
        )),
        Provider::OpenAi => Arc::new(openai::OpenAiClient::new(
            http, base_url, model, api_key, timeout,
        )),
    };
    debug!("Created model client {}", llm.name());
    Ok(llm)
}

/// Sends a prepared request and decodes a JSON response, mapping transport and HTTP failures to
/// `LlmError`.
pub(crate) async fn send_json<R>(
    builder: reqwest::RequestBuilder,
    timeout: Duration,
) -> std::result::Result<R, LlmError>
where
    R: DeserializeOwned,
{
    let response = builder.send().await.map_err(|e| {
        if e.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Network(e.to_string())
        }
    })?;

    let status = response.status();
    trace!("Provider responded with HTTP {status}");
    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok());
        return Err(LlmError::RateLimited { retry_after });
    }
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        return Err(LlmError::Status {
            status: status.as_u16(),
            body: body.chars().take(MAX_ERROR_BODY).collect(),
        });
    }

    response.json::<R>().await.map_err(|e| {
        if e.is_timeout() {
            LlmError::Timeout(timeout)
        } else {
            LlmError::Protocol(format!("unable to decode the response body: {e}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serde_names() {
        assert_eq!(Provider::OpenAi.to_string(), "openai");
        assert_eq!("gemini".parse::<Provider>().unwrap(), Provider::Gemini);
        assert!("claude".parse::<Provider>().is_err());
    }

    #[test]
    fn test_llm_error_messages() {
        assert_eq!(
            LlmError::Timeout(Duration::from_secs(20)).to_string(),
            "no response from the model within 20s"
        );
        assert_eq!(
            LlmError::RateLimited {
                retry_after: Some(7)
            }
            .to_string(),
            "rate limited by the provider, retry after 7s"
        );
        assert_eq!(
            LlmError::RateLimited { retry_after: None }.to_string(),
            "rate limited by the provider"
        );
    }
}
