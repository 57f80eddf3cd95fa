use crate::llm::{send_json, CompletionRequest, Llm, LlmError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;
use url::Url;

pub(super) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Talks to the Gemini `generateContent` endpoint.
pub(super) struct GeminiClient {
    http: reqwest::Client,
    base_url: Url,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl GeminiClient {
    pub(super) fn new(
        http: reqwest::Client,
        base_url: Url,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            base_url,
            model: model.to_string(),
            api_key,
            timeout,
        }
    }

    fn endpoint(&self) -> Result<Url, LlmError> {
        self.base_url
            .join(&format!("models/{}:generateContent", self.model))
            .map_err(|e| LlmError::Protocol(format!("bad endpoint URL: {e}")))
    }
}

#[async_trait::async_trait]
impl Llm for GeminiClient {
    fn name(&self) -> String {
        format!("gemini:{}", self.model)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = self.endpoint()?;
        trace!("POST {url}");
        let builder = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&GenerateRequest::from(request));
        let response: GenerateResponse = send_json(builder, self.timeout).await?;
        response.into_text()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    system_instruction: Content,
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

impl From<&CompletionRequest> for GenerateRequest {
    fn from(r: &CompletionRequest) -> Self {
        let mut parts = Vec::new();
        if let Some(image) = &r.image {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.data),
                }),
            });
        }
        parts.push(Part {
            text: Some(r.user.clone()),
            inline_data: None,
        });

        Self {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: Some(r.system.clone()),
                    inline_data: None,
                }],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                temperature: r.temperature,
                max_output_tokens: r.max_tokens,
                response_mime_type: r.json_output.then_some("application/json"),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

impl GenerateResponse {
    fn into_text(self) -> Result<String, LlmError> {
        let Some(candidate) = self.candidates.into_iter().next() else {
            return match self.prompt_feedback {
                Some(feedback) => Err(LlmError::Protocol(format!(
                    "no candidates returned, prompt feedback: {feedback}"
                ))),
                None => Err(LlmError::EmptyResponse),
            };
        };
        let text: String = candidate
            .content
            .parts
            .into_iter()
            .filter_map(|p| p.text)
            .collect();
        if text.trim().is_empty() {
            trace!(
                "Empty candidate, finish reason {:?}",
                candidate.finish_reason
            );
            return Err(LlmError::EmptyResponse);
        }
        Ok(text)
    }
}
