use crate::llm::{send_json, CompletionRequest, Llm, LlmError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;
use url::Url;

pub(super) const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1/";

/// Talks to an OpenAI-compatible `chat/completions` endpoint.
pub(super) struct OpenAiClient {
    http: reqwest::Client,
    base_url: Url,
    model: String,
    api_key: String,
    timeout: Duration,
}

impl OpenAiClient {
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
            .join("chat/completions")
            .map_err(|e| LlmError::Protocol(format!("bad endpoint URL: {e}")))
    }

    fn body(&self, r: &CompletionRequest) -> ChatRequest {
        let user = match &r.image {
            None => UserContent::Text(r.user.clone()),
            Some(image) => UserContent::Parts(vec![
                ContentPart::Text {
                    text: r.user.clone(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: format!(
                            "data:{};base64,{}",
                            image.mime_type,
                            STANDARD.encode(&image.data)
                        ),
                    },
                },
            ]),
        };
        ChatRequest {
            model: self.model.clone(),
            messages: vec![
                Message::System {
                    content: r.system.clone(),
                },
                Message::User { content: user },
            ],
            temperature: r.temperature,
            max_tokens: r.max_tokens,
            response_format: r.json_output.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[async_trait::async_trait]
impl Llm for OpenAiClient {
    fn name(&self) -> String {
        format!("openai:{}", self.model)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let url = self.endpoint()?;
        trace!("POST {url}");
        let builder = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&self.body(request));
        let response: ChatResponse = send_json(builder, self.timeout).await?;
        response.into_text()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
enum Message {
    System { content: String },
    User { content: UserContent },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum UserContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String, LlmError> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or(LlmError::EmptyResponse)?;
        match choice.message.content {
            Some(text) if !text.trim().is_empty() => Ok(text),
            _ => {
                trace!("Empty choice, finish reason {:?}", choice.finish_reason);
                Err(LlmError::EmptyResponse)
            }
        }
    }
}
