use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::llm::{self, CompletionRequest, Mode};
use crate::pipeline::call_model;
use crate::{Config, Result};
use anyhow::{anyhow, Context};
use serde::Serialize;
use tracing::debug;

const PING: &str = "Reply with the single word OK.";

/// What the configured model said when pinged.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutput {
    pub model: String,
    pub reply: String,
}

/// Sends a tiny request to the configured model to confirm that the API key, base URL and model
/// name work. Any non-empty reply counts as healthy.
pub async fn check(config: &Config, mode: Mode) -> Result<Out<CheckOutput>> {
    let llm = llm::client(config, mode, config.model())?;
    let request = CompletionRequest {
        system: "You are a health check.".to_string(),
        user: PING.to_string(),
        image: None,
        temperature: 0.0,
        max_tokens: 8,
        json_output: false,
    };
    debug!("Pinging {}", llm.name());
    let reply = call_model(llm.as_ref(), &request, config.stage_timeout())
        .await
        .with_context(|| format!("The model {} did not answer", llm.name()))
        .pub_result(ErrorType::Request)?;
    let reply = reply.trim().to_string();
    if reply.is_empty() {
        return Err(anyhow!("The model {} answered with no text", llm.name()))
            .pub_result(ErrorType::Request);
    }
    Ok(Out::new(
        format!("The model {} is reachable", llm.name()),
        CheckOutput {
            model: llm.name(),
            reply,
        },
    ))
}
