use crate::llm::{CompletionRequest, Llm};
use crate::model::{parse_object, CandidateRecord};
use crate::pipeline::error::ExtractionError;
use crate::pipeline::{call_model, StageSettings};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = r#"You are an expense extraction assistant. Extract the expense described by the user's text.

Return ONLY a JSON object with these fields:
- amount: the numeric amount as written, without currency symbols. Convert spelled-out numbers ("forty-five" is 45).
- category: the best matching category for the expense, in a word or two.
- description: a brief description of what was purchased and where.
- date: the date exactly as the user wrote it (for example "yesterday", "2/17" or "Feb 17"), or null if no date is mentioned.

Use null for anything the text does not say. Do not guess dates.
Return ONLY valid JSON, no other text and no code fences.

Example:
{"amount": 15.50, "category": "Food", "description": "Lunch at Chipotle", "date": "yesterday"}"#;

/// The first model call: free text in, a loosely-typed `CandidateRecord` out.
pub struct Extractor {
    llm: Arc<dyn Llm>,
    settings: StageSettings,
    timeout: Duration,
}

impl Extractor {
    pub fn new(llm: Arc<dyn Llm>, settings: StageSettings, timeout: Duration) -> Self {
        Self {
            llm,
            settings,
            timeout,
        }
    }

    /// Builds the completion request for `text`.
    pub fn request(&self, text: &str) -> CompletionRequest {
        CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: text.to_string(),
            image: None,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_output: true,
        }
    }

    /// Asks the model for a candidate record. The response must be exactly one JSON object.
    /// Missing fields are left as null for the validator to reject.
    pub async fn extract(&self, text: &str) -> Result<CandidateRecord, ExtractionError> {
        let request = self.request(text);
        let raw = call_model(self.llm.as_ref(), &request, self.timeout).await?;
        debug!("Extraction returned {} bytes", raw.len());
        let map = parse_object(&raw)?;
        Ok(CandidateRecord::from_map(map))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, TestLlm};
    use crate::model::RawRecord;
    use serde_json::{json, Value};

    fn extractor(llm: &TestLlm) -> Extractor {
        Extractor::new(
            Arc::new(llm.clone()),
            StageSettings::EXTRACTION,
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn test_request_settings() {
        let llm = TestLlm::new();
        llm.push_response(r#"{"amount": 4}"#);
        extractor(&llm).extract("coffee 4 bucks").await.unwrap();

        let requests = llm.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].user, "coffee 4 bucks");
        assert_eq!(requests[0].temperature, 0.3);
        assert_eq!(requests[0].max_tokens, 256);
        assert!(requests[0].json_output);
    }

    #[tokio::test]
    async fn test_missing_fields_are_not_defaulted() {
        let llm = TestLlm::new();
        llm.push_response(r#"{"amount": 4, "category": "coffee"}"#);
        let candidate = extractor(&llm).extract("coffee 4").await.unwrap();
        assert_eq!(candidate.amount(), &json!(4));
        assert_eq!(candidate.description(), &Value::Null);
        assert_eq!(candidate.date(), &Value::Null);
    }

    #[tokio::test]
    async fn test_fenced_response_is_malformed() {
        let llm = TestLlm::new();
        let raw = "```json\n{\"amount\": 4}\n```";
        llm.push_response(raw);
        let e = extractor(&llm).extract("coffee").await.unwrap_err();
        match e {
            ExtractionError::Malformed { raw_response, .. } => assert_eq!(raw_response, raw),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_llm_failure_is_wrapped() {
        let llm = TestLlm::new();
        llm.push_error(LlmError::Network("connection reset".to_string()));
        let e = extractor(&llm).extract("coffee").await.unwrap_err();
        assert_eq!(
            e,
            ExtractionError::Llm(LlmError::Network("connection reset".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let llm = TestLlm::new();
        llm.push_hang();
        let e = extractor(&llm).extract("coffee").await.unwrap_err();
        assert_eq!(
            e,
            ExtractionError::Llm(LlmError::Timeout(Duration::from_secs(5)))
        );
    }
}
