//! Implements the `Llm` trait with scripted, in-memory responses for testing purposes.
//!
//! Note: this is compiled even in the "production" version of this app so that we can run the whole
//! app, top-to-bottom, without calling a hosted model. Set `EXPENSE_IN_TEST_MODE` to use it.

use crate::llm::{CompletionRequest, Llm, LlmError};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::trace;

/// Returned for text requests when nothing has been scripted.
pub const CANNED_RECORD: &str = r#"{"amount": 45.0, "category": "Food", "description": "Dinner at Olive Garden", "date": "2026-02-17"}"#;

/// Returned for image requests when nothing has been scripted.
pub const CANNED_RECEIPT_TEXT: &str = "OLIVE GARDEN #1234\n02/17/2026\nTOTAL $45.00";

#[derive(Debug, Clone)]
enum Scripted {
    Text(String),
    Error(LlmError),
    Hang,
}

#[derive(Debug, Default)]
struct State {
    script: VecDeque<Scripted>,
    requests: Vec<CompletionRequest>,
}

/// An implementation of the `Llm` trait that answers from a queue of scripted responses and
/// records every request it receives. Clones share the same queue and request log.
#[derive(Debug, Clone, Default)]
pub struct TestLlm {
    state: Arc<Mutex<State>>,
}

impl TestLlm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a text response.
    pub fn push_response(&self, text: impl Into<String>) -> &Self {
        self.push(Scripted::Text(text.into()))
    }

    /// Queues a failure.
    pub fn push_error(&self, error: LlmError) -> &Self {
        self.push(Scripted::Error(error))
    }

    /// Queues a call that never completes.
    pub fn push_hang(&self) -> &Self {
        self.push(Scripted::Hang)
    }

    /// Every request received so far, oldest first.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.lock().requests.clone()
    }

    pub fn call_count(&self) -> usize {
        self.lock().requests.len()
    }

    fn push(&self, item: Scripted) -> &Self {
        self.lock().script.push_back(item);
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        // A poisoned lock only means another test thread panicked; the data is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait::async_trait]
impl Llm for TestLlm {
    fn name(&self) -> String {
        "test".to_string()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        let next = {
            let mut state = self.lock();
            state.requests.push(request.clone());
            state.script.pop_front()
        };
        trace!("Test model answering with {next:?}");
        match next {
            Some(Scripted::Text(text)) => Ok(text),
            Some(Scripted::Error(e)) => Err(e),
            Some(Scripted::Hang) => std::future::pending().await,
            None if request.image.is_some() => Ok(CANNED_RECEIPT_TEXT.to_string()),
            None => Ok(CANNED_RECORD.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest {
            system: String::new(),
            user: "hi".to_string(),
            image: None,
            temperature: 0.0,
            max_tokens: 1,
            json_output: false,
        }
    }

    #[tokio::test]
    async fn test_scripted_then_canned() {
        let llm = TestLlm::new();
        llm.push_response("one")
            .push_error(LlmError::EmptyResponse);
        assert_eq!(llm.complete(&request()).await.unwrap(), "one");
        assert_eq!(
            llm.complete(&request()).await.unwrap_err(),
            LlmError::EmptyResponse
        );
        assert_eq!(llm.complete(&request()).await.unwrap(), CANNED_RECORD);
        assert_eq!(llm.call_count(), 3);
        assert_eq!(llm.requests()[0].user, "hi");
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let llm = TestLlm::new();
        let other = llm.clone();
        other.push_response("shared");
        assert_eq!(llm.complete(&request()).await.unwrap(), "shared");
        assert_eq!(other.call_count(), 1);
    }
}
