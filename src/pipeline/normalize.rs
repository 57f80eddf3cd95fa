use crate::llm::{CompletionRequest, Llm};
use crate::model::{iso_date, parse_object, CandidateRecord, Category, NormalizedRecord, RawRecord};
use crate::pipeline::dates::resolve_date;
use crate::pipeline::error::NormalizationError;
use crate::pipeline::{call_model, StageSettings};
use chrono::{Datelike, NaiveDate};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SYSTEM_PROMPT: &str = "You are a data normalization assistant. You clean up expense \
records extracted from free text so that they pass a strict schema check. \
Return ONLY a JSON object, no other text and no code fences.";

/// The second model call: maps a candidate onto the canonical categories and an ISO date.
pub struct Normalizer {
    llm: Arc<dyn Llm>,
    settings: StageSettings,
    timeout: Duration,
}

impl Normalizer {
    pub fn new(llm: Arc<dyn Llm>, settings: StageSettings, timeout: Duration) -> Self {
        Self {
            llm,
            settings,
            timeout,
        }
    }

    /// Builds the completion request. This depends only on its arguments, so the same candidate
    /// and reference date always produce the same request.
    pub fn request(&self, candidate: &CandidateRecord, reference_date: NaiveDate) -> CompletionRequest {
        CompletionRequest {
            system: SYSTEM_PROMPT.to_string(),
            user: build_prompt(candidate, reference_date),
            image: None,
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            json_output: true,
        }
    }

    pub async fn normalize(
        &self,
        candidate: &CandidateRecord,
        reference_date: NaiveDate,
    ) -> Result<NormalizedRecord, NormalizationError> {
        let request = self.request(candidate, reference_date);
        let raw = call_model(self.llm.as_ref(), &request, self.timeout).await?;
        debug!("Normalization returned {} bytes", raw.len());
        let map = parse_object(&raw)?;
        Ok(NormalizedRecord::from_map(map))
    }
}

/// The user turn of the normalization request.
pub fn build_prompt(candidate: &CandidateRecord, reference_date: NaiveDate) -> String {
    let reference = reference_date.format(iso_date::FORMAT);
    let weekday = reference_date.weekday();

    let mut prompt = format!(
        "Extracted data: {}\n\nToday is {reference} ({weekday}).\n",
        candidate.to_json()
    );
    if let Some(hint) = date_hint(candidate.date(), reference_date) {
        prompt.push_str(&format!(
            "The date {} resolves to {}.\n",
            candidate.date(),
            hint.format(iso_date::FORMAT)
        ));
    }

    prompt.push_str("\nNormalize the data according to these rules:\n");
    prompt.push_str(&format!(
        "1. category MUST be exactly one of: {}\n",
        Category::canonical_list()
    ));
    prompt.push_str(
        "2. amount must be a plain non-negative number. \
         Remove currency symbols and thousands separators.\n",
    );
    prompt.push_str(&format!(
        "3. date must be in YYYY-MM-DD format. Resolve relative dates against {reference}. \
         A date without a year is in {}. If there is no date, use {reference}.\n",
        reference_date.year()
    ));
    prompt.push_str("4. description should be clear and concise, at most 200 characters.\n");

    prompt.push_str("\nCategory hints:\n");
    for category in Category::ALL {
        prompt.push_str(&format!("- {} -> \"{category}\"\n", category.keywords()));
    }
    prompt.push_str(
        "\nReturn ONLY a JSON object of the form \
         {\"amount\": <number>, \"category\": \"<category>\", \"description\": \"<text>\", \
         \"date\": \"<YYYY-MM-DD>\"}",
    );
    prompt
}

fn date_hint(date: &Value, reference_date: NaiveDate) -> Option<NaiveDate> {
    match date {
        Value::String(s) => resolve_date(s, reference_date),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::TestLlm;
    use crate::pipeline::validate;
    use serde_json::json;

    fn candidate(v: Value) -> CandidateRecord {
        match v {
            Value::Object(map) => CandidateRecord::from_map(map),
            _ => panic!("test records must be objects"),
        }
    }

    fn reference() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()
    }

    fn normalizer(llm: &TestLlm) -> Normalizer {
        Normalizer::new(
            Arc::new(llm.clone()),
            StageSettings::NORMALIZATION,
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_prompt_contents() {
        let c = candidate(json!({"amount": "$45", "category": "dinner", "date": "yesterday"}));
        let prompt = build_prompt(&c, reference());
        assert!(prompt.contains("Today is 2026-02-17 (Tue)."));
        assert!(prompt.contains("The date \"yesterday\" resolves to 2026-02-16."));
        assert!(prompt.contains(
            "Food, Transportation, Entertainment, Shopping, Bills, Healthcare, Education, Other"
        ));
        assert!(prompt.contains("A date without a year is in 2026."));
    }

    #[test]
    fn test_prompt_layout() {
        let c = candidate(json!({"amount": 12, "category": "taxi", "date": "2026-02-10"}));
        let prompt = build_prompt(&c, reference());
        let lines: Vec<&str> = prompt.lines().collect();
        assert!(lines[0].starts_with("Extracted data: {"));
        assert_eq!(lines[1], "");
        assert_eq!(lines[2], "Today is 2026-02-17 (Tue).");
        assert_eq!(lines[3], "The date \"2026-02-10\" resolves to 2026-02-10.");
        for category in Category::ALL {
            let hint = format!("- {} -> \"{category}\"", category.keywords());
            assert!(lines.contains(&hint.as_str()), "{hint}");
        }
        assert!(prompt.ends_with("\"date\": \"<YYYY-MM-DD>\"}"));
    }

    #[test]
    fn test_prompt_without_resolvable_date() {
        let c = candidate(json!({"amount": 3, "date": null}));
        let prompt = build_prompt(&c, reference());
        assert!(!prompt.contains("resolves to"));
        assert!(prompt.contains("If there is no date, use 2026-02-17."));
    }

    #[tokio::test]
    async fn test_normalization_is_deterministic() {
        let c = candidate(json!({"amount": 45, "category": "dinner", "date": "2/17"}));
        let response = r#"{"amount": 45, "category": "Food", "description": "Dinner", "date": "2026-02-17"}"#;
        let llm = TestLlm::new();
        llm.push_response(response).push_response(response);
        let n = normalizer(&llm);

        let first = n.normalize(&c, reference()).await.unwrap();
        let second = n.normalize(&c, reference()).await.unwrap();
        assert_eq!(first, second);

        let requests = llm.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
        assert_eq!(requests[0].temperature, 0.2);
        assert_eq!(requests[0].max_tokens, 256);
        assert_eq!(
            validate(&first).unwrap().date(),
            NaiveDate::from_ymd_opt(2026, 2, 17).unwrap()
        );
    }

    #[tokio::test]
    async fn test_truncated_response_is_malformed() {
        let llm = TestLlm::new();
        llm.push_response(r#"{"amount": 45, "category": "Fo"#);
        let e = normalizer(&llm)
            .normalize(&candidate(json!({})), reference())
            .await
            .unwrap_err();
        assert!(matches!(e, NormalizationError::Malformed { .. }));
    }
}
