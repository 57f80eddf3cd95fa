//! The error taxonomy of the pipeline. Every failure names the stage it happened in.

use crate::llm::LlmError;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// A step of the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Ocr,
    Extract,
    Normalize,
    Validate,
}

serde_plain::derive_display_from_serialize!(Stage);
serde_plain::derive_fromstr_from_deserialize!(Stage);

/// One record field, as named in validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Amount,
    Category,
    Description,
    Date,
}

serde_plain::derive_display_from_serialize!(Field);
serde_plain::derive_fromstr_from_deserialize!(Field);

/// A record broke one of the hard constraints.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: Field,
    pub reason: String,
}

impl ValidationError {
    pub(crate) fn new(field: Field, reason: impl Into<String>) -> Self {
        Self {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("extraction model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("extraction returned malformed JSON ({reason}): {raw_response:?}")]
    Malformed {
        raw_response: String,
        reason: String,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("normalization model call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("normalization returned malformed JSON ({reason}): {raw_response:?}")]
    Malformed {
        raw_response: String,
        reason: String,
    },
}

impl From<crate::model::MalformedJson> for ExtractionError {
    fn from(m: crate::model::MalformedJson) -> Self {
        ExtractionError::Malformed {
            raw_response: m.raw_response,
            reason: m.reason,
        }
    }
}

impl From<crate::model::MalformedJson> for NormalizationError {
    fn from(m: crate::model::MalformedJson) -> Self {
        NormalizationError::Malformed {
            raw_response: m.raw_response,
            reason: m.reason,
        }
    }
}

/// Why one OCR strategy did not produce text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyFailure {
    pub strategy: String,
    pub reason: String,
}

impl Display for StrategyFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.strategy, self.reason)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VisionError {
    #[error("unsupported image format '{0}', expected JPEG, PNG, GIF or WebP")]
    UnsupportedFormat(String),

    #[error("the image bytes do not look like {0}")]
    ContentMismatch(String),

    #[error("the image is empty")]
    Empty,

    #[error("the image is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("no OCR strategies are configured")]
    NoStrategies,

    #[error("every OCR strategy failed: {}", join_failures(.0))]
    AllStrategiesFailed(Vec<StrategyFailure>),
}

fn join_failures(failures: &[StrategyFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// What went wrong inside a stage.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error(transparent)]
    Vision(#[from] VisionError),

    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    #[error(transparent)]
    Normalization(#[from] NormalizationError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("cancelled")]
    Cancelled,
}

/// The pipeline stopped at `stage`. Serializes as `{"stage": "...", "reason": "..."}`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{stage} stage failed: {cause}")]
pub struct PipelineError {
    pub stage: Stage,
    #[source]
    pub cause: StageError,
}

impl PipelineError {
    pub fn new(stage: Stage, cause: impl Into<StageError>) -> Self {
        Self {
            stage,
            cause: cause.into(),
        }
    }

    pub fn cancelled(stage: Stage) -> Self {
        Self::new(stage, StageError::Cancelled)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cause == StageError::Cancelled
    }

    /// The validation failure, when the pipeline stopped at validation.
    pub fn validation_error(&self) -> Option<&ValidationError> {
        match &self.cause {
            StageError::Validation(e) => Some(e),
            _ => None,
        }
    }
}

impl Serialize for PipelineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("PipelineError", 2)?;
        s.serialize_field("stage", &self.stage)?;
        s.serialize_field("reason", &self.cause.to_string())?;
        s.end()
    }
}
