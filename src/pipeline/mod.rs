//! The expense pipeline: optional OCR, then extraction, normalization and validation.
//!
//! Each stage runs at most once and the first failure ends the run with a `PipelineError` naming
//! the stage. Nothing is retried here; that decision belongs to the caller.

pub mod dates;
mod error;
mod extract;
mod normalize;
mod ocr;
mod validate;

pub use error::{
    ExtractionError, Field, NormalizationError, PipelineError, Stage, StageError, StrategyFailure,
    ValidationError, VisionError,
};
pub use extract::Extractor;
pub use normalize::{build_prompt, Normalizer};
pub use ocr::{
    ImageFormat, ImageInput, OcrStrategy, ReceiptReader, StrategyKind, TesseractOcr, VisionOcr,
    DEFAULT_MAX_IMAGE_BYTES,
};
pub use validate::{validate, MAX_DESCRIPTION_CHARS};

use crate::llm::{self, CompletionRequest, Llm, LlmError, Mode};
use crate::model::ValidatedRecord;
use crate::Config;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// Sampling settings for one model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct StageSettings {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl StageSettings {
    pub const EXTRACTION: StageSettings = StageSettings {
        temperature: 0.3,
        max_tokens: 256,
    };

    pub const NORMALIZATION: StageSettings = StageSettings {
        temperature: 0.2,
        max_tokens: 256,
    };

    pub const VISION: StageSettings = StageSettings {
        temperature: 0.2,
        max_tokens: 1024,
    };
}

/// What the pipeline is asked to turn into an expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineInput {
    Text(String),
    Image(ImageInput),
}

/// Calls the model with an upper bound on how long it may take.
pub(crate) async fn call_model(
    llm: &dyn Llm,
    request: &CompletionRequest,
    timeout: Duration,
) -> Result<String, LlmError> {
    match tokio::time::timeout(timeout, llm.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(LlmError::Timeout(timeout)),
    }
}

/// Runs `work` for `stage` unless `cancel` fires first.
async fn guarded<T, E, F>(
    stage: Stage,
    cancel: &CancellationToken,
    work: F,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
    E: Into<StageError>,
{
    debug!("Starting the {stage} stage");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("Cancelled during the {stage} stage");
            Err(PipelineError::cancelled(stage))
        }
        result = work => result.map_err(|e| PipelineError::new(stage, e)),
    }
}

/// Turns free text or a receipt image into a `ValidatedRecord`.
pub struct Pipeline {
    reader: ReceiptReader,
    extractor: Extractor,
    normalizer: Normalizer,
}

impl Pipeline {
    pub fn new(reader: ReceiptReader, extractor: Extractor, normalizer: Normalizer) -> Self {
        Self {
            reader,
            extractor,
            normalizer,
        }
    }

    /// Builds a pipeline whose stages, including vision OCR, all use `llm` with default settings.
    pub fn with_llm(llm: Arc<dyn Llm>, timeout: Duration) -> Self {
        let reader = ReceiptReader::new(
            vec![Box::new(VisionOcr::new(
                llm.clone(),
                StageSettings::VISION,
                timeout,
            ))],
            timeout,
        );
        Self::new(
            reader,
            Extractor::new(llm.clone(), StageSettings::EXTRACTION, timeout),
            Normalizer::new(llm, StageSettings::NORMALIZATION, timeout),
        )
    }

    /// Builds the pipeline described by `config`. In `Mode::Testing` every model is a `TestLlm`
    /// and OCR uses the vision strategy only.
    pub fn from_config(config: &Config, mode: Mode) -> crate::Result<Self> {
        let timeout = config.stage_timeout();
        let text_llm = llm::client(config, mode, config.model())?;
        let vision_llm = llm::client(config, mode, config.vision_model())?;
        let kinds = match mode {
            Mode::Live => config.ocr_strategies().to_vec(),
            Mode::Testing => vec![StrategyKind::Vision],
        };
        let reader = ReceiptReader::from_kinds(
            &kinds,
            config.tesseract_path(),
            vision_llm,
            StageSettings::VISION,
            timeout,
        );
        Ok(Self::new(
            reader,
            Extractor::new(text_llm.clone(), config.extraction(), timeout),
            Normalizer::new(text_llm, config.normalization(), timeout),
        ))
    }

    pub async fn run(
        &self,
        input: PipelineInput,
        reference_date: NaiveDate,
    ) -> Result<ValidatedRecord, PipelineError> {
        self.run_cancellable(input, reference_date, &CancellationToken::new())
            .await
    }

    /// Like `run`, but stops at the current stage with `StageError::Cancelled` when `cancel`
    /// fires. Later stages do not run.
    pub async fn run_cancellable(
        &self,
        input: PipelineInput,
        reference_date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<ValidatedRecord, PipelineError> {
        let text = match input {
            PipelineInput::Text(text) => text,
            PipelineInput::Image(image) => {
                guarded(Stage::Ocr, cancel, self.reader.extract_text(&image)).await?
            }
        };

        let candidate = guarded(Stage::Extract, cancel, self.extractor.extract(&text)).await?;
        debug!("Candidate: {}", candidate.to_json());

        let normalized = guarded(
            Stage::Normalize,
            cancel,
            self.normalizer.normalize(&candidate, reference_date),
        )
        .await?;
        debug!("Normalized: {}", normalized.to_json());

        if cancel.is_cancelled() {
            return Err(PipelineError::cancelled(Stage::Validate));
        }
        let record =
            validate(&normalized).map_err(|e| PipelineError::new(Stage::Validate, e))?;
        info!(
            "Parsed a {} expense of {} on {}",
            record.category(),
            record.amount(),
            record.date()
        );
        Ok(record)
    }
}
