use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::model::{json_type, CandidateRecord, ValidatedRecord};
use crate::pipeline::{self, PipelineError, Stage};
use crate::{utils, Result};
use anyhow::anyhow;
use serde_json::Value;
use std::path::Path;

/// Checks the JSON object in `file` against the expense schema without calling any model.
pub async fn validate(file: &Path) -> Result<Out<ValidatedRecord>> {
    let value: Value = utils::deserialize(file).await.pub_result(ErrorType::Request)?;
    let map = match value {
        Value::Object(map) => map,
        other => {
            return Err(anyhow!(
                "Expected a JSON object in '{}' but found {}",
                file.display(),
                json_type(&other)
            ))
            .pub_result(ErrorType::Request)
        }
    };
    let record = pipeline::validate(&CandidateRecord::from_map(map))
        .map_err(|e| PipelineError::new(Stage::Validate, e))
        .pub_result(ErrorType::Pipeline)?;
    Ok(Out::new(format!("{} is a valid expense", file.display()), record))
}
