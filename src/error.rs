//! Application-level error handling.
//!
//! Internally everything is an `anyhow::Error`. Commands tag the errors they surface to the user
//! with an `ErrorType` so that `main` can pick an exit code without string matching.

use crate::pipeline::PipelineError;
use serde::{Deserialize, Serialize};
use std::process::ExitCode;

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The broad category of an error that is reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    /// The home directory or `config.json` is missing or invalid.
    Config,
    /// The user's input could not be used, e.g. an unreadable receipt path.
    Request,
    /// The extraction pipeline failed at one of its stages.
    Pipeline,
    /// A SQLite operation failed.
    Database,
    /// A filesystem operation failed.
    Io,
}

serde_plain::derive_display_from_serialize!(ErrorType);
serde_plain::derive_fromstr_from_deserialize!(ErrorType);

impl ErrorType {
    /// The process exit code used when a command fails with this type of error.
    pub fn exit_code(&self) -> ExitCode {
        match self {
            ErrorType::Config => ExitCode::from(2),
            ErrorType::Request => ExitCode::from(3),
            ErrorType::Pipeline => ExitCode::from(4),
            ErrorType::Database => ExitCode::from(5),
            ErrorType::Io => ExitCode::from(6),
        }
    }
}

/// Tags the error side of a result with an `ErrorType`.
pub trait IntoResult<T> {
    fn pub_result(self, error_type: ErrorType) -> Result<T>;
}

impl<T, E> IntoResult<T> for std::result::Result<T, E>
where
    E: Into<Error>,
{
    fn pub_result(self, error_type: ErrorType) -> Result<T> {
        self.map_err(|e| e.into().context(error_type))
    }
}

/// Finds the `ErrorType` that a command attached to `e`, if any.
pub fn error_type(e: &Error) -> Option<ErrorType> {
    e.downcast_ref::<ErrorType>().copied()
}

/// Finds the pipeline failure inside `e`, if the command failed in the pipeline.
pub fn pipeline_error(e: &Error) -> Option<&PipelineError> {
    e.downcast_ref::<PipelineError>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_pub_result_attaches_type() {
        let result: std::result::Result<(), Error> = Err(anyhow!("disk on fire"));
        let e = result.pub_result(ErrorType::Database).unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Database));
        assert!(format!("{e:#}").contains("disk on fire"));
    }

    #[test]
    fn test_untagged_error_has_no_type() {
        let e = anyhow!("plain");
        assert_eq!(error_type(&e), None);
    }

    #[test]
    fn test_pipeline_error_survives_context() {
        use crate::pipeline::{PipelineError, Stage, StageError};
        use anyhow::Context;

        let result: std::result::Result<(), PipelineError> =
            Err(PipelineError::cancelled(Stage::Normalize));
        let e = result
            .pub_result(ErrorType::Pipeline)
            .context("Unable to parse the expense")
            .unwrap_err();
        assert_eq!(error_type(&e), Some(ErrorType::Pipeline));
        let found = pipeline_error(&e).unwrap();
        assert_eq!(found.stage, Stage::Normalize);
        assert_eq!(found.cause, StageError::Cancelled);
    }

    #[test]
    fn test_error_type_display() {
        assert_eq!(ErrorType::Pipeline.to_string(), "pipeline");
    }
}
