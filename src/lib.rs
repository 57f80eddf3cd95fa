//! Turns free-text expense descriptions and receipt images into validated expense records.
//!
//! A `pipeline::Pipeline` runs four stages: OCR (images only), extraction, normalization and
//! validation. Only a `model::ValidatedRecord` comes out of it, and only validated records are
//! stored by the `db` module.

pub mod args;
pub mod commands;
mod config;
pub mod db;
mod error;
pub mod llm;
pub mod model;
pub mod pipeline;
mod utils;


pub use config::Config;
pub use error::{error_type, pipeline_error, Error, ErrorType, IntoResult, Result};
pub use llm::Mode;
