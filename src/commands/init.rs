use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::llm::Provider;
use crate::{Config, Result};
use anyhow::Context;
use std::path::Path;

/// Creates the data directory with an initial `config.json` for `provider` and an empty expense
/// database.
///
/// # Arguments
/// - `expense_home` - The directory that will be the root of the data directory, e.g.
///   `$HOME/expense`
/// - `provider` - The model provider whose defaults go into `config.json`
/// - `model` - Overrides the provider's default text model
///
/// # Errors
/// - Returns an error if any file operations fail or the directory is already initialized.
pub async fn init(expense_home: &Path, provider: Provider, model: Option<&str>) -> Result<Out<()>> {
    let config = Config::create(expense_home, provider, model.map(str::to_string))
        .await
        .context("Unable to create the data directory and configs")
        .pub_result(ErrorType::Config)?;
    Ok(format!(
        "Created {}. Set {} before parsing expenses.",
        config.config_path().display(),
        config.api_key_env()
    )
    .into())
}
