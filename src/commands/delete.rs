use crate::args::DeleteArgs;
use crate::commands::Out;
use crate::error::{ErrorType, IntoResult};
use crate::{Config, Result};
use anyhow::anyhow;
use serde::Serialize;

/// The id of the deleted expense.
#[derive(Debug, Clone, Serialize)]
pub struct DeleteOutput {
    pub id: String,
}

/// Deletes one of the configured owner's expenses. Another owner's expense is reported as not
/// found.
pub async fn delete(config: &Config, args: &DeleteArgs) -> Result<Out<DeleteOutput>> {
    let id = args.id().trim();
    let deleted = config
        .db()
        .delete_expense(config.owner(), id)
        .await
        .pub_result(ErrorType::Database)?;
    if !deleted {
        return Err(anyhow!(
            "No expense with id '{id}' belongs to {}",
            config.owner()
        ))
        .pub_result(ErrorType::Request);
    }
    Ok(Out::new(
        format!("Deleted expense {id}"),
        DeleteOutput { id: id.to_string() },
    ))
}
