//! Command handlers for the expense CLI.
//!
//! This module contains implementations for all CLI subcommands.

mod add;
mod check;
mod delete;
mod init;
mod list;
mod parse;
mod receipt;
mod schema;
mod totals;
mod validate;

use crate::db::{RecordStore, StoredExpense};
use crate::error::{ErrorType, IntoResult};
use crate::model::ValidatedRecord;
use crate::{Config, Result};
use anyhow::Context;
use serde::Serialize;
use std::fmt::Debug;
use tracing::{debug, info};

pub use add::add;
pub use check::{check, CheckOutput};
pub use delete::{delete, DeleteOutput};
pub use init::init;
pub use list::{list, ListOutput};
pub use parse::parse;
pub use receipt::receipt;
pub use schema::schema;
pub use totals::{totals, TotalsOutput};
pub use validate::validate;

/// The output type for a command. This allows the command to return a consistent message and,
/// optionally, structured data.
#[derive(Debug, Clone, Serialize)]
pub struct Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// A message that can be printed to the user regarding the outcome of the command execution.
    message: String,

    /// Any structured data that needs to be output from the call.
    structure: Option<T>,
}

impl<T, S> From<S> for Out<T>
where
    T: Debug + Clone + Serialize,
    S: Into<String>,
{
    fn from(value: S) -> Self {
        Out::new_message(value)
    }
}

impl<T> Out<T>
where
    T: Serialize + Clone + Debug,
{
    /// Create a new `Out` object that has `Some(structure)`.
    pub fn new<S>(message: S, structure: T) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: Some(structure),
        }
    }

    /// Create a new `Out` object that has `None` for `structure`.
    pub fn new_message<S>(message: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            message: message.into(),
            structure: None,
        }
    }

    /// Get the `message`.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Get the structured data stored in `structure`.
    pub fn structure(&self) -> Option<&T> {
        self.structure.as_ref()
    }

    /// Logs the message with `info!` and prints the structured data, if any, as JSON on stdout so
    /// that it can be piped to other programs.
    pub fn print(&self) {
        info!("{}", self.message);
        if let Some(structure) = self.structure() {
            match serde_json::to_string_pretty(structure) {
                Ok(json) => println!("{json}"),
                Err(e) => debug!("Unable to serialize command output: {e}"),
            }
        }
    }
}

/// A parsed expense and, if it was saved, the stored row.
#[derive(Debug, Clone, Serialize)]
pub struct ParseOutput {
    pub record: ValidatedRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<StoredExpense>,
}

/// Saves `record` for the configured owner when `save` is set.
async fn maybe_save(
    config: &Config,
    record: ValidatedRecord,
    save: bool,
) -> Result<Out<ParseOutput>> {
    if !save {
        return Ok(Out::new(
            format!("Parsed {}", describe(&record)),
            ParseOutput {
                record,
                saved: None,
            },
        ));
    }
    let stored = config
        .db()
        .create(config.owner(), &record)
        .await
        .context("Unable to save the expense")
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!("Saved {} as {}", describe(&record), stored.id),
        ParseOutput {
            record,
            saved: Some(stored),
        },
    ))
}

fn describe(record: &ValidatedRecord) -> String {
    format!(
        "{} {} on {}",
        record.amount(),
        record.category(),
        record.date()
    )
}
