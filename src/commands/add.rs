use crate::args::AddArgs;
use crate::commands::Out;
use crate::db::{RecordStore, StoredExpense};
use crate::error::{ErrorType, IntoResult};
use crate::model::{iso_date, Amount, CandidateRecord};
use crate::pipeline::dates::resolve_date;
use crate::pipeline::{validate, PipelineError, Stage};
use crate::{Config, Result};
use anyhow::Context;
use chrono::NaiveDate;
use serde_json::Value;
use std::str::FromStr;

/// Manual entry: validates the typed-in fields and stores the expense. No language model is
/// involved, so this works when parsing is unavailable or keeps getting the expense wrong.
///
/// The amount may carry a currency symbol and separators (`$1,200`). The date may be ISO or any
/// expression `pipeline::dates` understands; it defaults to `today`.
pub async fn add(config: &Config, args: &AddArgs, today: NaiveDate) -> Result<Out<StoredExpense>> {
    let amount = match Amount::from_str(args.amount()) {
        Ok(amount) => Value::String(amount.value().to_string()),
        Err(_) => Value::String(args.amount().to_string()),
    };
    let date = match args.date() {
        None => today.format(iso_date::FORMAT).to_string(),
        Some(expr) => resolve_date(expr, today)
            .map(|d| d.format(iso_date::FORMAT).to_string())
            .unwrap_or_else(|| expr.to_string()),
    };
    let candidate = CandidateRecord::new(
        amount,
        Value::String(args.category().to_string()),
        args.description()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        Value::String(date),
    );

    let record = validate(&candidate)
        .map_err(|e| PipelineError::new(Stage::Validate, e))
        .pub_result(ErrorType::Pipeline)?;
    let stored = config
        .db()
        .create(config.owner(), &record)
        .await
        .context("Unable to save the expense")
        .pub_result(ErrorType::Database)?;
    Ok(Out::new(
        format!(
            "Saved {} {} on {} as {}",
            record.amount(),
            record.category(),
            record.date(),
            stored.id
        ),
        stored,
    ))
}
