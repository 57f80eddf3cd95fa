use crate::args::ListArgs;
use crate::commands::Out;
use crate::db::{ExpenseFilter, StoredExpense};
use crate::error::{ErrorType, IntoResult};
use crate::model::Amount;
use crate::{Config, Result};
use anyhow::anyhow;
use rust_decimal::Decimal;
use serde::Serialize;

/// The listed expenses and their total.
#[derive(Debug, Clone, Serialize)]
pub struct ListOutput {
    pub total: Amount,
    pub expenses: Vec<StoredExpense>,
}

/// Lists saved expenses of the configured owner, or of everyone with `--all-owners`. Both ends of
/// the `--from`/`--to` range are inclusive.
pub async fn list(config: &Config, args: &ListArgs) -> Result<Out<ListOutput>> {
    if let (Some(from), Some(to)) = (args.from(), args.to()) {
        if from > to {
            return Err(anyhow!("The range starts on {from}, after it ends on {to}"))
                .pub_result(ErrorType::Request);
        }
    }
    let filter = ExpenseFilter {
        owner: (!args.all_owners()).then(|| config.owner().to_string()),
        category: args.category(),
        from: args.from(),
        to: args.to(),
        limit: Some(args.limit()),
    };
    let expenses = config
        .db()
        .list_expenses(&filter)
        .await
        .pub_result(ErrorType::Database)?;
    let total = Amount::new(
        expenses
            .iter()
            .map(|e| e.record.amount().value())
            .sum::<Decimal>(),
    );
    let noun = if expenses.len() == 1 { "expense" } else { "expenses" };
    Ok(Out::new(
        format!("Found {} {noun} totaling {total}", expenses.len()),
        ListOutput { total, expenses },
    ))
}
