use crate::args::TotalsArgs;
use crate::commands::Out;
use crate::db::{CategoryTotal, ExpenseFilter};
use crate::error::{ErrorType, IntoResult};
use crate::model::Amount;
use crate::{Config, Result};
use anyhow::Context;
use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;

/// Per-category spending and the grand total.
#[derive(Debug, Clone, Serialize)]
pub struct TotalsOutput {
    /// `YYYY-MM` when the totals cover a single month.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
    pub total: Amount,
    pub categories: Vec<CategoryTotal>,
}

/// Sums the configured owner's expenses per category, or everyone's with `--all-owners`.
pub async fn totals(config: &Config, args: &TotalsArgs) -> Result<Out<TotalsOutput>> {
    let (from, to) = match args.month() {
        Some(first) => {
            let last = month_end(first)
                .with_context(|| format!("The month of {first} has no last day"))
                .pub_result(ErrorType::Request)?;
            (Some(first), Some(last))
        }
        None => (None, None),
    };
    let filter = ExpenseFilter {
        owner: (!args.all_owners()).then(|| config.owner().to_string()),
        category: None,
        from,
        to,
        limit: None,
    };
    let categories = config
        .db()
        .category_totals(&filter)
        .await
        .pub_result(ErrorType::Database)?;
    let total = Amount::new(categories.iter().map(|t| t.total.value()).sum::<Decimal>());
    let month = args.month().map(|d| d.format("%Y-%m").to_string());
    let scope = match &month {
        Some(m) => format!(" in {m}"),
        None => String::new(),
    };
    Ok(Out::new(
        format!(
            "Spent {total}{scope} across {} categories",
            categories.len()
        ),
        TotalsOutput {
            month,
            total,
            categories,
        },
    ))
}

fn month_end(first: NaiveDate) -> Option<NaiveDate> {
    first
        .checked_add_months(Months::new(1))
        .and_then(|d| d.pred_opt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args::AddArgs;
    use crate::commands::add;
    use crate::model::Category;
    use crate::test::TestEnv;
    use std::str::FromStr;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_month_end() {
        assert_eq!(month_end(ymd(2026, 2, 1)), Some(ymd(2026, 2, 28)));
        assert_eq!(month_end(ymd(2024, 2, 1)), Some(ymd(2024, 2, 29)));
        assert_eq!(month_end(ymd(2026, 12, 1)), Some(ymd(2026, 12, 31)));
    }

    #[tokio::test]
    async fn test_totals_by_month() {
        let env = TestEnv::new().await;
        let config = env.config();
        let entries = [
            ("4.50", "Food", "2026-02-01"),
            ("10.25", "Food", "2026-02-28"),
            ("30", "Transportation", "2026-02-10"),
            ("99", "Food", "2026-01-31"),
            ("7", "Bills", "2026-03-01"),
        ];
        for (amount, category, date) in entries {
            let args = AddArgs::new(amount, category, Some(date.to_string()), None);
            add(&config, &args, TestEnv::today()).await.unwrap();
        }

        let out = totals(&config, &TotalsArgs::new(Some(ymd(2026, 2, 1)), false))
            .await
            .unwrap();
        assert_eq!(out.message(), "Spent $44.75 in 2026-02 across 2 categories");
        let output = out.structure().unwrap();
        assert_eq!(output.month.as_deref(), Some("2026-02"));
        assert_eq!(output.categories.len(), 2);
        assert_eq!(output.categories[0].category, Category::Food);
        assert_eq!(output.categories[0].count, 2);
        assert_eq!(
            output.categories[0].total.value(),
            Decimal::from_str("14.75").unwrap()
        );
        assert_eq!(output.categories[1].category, Category::Transportation);

        let out = totals(&config, &TotalsArgs::new(None, false)).await.unwrap();
        let output = out.structure().unwrap();
        assert_eq!(output.month, None);
        assert_eq!(output.total.value(), Decimal::from_str("150.75").unwrap());
        assert_eq!(output.categories.len(), 3);
    }

    #[tokio::test]
    async fn test_totals_empty() {
        let env = TestEnv::new().await;
        let out = totals(&env.config(), &TotalsArgs::new(None, true))
            .await
            .unwrap();
        assert_eq!(out.message(), "Spent $0.00 across 0 categories");
        assert!(out.structure().unwrap().categories.is_empty());
    }
}
