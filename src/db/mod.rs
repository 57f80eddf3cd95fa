//! The SQLite record store. Only `ValidatedRecord`s can be written to it.

mod migrations;

use crate::model::{iso_date, Amount, Category, ValidatedRecord};
use crate::Result;
use anyhow::{bail, Context};
use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Persists validated expenses.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    async fn create(&self, owner: &str, record: &ValidatedRecord) -> Result<StoredExpense>;
}

/// An expense as it was written to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredExpense {
    pub id: String,
    pub owner: String,
    #[serde(flatten)]
    pub record: ValidatedRecord,
    pub created_at: String,
}

/// Filters for `Db::list_expenses` and `Db::category_totals`. `None` means no restriction. Both
/// ends of the date range are inclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseFilter {
    pub owner: Option<String>,
    pub category: Option<Category>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// Ignored by `category_totals`.
    pub limit: Option<u32>,
}

impl ExpenseFilter {
    fn from_text(&self) -> Option<String> {
        self.from.map(|d| d.format(iso_date::FORMAT).to_string())
    }

    fn to_text(&self) -> Option<String> {
        self.to.map(|d| d.format(iso_date::FORMAT).to_string())
    }
}

/// The sum of one category's expenses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub count: u64,
    pub total: Amount,
}

/// The `WHERE` clause shared by the filtered queries, binding owner, category, from and to.
const FILTER_CLAUSE: &str = "(?1 IS NULL OR owner = ?1) AND (?2 IS NULL OR category = ?2) \
     AND (?3 IS NULL OR date >= ?3) AND (?4 IS NULL OR date <= ?4)";

#[derive(Debug, Clone)]
pub struct Db {
    pool: SqlitePool,
}

impl Db {
    /// Creates a new SQLite file at `path` and brings its schema up to date. Fails if the file
    /// already exists.
    pub async fn init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            bail!("A database already exists at '{}'", path.display());
        }
        let pool = connect(path, true).await?;
        sqlx::query("CREATE TABLE schema_version (version INTEGER NOT NULL)")
            .execute(&pool)
            .await
            .context("Failed to create schema_version table")?;
        sqlx::query("INSERT INTO schema_version (version) VALUES (0)")
            .execute(&pool)
            .await
            .context("Failed to initialize schema_version")?;
        migrations::run(&pool, 0, migrations::LATEST).await?;
        info!("Created expense database at {}", path.display());
        Ok(Self { pool })
    }

    /// Opens the existing SQLite file at `path` and migrates it if it is behind.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            bail!("The database file is missing '{}'", path.display());
        }
        let pool = connect(path, false).await?;
        let db = Self { pool };
        let version = db.schema_version().await?;
        if version > migrations::LATEST {
            bail!(
                "The database is at schema version {version} but this program only knows up to {}",
                migrations::LATEST
            );
        }
        migrations::run(&db.pool, version, migrations::LATEST).await?;
        Ok(db)
    }

    pub async fn schema_version(&self) -> Result<i32> {
        let row: (i32,) = sqlx::query_as("SELECT version FROM schema_version")
            .fetch_one(&self.pool)
            .await
            .context("Failed to read the schema version")?;
        Ok(row.0)
    }

    /// Lists expenses, newest date first.
    pub async fn list_expenses(&self, filter: &ExpenseFilter) -> Result<Vec<StoredExpense>> {
        let sql = format!(
            "SELECT id, owner, amount, category, description, date, created_at FROM expenses \
             WHERE {FILTER_CLAUSE} ORDER BY date DESC, created_at DESC LIMIT ?5"
        );
        let rows = sqlx::query(&sql)
            .bind(filter.owner.as_deref())
            .bind(filter.category.map(|c| c.as_str()))
            .bind(filter.from_text())
            .bind(filter.to_text())
            .bind(filter.limit.map(i64::from).unwrap_or(-1))
            .fetch_all(&self.pool)
            .await
            .context("Failed to query expenses")?;
        rows.iter().map(expense_from_row).collect()
    }

    /// Sums the matching expenses per category, in canonical category order. Categories without
    /// expenses are left out. Amounts are added as decimals, not floats.
    pub async fn category_totals(&self, filter: &ExpenseFilter) -> Result<Vec<CategoryTotal>> {
        let sql = format!("SELECT category, amount FROM expenses WHERE {FILTER_CLAUSE}");
        let rows: Vec<(String, String)> = sqlx::query_as(&sql)
            .bind(filter.owner.as_deref())
            .bind(filter.category.map(|c| c.as_str()))
            .bind(filter.from_text())
            .bind(filter.to_text())
            .fetch_all(&self.pool)
            .await
            .context("Failed to query category totals")?;

        let mut totals: Vec<CategoryTotal> = Category::ALL
            .into_iter()
            .map(|category| CategoryTotal {
                category,
                count: 0,
                total: Amount::default(),
            })
            .collect();
        for (category, amount) in rows {
            let category = Category::from_canonical(&category)
                .with_context(|| format!("Bad category '{category}' in the expenses table"))?;
            let amount = Amount::parse_plain(&amount)
                .with_context(|| format!("Bad amount '{amount}' in the expenses table"))?;
            if let Some(entry) = totals.iter_mut().find(|t| t.category == category) {
                entry.count += 1;
                entry.total = Amount::new(entry.total.value() + amount.value());
            }
        }
        totals.retain(|t| t.count > 0);
        Ok(totals)
    }

    /// Deletes the expense `id` if it belongs to `owner`. Returns false when there was no such
    /// expense.
    pub async fn delete_expense(&self, owner: &str, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM expenses WHERE id = ? AND owner = ?")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to delete expense {id}"))?;
        debug!("Deleted {} row(s) for expense {id}", result.rows_affected());
        Ok(result.rows_affected() > 0)
    }

    pub async fn count_expenses(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM expenses")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count expenses")?;
        Ok(u64::try_from(row.0).unwrap_or_default())
    }
}

#[async_trait::async_trait]
impl RecordStore for Db {
    async fn create(&self, owner: &str, record: &ValidatedRecord) -> Result<StoredExpense> {
        let expense = StoredExpense {
            id: Uuid::new_v4().to_string(),
            owner: owner.to_string(),
            record: record.clone(),
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        };
        sqlx::query(
            "INSERT INTO expenses (id, owner, amount, category, description, date, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&expense.id)
        .bind(&expense.owner)
        .bind(record.amount().value().to_string())
        .bind(record.category().as_str())
        .bind(record.description())
        .bind(record.date().format(iso_date::FORMAT).to_string())
        .bind(&expense.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert expense")?;
        debug!("Stored expense {}", expense.id);
        Ok(expense)
    }
}

async fn connect(path: &Path, create: bool) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create)
        .foreign_keys(true);
    SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Unable to open SQLite database '{}'", path.display()))
}

fn expense_from_row(row: &SqliteRow) -> Result<StoredExpense> {
    let id: String = row.try_get("id")?;
    let amount: String = row.try_get("amount")?;
    let category: String = row.try_get("category")?;
    let date: String = row.try_get("date")?;

    let amount = Amount::parse_plain(&amount)
        .with_context(|| format!("Bad amount in expense {id}"))?;
    let category = Category::from_canonical(&category)
        .with_context(|| format!("Bad category '{category}' in expense {id}"))?;
    let date = NaiveDate::parse_from_str(&date, iso_date::FORMAT)
        .with_context(|| format!("Bad date '{date}' in expense {id}"))?;

    Ok(StoredExpense {
        owner: row.try_get("owner")?,
        record: ValidatedRecord::new(amount, category, row.try_get("description")?, date),
        created_at: row.try_get("created_at")?,
        id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::CandidateRecord;
    use crate::pipeline::validate;
    use rust_decimal::Decimal;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(amount: f64, category: &str, date: &str) -> ValidatedRecord {
        let map = match json!({
            "amount": amount,
            "category": category,
            "description": format!("{category} on {date}"),
            "date": date
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        validate(&CandidateRecord::from_map(map)).unwrap()
    }

    #[tokio::test]
    async fn test_init_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("expense.sqlite");
        let db = Db::init(&path).await.unwrap();
        assert_eq!(db.schema_version().await.unwrap(), migrations::LATEST);
        assert!(Db::init(&path).await.is_err());

        let db = Db::load(&path).await.unwrap();
        assert_eq!(db.count_expenses().await.unwrap(), 0);
        assert!(Db::load(dir.path().join("missing.sqlite")).await.is_err());
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("expense.sqlite")).await.unwrap();

        let dinner = record(45.0, "Food", "2026-02-17");
        let stored = db.create("sam", &dinner).await.unwrap();
        assert_eq!(stored.record, dinner);
        assert_eq!(stored.owner, "sam");
        db.create("sam", &record(12.5, "Transportation", "2026-02-18"))
            .await
            .unwrap();
        db.create("alex", &record(3.0, "Food", "2026-02-10"))
            .await
            .unwrap();

        let all = db.list_expenses(&ExpenseFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].record.date(), NaiveDate::from_ymd_opt(2026, 2, 18).unwrap());

        let food = db
            .list_expenses(&ExpenseFilter {
                category: Some(Category::Food),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(food.len(), 2);
        assert_eq!(food[0], stored);

        let sams = db
            .list_expenses(&ExpenseFilter {
                owner: Some("sam".to_string()),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(sams.len(), 1);
        assert_eq!(sams[0].record.category(), Category::Transportation);
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, d).unwrap()
    }

    async fn seeded() -> (TempDir, Db) {
        let dir = TempDir::new().unwrap();
        let db = Db::init(dir.path().join("expense.sqlite")).await.unwrap();
        db.create("sam", &record(0.1, "Food", "2026-01-31")).await.unwrap();
        db.create("sam", &record(0.2, "Food", "2026-02-01")).await.unwrap();
        db.create("sam", &record(20.0, "Bills", "2026-02-14")).await.unwrap();
        db.create("sam", &record(5.5, "Food", "2026-02-28")).await.unwrap();
        db.create("alex", &record(99.0, "Food", "2026-02-10")).await.unwrap();
        (dir, db)
    }

    #[tokio::test]
    async fn test_list_date_range_is_inclusive() {
        let (_dir, db) = seeded().await;
        let february = db
            .list_expenses(&ExpenseFilter {
                owner: Some("sam".to_string()),
                from: Some(day(1)),
                to: Some(day(28)),
                ..Default::default()
            })
            .await
            .unwrap();
        let dates: Vec<NaiveDate> = february.iter().map(|e| e.record.date()).collect();
        assert_eq!(dates, vec![day(28), day(14), day(1)]);

        let open_ended = db
            .list_expenses(&ExpenseFilter {
                from: Some(day(14)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(open_ended.len(), 2);
    }

    #[tokio::test]
    async fn test_category_totals() {
        let (_dir, db) = seeded().await;
        let totals = db
            .category_totals(&ExpenseFilter {
                owner: Some("sam".to_string()),
                from: Some(day(1)),
                to: Some(day(28)),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            totals,
            vec![
                CategoryTotal {
                    category: Category::Food,
                    count: 2,
                    total: Amount::new(Decimal::new(57, 1)),
                },
                CategoryTotal {
                    category: Category::Bills,
                    count: 1,
                    total: Amount::new(Decimal::new(20, 0)),
                },
            ]
        );

        let everything = db.category_totals(&ExpenseFilter::default()).await.unwrap();
        assert_eq!(everything[0].count, 4);
        assert_eq!(everything[0].total.value(), Decimal::new(1048, 1));
    }

    #[tokio::test]
    async fn test_delete_is_owner_scoped() {
        let (_dir, db) = seeded().await;
        let alex = db
            .list_expenses(&ExpenseFilter {
                owner: Some("alex".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        let id = &alex[0].id;

        assert!(!db.delete_expense("sam", id).await.unwrap());
        assert_eq!(db.count_expenses().await.unwrap(), 5);
        assert!(db.delete_expense("alex", id).await.unwrap());
        assert_eq!(db.count_expenses().await.unwrap(), 4);
        assert!(!db.delete_expense("alex", id).await.unwrap());
    }

    #[test]
    fn test_stored_expense_serializes_flat() {
        let expense = StoredExpense {
            id: "id-1".to_string(),
            owner: "sam".to_string(),
            record: record(45.0, "Food", "2026-02-17"),
            created_at: "2026-02-17T20:00:00Z".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&expense).unwrap(),
            json!({
                "id": "id-1",
                "owner": "sam",
                "amount": 45.0,
                "category": "Food",
                "description": "Food on 2026-02-17",
                "date": "2026-02-17",
                "created_at": "2026-02-17T20:00:00Z"
            })
        );
    }
}
