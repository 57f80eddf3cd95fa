//! Versioned schema migrations for the expense database.
//!
//! Each version `NN` has two SQL files in this directory:
//! - `migration_NN_up.sql` upgrades the schema from `NN-1` to `NN`
//! - `migration_NN_down.sql` reverts it from `NN` to `NN-1`

use anyhow::Context;
use sqlx::{Executor, SqlitePool};
use tracing::debug;

use crate::Result;

/// The schema version this build of the program expects.
pub(crate) const LATEST: i32 = 1;

struct Migration {
    version: i32,
    up: &'static str,
    down: &'static str,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    up: include_str!("migration_01_up.sql"),
    down: include_str!("migration_01_down.sql"),
}];

/// One SQL script to run and the schema version the database is at afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Step {
    sql: &'static str,
    version_after: i32,
}

/// Works out every step needed to move from `from` to `to`, failing if any migration is missing.
/// Nothing is run until the whole plan is known.
fn plan(from: i32, to: i32) -> Result<Vec<Step>> {
    let find = |version: i32| {
        MIGRATIONS
            .iter()
            .find(|m| m.version == version)
            .with_context(|| {
                format!("Migration {version} is missing but needed to go from version {from} to {to}")
            })
    };
    let mut steps = Vec::new();
    if from < to {
        for version in (from + 1)..=to {
            steps.push(Step {
                sql: find(version)?.up,
                version_after: version,
            });
        }
    } else {
        for version in ((to + 1)..=from).rev() {
            steps.push(Step {
                sql: find(version)?.down,
                version_after: version - 1,
            });
        }
    }
    Ok(steps)
}

/// Migrates the database from `from` to `to`, up or down. Each step runs in its own transaction
/// together with the `schema_version` update.
pub(crate) async fn run(pool: &SqlitePool, from: i32, to: i32) -> Result<()> {
    if from == to {
        debug!("Expense database is at version {to}, nothing to migrate");
        return Ok(());
    }
    for step in plan(from, to)? {
        debug!("Migrating expense database to version {:02}", step.version_after);
        apply(pool, step).await?;
    }
    debug!("Expense database migrated from version {from} to {to}");
    Ok(())
}

async fn apply(pool: &SqlitePool, step: Step) -> Result<()> {
    let mut tx = pool
        .begin()
        .await
        .context("Failed to begin migration transaction")?;

    tx.execute(step.sql)
        .await
        .with_context(|| format!("Failed to migrate to version {}", step.version_after))?;

    sqlx::query("UPDATE schema_version SET version = ?")
        .bind(step.version_after)
        .execute(&mut *tx)
        .await
        .context("Failed to update schema_version")?;

    tx.commit()
        .await
        .context("Failed to commit migration transaction")
}
