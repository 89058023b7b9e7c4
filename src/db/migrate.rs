//! Startup migration runner.
//!
//! Migrations are embedded SQL files with `-- migrate:up` and an optional
//! `-- migrate:down` section. Only the up section runs, in its own
//! transaction together with the row recording its version in
//! `schema_migrations`.

use anyhow::{Context, Result};
use sqlx::postgres::PgPool;
use std::collections::HashSet;
use tracing::info;

const UP_MARKER: &str = "-- migrate:up";
const DOWN_MARKER: &str = "-- migrate:down";

#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: &'static str,
    pub sql: &'static str,
}

impl Migration {
    /// Statements before the down marker, without the up marker
    pub fn up_sql(&self) -> &'static str {
        let up = self.sql.split(DOWN_MARKER).next().unwrap_or_default();
        let up = up.trim_start();
        up.strip_prefix(UP_MARKER).unwrap_or(up).trim()
    }
}

/// Sorted by version
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: "0001_create_conversations",
    sql: include_str!("../../migrations/0001_create_conversations.sql"),
}];

pub async fn run_migrations(pool: &PgPool) -> Result<usize> {
    info!("Starting migrations...");

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version VARCHAR(255) PRIMARY KEY,
            applied_at TIMESTAMPTZ DEFAULT NOW()
        )",
    )
    .execute(pool)
    .await
    .context("Failed to create schema_migrations table")?;

    let applied: HashSet<String> =
        sqlx::query_scalar::<_, String>("SELECT version FROM schema_migrations ORDER BY version")
            .fetch_all(pool)
            .await?
            .into_iter()
            .collect();

    let mut count = 0;
    for migration in pending(MIGRATIONS, &applied) {
        info!(version = migration.version, "Applying migration");

        let mut tx = pool.begin().await?;
        sqlx::raw_sql(migration.up_sql())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Migration {} failed", migration.version))?;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)")
            .bind(migration.version)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        count += 1;
    }

    if count > 0 {
        info!(count, "Successfully applied migrations");
    } else {
        info!("No pending migrations");
    }
    Ok(count)
}

fn pending<'a>(all: &'a [Migration], applied: &'a HashSet<String>) -> impl Iterator<Item = &'a Migration> {
    all.iter().filter(move |m| !applied.contains(m.version))
}
