//! Embedded schema setup.
//!
//! The crate ships one fixed schema for its three collections (tasks,
//! automation rules, events). Every statement in it is `IF NOT
//! EXISTS`, so applying it on startup is idempotent and no version
//! ledger is needed.

use sqlx::SqlitePool;

use crate::domain::errors::DomainResult;

const INITIAL_SCHEMA: &str = include_str!("../../../migrations/001_initial_schema.sql");

/// Apply the embedded schema. Safe to call on every startup.
pub async fn run_migrations(pool: &SqlitePool) -> DomainResult<()> {
    sqlx::raw_sql(INITIAL_SCHEMA).execute(pool).await?;
    tracing::debug!("Database schema applied");
    Ok(())
}
