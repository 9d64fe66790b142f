//! Schema provisioning for the entries table
//!
//! The DDL is plain enough to run unchanged on PostgreSQL and SQLite.

use super::connection::{ConnectionManager, Statement};
use super::error::DbError;

/// Table and index statements, applied in order. All are idempotent.
const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS entries (
        key TEXT PRIMARY KEY,
        text TEXT NOT NULL,
        public BOOLEAN NOT NULL DEFAULT FALSE,
        name TEXT NOT NULL DEFAULT '',
        title TEXT NOT NULL DEFAULT '',
        expiration BIGINT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_entries_expiration ON entries (expiration) WHERE expiration IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_entries_public ON entries (key) WHERE public",
];

/// Create the entries table and its indexes if missing.
pub async fn run(manager: &ConnectionManager) -> Result<(), DbError> {
    tracing::info!(backend = ?manager.kind(), "Running entries migrations...");

    for &sql in SCHEMA {
        manager.execute(Statement::command(sql)).await?;
    }

    tracing::info!("Entries migrations complete");
    Ok(())
}
