//! `SQLite` schema bootstrap logic.
//!
//! All table definitions use `CREATE TABLE IF NOT EXISTS`, so the bootstrap
//! runs on every server startup and converges to the same schema.

use sqlx::SqlitePool;

use crate::Result;

/// Apply all table definitions to the connected `SQLite` database.
///
/// Creates the inquiry, outcome ledger and catalog tables idempotently.
///
/// # Errors
///
/// Returns `AppError::Db` if any DDL statement fails.
pub async fn bootstrap_schema(pool: &SqlitePool) -> Result<()> {
    let ddl = r"
CREATE TABLE IF NOT EXISTS inquiry (
    id                    TEXT PRIMARY KEY NOT NULL,
    items                 TEXT NOT NULL,
    status                TEXT NOT NULL CHECK(status IN ('ACTIVE','PROCESSED','FAILED')),
    items_total_count     INTEGER NOT NULL CHECK(items_total_count >= 0),
    items_processed_count INTEGER NOT NULL DEFAULT 0,
    items_failed_count    INTEGER NOT NULL DEFAULT 0,
    created_at            TEXT NOT NULL,
    updated_at            TEXT NOT NULL,
    CHECK(items_processed_count + items_failed_count <= items_total_count)
);

CREATE TABLE IF NOT EXISTS inquiry_item_outcome (
    inquiry_id      TEXT NOT NULL,
    item_ref        TEXT NOT NULL,
    outcome         TEXT NOT NULL CHECK(outcome IN ('processed','failed')),
    recorded_at     TEXT NOT NULL,
    PRIMARY KEY (inquiry_id, item_ref)
);

CREATE TABLE IF NOT EXISTS catalog_record (
    item_ref        TEXT PRIMARY KEY NOT NULL,
    name            TEXT NOT NULL,
    description     TEXT,
    kind            TEXT NOT NULL CHECK(kind IN ('NEW','UPDATED')),
    is_active       INTEGER NOT NULL DEFAULT 1,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_inquiry_status ON inquiry(status);
";

    sqlx::raw_sql(ddl).execute(pool).await?;
    Ok(())
}
