//! Database schema migrations
//!
//! Versioned, idempotent migrations tracked in the `schema_version` table.
//!
//! # Migration Guidelines
//!
//! 1. **Never modify existing migrations** - databases in the field depend on them
//! 2. **Always add new migrations** - one function per schema change
//! 3. **Use ALTER TABLE** - preserve data; check `pragma_table_info` first
//!
//! The first releases stored pages as bare `documents(name, file)` rows and
//! line verification as a boolean `verified` column. The migrations below
//! bring such databases to the notebook/page and three-state verification
//! schema created by [`crate::db::init`].

use crate::Result;
use sqlx::SqlitePool;
use tracing::{info, warn};

/// Current schema version
///
/// **IMPORTANT:** Increment this when adding new migrations
const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Get current schema version from database
///
/// Returns 0 if schema_version table doesn't exist or has no rows
async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let table_exists: bool = sqlx::query_scalar(
        r#"
        SELECT EXISTS(
            SELECT 1 FROM sqlite_master
            WHERE type='table' AND name='schema_version'
        )
        "#,
    )
    .fetch_one(pool)
    .await?;

    if !table_exists {
        return Ok(0);
    }

    let version: Option<i32> =
        sqlx::query_scalar("SELECT version FROM schema_version ORDER BY version DESC LIMIT 1")
            .fetch_optional(pool)
            .await?;

    Ok(version.unwrap_or(0))
}

/// Set schema version in database
async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;

    Ok(())
}

/// Public accessor used by startup diagnostics and tests
pub async fn schema_version(pool: &SqlitePool) -> Result<i32> {
    get_schema_version(pool).await
}

/// Run all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    let current_version = get_schema_version(pool).await?;

    if current_version == CURRENT_SCHEMA_VERSION {
        info!("Database schema is up to date (v{})", current_version);
        return Ok(());
    }

    if current_version > CURRENT_SCHEMA_VERSION {
        warn!(
            "Database schema version ({}) is newer than code version ({})",
            current_version, CURRENT_SCHEMA_VERSION
        );
        warn!("This may indicate a downgrade. Proceeding with caution.");
        return Ok(());
    }

    info!(
        "Running database migrations: v{} -> v{}",
        current_version, CURRENT_SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(pool).await?;
        set_schema_version(pool, 1).await?;
        info!("✓ Migration v1 completed");
    }

    if current_version < 2 {
        migrate_v2(pool).await?;
        set_schema_version(pool, 2).await?;
        info!("✓ Migration v2 completed");
    }

    info!("All migrations completed successfully");
    Ok(())
}

async fn has_column(pool: &SqlitePool, table: &str, column: &str) -> Result<bool> {
    let count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
            .bind(table)
            .bind(column)
            .fetch_one(pool)
            .await?;
    Ok(count > 0)
}

/// Add a column unless present; tolerates a concurrent duplicate add
async fn add_column(pool: &SqlitePool, table: &str, column: &str, decl: &str) -> Result<()> {
    if has_column(pool, table, column).await? {
        info!("  {}.{} already exists - skipping", table, column);
        return Ok(());
    }

    let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, decl);
    match sqlx::query(&sql).execute(pool).await {
        Ok(_) => {
            info!("  ✓ Added {}.{}", table, column);
            Ok(())
        }
        Err(sqlx::Error::Database(db_err)) if db_err.message().contains("duplicate column") => {
            info!("  {}.{} added concurrently - skipping", table, column);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Migration v1: three-state verification and attribution columns
///
/// Legacy `verified = 1` rows become `verification = 1` (accepted).
async fn migrate_v1(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v1: line segment verification states");

    add_column(
        pool,
        "line_segments",
        "verification",
        "INTEGER NOT NULL DEFAULT 0",
    )
    .await?;
    add_column(pool, "line_segments", "last_transcribed_by", "INTEGER").await?;
    add_column(pool, "line_segments", "last_verified_by", "INTEGER").await?;

    if has_column(pool, "line_segments", "verified").await? {
        let converted = sqlx::query(
            "UPDATE line_segments SET verification = 1 WHERE verified = 1 AND verification = 0",
        )
        .execute(pool)
        .await?
        .rows_affected();
        info!("  ✓ Converted {} legacy verified segments", converted);
    }

    Ok(())
}

/// Migration v2: notebook and page columns on documents
async fn migrate_v2(pool: &SqlitePool) -> Result<()> {
    info!("Running migration v2: document notebook/page");

    add_column(pool, "documents", "notebook_id", "INTEGER REFERENCES notebooks(id) ON DELETE SET NULL")
        .await?;
    add_column(pool, "documents", "page", "INTEGER").await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn legacy_schema_is_upgraded() {
        let pool = memory_pool().await;

        sqlx::query("CREATE TABLE schema_version (version INTEGER PRIMARY KEY, applied_at TIMESTAMP)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE notebooks (id INTEGER PRIMARY KEY, name TEXT, file TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("CREATE TABLE documents (id INTEGER PRIMARY KEY, name TEXT, file TEXT)")
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE line_segments (id INTEGER PRIMARY KEY, file TEXT, line_order INTEGER,
             document_id INTEGER, transcription TEXT, transcribed INTEGER, verified INTEGER)",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO line_segments (file, line_order, document_id, transcription, transcribed, verified)
             VALUES ('a_validated/1.png', 1, 1, 'x', 1, 1), ('a_validated/2.png', 2, 1, '', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        run_migrations(&pool).await.unwrap();

        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
        let states: Vec<i64> =
            sqlx::query_scalar("SELECT verification FROM line_segments ORDER BY line_order")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(states, vec![1, 0]);
        assert!(has_column(&pool, "documents", "page").await.unwrap());

        // Second run is a no-op
        run_migrations(&pool).await.unwrap();
        assert_eq!(schema_version(&pool).await.unwrap(), CURRENT_SCHEMA_VERSION);
    }
}
