//! SQLite pool construction and schema setup.

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS intervals (
        name              TEXT NOT NULL,
        start_time        TEXT NOT NULL,
        end_time          TEXT NOT NULL,
        modification_time TEXT NOT NULL,
        kind              TEXT NOT NULL,
        payload           TEXT NOT NULL,
        PRIMARY KEY (name, start_time)
    )",
    "CREATE INDEX IF NOT EXISTS idx_intervals_modification_time
        ON intervals (modification_time)",
    "CREATE INDEX IF NOT EXISTS idx_intervals_end_time
        ON intervals (end_time)",
];

/// Open a pool for `database_url` and make sure the schema exists.
///
/// In-memory databases are pinned to a single connection so every query
/// sees the same database.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options.connect_with(options).await?;

    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }

    tracing::debug!("Database ready at {}", database_url);
    Ok(pool)
}
