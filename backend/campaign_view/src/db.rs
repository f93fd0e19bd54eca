//! Database layer: migrations and the persisted wallet session.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let url = if url.contains(":memory:") || url.contains("mode=") {
        url
    } else if url.contains('?') {
        format!("{url}&mode=rwc")
    } else {
        format!("{url}?mode=rwc")
    };

    // Every connection to an in-memory database sees a different database.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Wallet session
// ─────────────────────────────────────────────────────────

/// The persisted account, if a wallet is connected.
pub async fn load_session(pool: &SqlitePool) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT account FROM wallet_session WHERE id = 1")
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(account,)| account))
}

pub async fn save_session(pool: &SqlitePool, account: &str) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO wallet_session (id, account, connected_at)
        VALUES (1, ?1, strftime('%s', 'now'))
        ON CONFLICT(id) DO UPDATE SET
            account      = excluded.account,
            connected_at = excluded.connected_at
        "#,
    )
    .bind(account)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn clear_session(pool: &SqlitePool) -> Result<()> {
    sqlx::query("DELETE FROM wallet_session WHERE id = 1")
        .execute(pool)
        .await?;
    Ok(())
}
