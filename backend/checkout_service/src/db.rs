//! Database layer: migrations and the checkout ledger.

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::errors::Result;
use crate::records::{CheckoutRecord, NewCheckoutRecord};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    // Make sure the file is created if it doesn't exist yet.
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    let url = if url.contains("mode=") || url.contains(":memory:") {
        url
    } else if url.contains('?') {
        format!("{url}&mode=rwc")
    } else {
        format!("{url}?mode=rwc")
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

// ─────────────────────────────────────────────────────────
// Checkout writes
// ─────────────────────────────────────────────────────────

/// Persist a completed checkout. A second write for the same `checkout_id`
/// is silently ignored; returns whether a row was inserted.
pub async fn insert_checkout(pool: &SqlitePool, record: &NewCheckoutRecord) -> Result<bool> {
    let rows_affected = sqlx::query(
        r#"
        INSERT OR IGNORE INTO checkouts
            (checkout_id, backing_id, project_id, reward_id, amount, currency, status, requires_action)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(&record.checkout_id)
    .bind(&record.backing_id)
    .bind(&record.project_id)
    .bind(record.reward_id)
    .bind(&record.amount)
    .bind(&record.currency)
    .bind(&record.status)
    .bind(record.requires_action)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(rows_affected > 0)
}

// ─────────────────────────────────────────────────────────
// Checkout reads
// ─────────────────────────────────────────────────────────

/// Fetch all checkouts for a given project, oldest first.
pub async fn get_checkouts_for_project(
    pool: &SqlitePool,
    project_id: &str,
) -> Result<Vec<CheckoutRecord>> {
    let rows = sqlx::query_as::<_, CheckoutRecord>(
        r#"
        SELECT id, checkout_id, backing_id, project_id, reward_id, amount, currency,
               status, requires_action, created_at
        FROM   checkouts
        WHERE  project_id = ?1
        ORDER  BY id ASC
        "#,
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

/// Fetch all checkouts, oldest first.
pub async fn get_all_checkouts(pool: &SqlitePool) -> Result<Vec<CheckoutRecord>> {
    let rows = sqlx::query_as::<_, CheckoutRecord>(
        r#"
        SELECT id, checkout_id, backing_id, project_id, reward_id, amount, currency,
               status, requires_action, created_at
        FROM   checkouts
        ORDER  BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
