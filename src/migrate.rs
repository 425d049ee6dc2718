use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    migrate_pool(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Creates the catalog schema on an open pool. Safe to run repeatedly.
pub async fn migrate_pool(pool: &SqlitePool) -> Result<()> {
    // Collections are exposed as sets
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            institution TEXT NOT NULL,
            handle TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            PRIMARY KEY (institution, handle)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // updated_at is the OAI datestamp, in unix seconds
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            institution TEXT NOT NULL,
            handle TEXT NOT NULL,
            updated_at INTEGER NOT NULL,
            withdrawn INTEGER NOT NULL DEFAULT 0,
            item_type TEXT,
            PRIMARY KEY (institution, handle)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_elements (
            institution TEXT NOT NULL,
            handle TEXT NOT NULL,
            position INTEGER NOT NULL,
            name TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (institution, handle, position),
            FOREIGN KEY (institution, handle) REFERENCES items(institution, handle)
                ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_collections (
            institution TEXT NOT NULL,
            item_handle TEXT NOT NULL,
            collection_handle TEXT NOT NULL,
            PRIMARY KEY (institution, item_handle, collection_handle),
            FOREIGN KEY (institution, item_handle) REFERENCES items(institution, handle)
                ON DELETE CASCADE
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_items_datestamp ON items(institution, updated_at, handle)",
    )
    .execute(pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_item_collections_set ON item_collections(institution, collection_handle)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
