//! Idempotent schema creation for the two SQLite stores.
//!
//! The vector index (`{persist_dir}/index.sqlite`) holds one row per chunk
//! with its embedding; the history store (`store.history_path`) holds an
//! append-only log of conversation turns.

use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

/// Create both stores. Used by `onboard init`.
pub async fn run_migrations(config: &Config) -> Result<()> {
    let index = db::connect(&db::index_path(&config.store.persist_dir)).await?;
    migrate_index(&index).await?;
    index.close().await;

    let history = db::connect(&config.store.history_path).await?;
    migrate_history(&history).await?;
    history.close().await;

    Ok(())
}

pub async fn migrate_index(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            content TEXT NOT NULL,
            metadata_json TEXT NOT NULL DEFAULT '{}',
            hash TEXT NOT NULL,
            model TEXT NOT NULL,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_source_hash ON chunks(source, hash)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn migrate_history(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chat_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            session_key TEXT NOT NULL,
            user_id TEXT NOT NULL,
            session_id TEXT NOT NULL,
            role TEXT NOT NULL,
            content TEXT NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_history_session ON chat_history(session_key, id)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_history_user ON chat_history(user_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_chat_history_created_at ON chat_history(created_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
