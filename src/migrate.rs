//! Idempotent schema creation for the content store.

use anyhow::Result;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;

    // One row per remote article. `search_key` is the lower-cased title and
    // tags that keyword matching runs against.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS source_documents (
            external_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            raw_content TEXT NOT NULL,
            category_tags TEXT NOT NULL DEFAULT '[]',
            search_key TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS fragments (
            parent_id INTEGER NOT NULL,
            sequence_index INTEGER NOT NULL,
            clean_text TEXT NOT NULL,
            embedding BLOB,
            embedding_model TEXT,
            embedding_dims INTEGER,
            PRIMARY KEY (parent_id, sequence_index),
            FOREIGN KEY (parent_id) REFERENCES source_documents(external_id) ON DELETE CASCADE
        )
        "#,
    )
    .execute(&pool)
    .await?;

    // Usage tracking: one row per answered request and per rating.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS interactions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_input TEXT NOT NULL,
            intent TEXT NOT NULL,
            model_used TEXT,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS feedback (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_input TEXT NOT NULL,
            response TEXT,
            feedback_type TEXT NOT NULL CHECK (feedback_type IN ('positive', 'negative', 'neutral')),
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(&pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_interactions_input ON interactions(user_input, created_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_source_documents_updated_at ON source_documents(updated_at DESC)",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_fragments_pending ON fragments(parent_id, sequence_index) WHERE embedding IS NULL",
    )
    .execute(&pool)
    .await?;

    pool.close().await;
    Ok(())
}
