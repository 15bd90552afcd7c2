//! SQLite-backed [`ContentStore`] implementation.
//!
//! Documents live in `source_documents` keyed by their remote ID; fragments
//! live in `fragments` keyed by `(parent_id, sequence_index)` and carry their
//! embedding as a little-endian f32 BLOB. See [`crate::migrate`] for the
//! schema.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use kbroute_core::embedding::{blob_to_vec, vec_to_blob};
use kbroute_core::models::{Fragment, SourceDocument};
use kbroute_core::store::{normalize_keywords, search_key, ContentStore, StoreCounts};

/// SQLite implementation of the [`ContentStore`] trait.
pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ts_from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

fn row_to_document(row: &SqliteRow) -> SourceDocument {
    let tags_json: String = row.get("category_tags");
    SourceDocument {
        external_id: row.get("external_id"),
        category_tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        title: row.get("title"),
        raw_content: row.get("raw_content"),
        created_at: ts_from_millis(row.get("created_at")),
        updated_at: ts_from_millis(row.get("updated_at")),
    }
}

fn row_to_fragment(row: &SqliteRow) -> Fragment {
    let blob: Option<Vec<u8>> = row.get("embedding");
    Fragment {
        parent_id: row.get("parent_id"),
        sequence_index: row.get("sequence_index"),
        clean_text: row.get("clean_text"),
        embedding: blob.map(|b| blob_to_vec(&b)),
        embedding_model: row.get("embedding_model"),
    }
}

/// Escape `LIKE` wildcards so keywords match literally.
fn like_pattern(keyword: &str) -> String {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

const DOCUMENT_COLUMNS: &str =
    "external_id, title, raw_content, category_tags, created_at, updated_at";

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn upsert_document(&self, doc: &SourceDocument) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        sqlx::query(
            r#"
            INSERT INTO source_documents (external_id, title, raw_content, category_tags,
                                          search_key, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(external_id) DO UPDATE SET
                title = excluded.title,
                raw_content = excluded.raw_content,
                category_tags = excluded.category_tags,
                search_key = excluded.search_key,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(doc.external_id)
        .bind(&doc.title)
        .bind(&doc.raw_content)
        .bind(serde_json::to_string(&doc.category_tags)?)
        .bind(search_key(doc))
        .bind(doc.created_at.timestamp_millis())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_document(&self, external_id: i64) -> Result<Option<SourceDocument>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM source_documents WHERE external_id = ?",
            DOCUMENT_COLUMNS
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.as_ref().map(row_to_document))
    }

    async fn find_by_title_or_tags(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<SourceDocument>> {
        let keywords = normalize_keywords(keywords);
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        // One round trip: OR every keyword into a single WHERE clause.
        let clauses = vec!["search_key LIKE ? ESCAPE '\\'"; keywords.len()].join(" OR ");
        let sql = format!(
            "SELECT {} FROM source_documents WHERE {} ORDER BY updated_at DESC, external_id ASC LIMIT ?",
            DOCUMENT_COLUMNS, clauses
        );

        let mut query = sqlx::query(&sql);
        for k in &keywords {
            query = query.bind(like_pattern(k));
        }
        let rows = query
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn documents_without_fragments(&self) -> Result<Vec<SourceDocument>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {} FROM source_documents d
            WHERE NOT EXISTS (SELECT 1 FROM fragments f WHERE f.parent_id = d.external_id)
            ORDER BY created_at ASC, external_id ASC
            "#,
            DOCUMENT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn insert_fragments(&self, parent_id: i64, fragments: &[Fragment]) -> Result<usize> {
        let mut tx = self.pool.begin().await?;

        let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments WHERE parent_id = ?")
            .bind(parent_id)
            .fetch_one(&mut *tx)
            .await?;
        if existing > 0 {
            tx.rollback().await?;
            return Ok(0);
        }

        for f in fragments {
            sqlx::query(
                r#"
                INSERT INTO fragments (parent_id, sequence_index, clean_text,
                                       embedding, embedding_model, embedding_dims)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(parent_id)
            .bind(f.sequence_index)
            .bind(&f.clean_text)
            .bind(f.embedding.as_deref().map(vec_to_blob))
            .bind(f.embedding_model.as_deref())
            .bind(f.embedding.as_ref().map(|v| v.len() as i64))
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(fragments.len())
    }

    async fn fragments_for(&self, parent_id: i64) -> Result<Vec<Fragment>> {
        let rows = sqlx::query(
            r#"
            SELECT parent_id, sequence_index, clean_text, embedding, embedding_model
            FROM fragments
            WHERE parent_id = ?
            ORDER BY sequence_index ASC
            "#,
        )
        .bind(parent_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_fragment).collect())
    }

    async fn pending_fragments(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Fragment>> {
        // SQLite treats a negative LIMIT as "no limit".
        let limit = limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let rows = sqlx::query(
            r#"
            SELECT parent_id, sequence_index, clean_text, embedding, embedding_model
            FROM fragments
            WHERE embedding IS NULL OR embedding_model IS NOT ?
            ORDER BY parent_id ASC, sequence_index ASC
            LIMIT ?
            "#,
        )
        .bind(model)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(row_to_fragment).collect())
    }

    async fn set_embedding(
        &self,
        parent_id: i64,
        sequence_index: i64,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE fragments
            SET embedding = ?, embedding_model = ?, embedding_dims = ?
            WHERE parent_id = ? AND sequence_index = ?
            "#,
        )
        .bind(vec_to_blob(vector))
        .bind(model)
        .bind(vector.len() as i64)
        .bind(parent_id)
        .bind(sequence_index)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("no fragment {}#{}", parent_id, sequence_index);
        }
        Ok(())
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let documents: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM source_documents")
            .fetch_one(&self.pool)
            .await?;
        let fragments: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM fragments")
            .fetch_one(&self.pool)
            .await?;
        let embedded: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM fragments WHERE embedding IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;
        Ok(StoreCounts {
            documents,
            fragments,
            embedded,
        })
    }
}
