//! SQLite-backed [`UsageLog`].
//!
//! Interactions and feedback are append-only rows in the `interactions`
//! and `feedback` tables; insights are computed with aggregate queries on
//! demand.

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};

use kbroute_core::category::Category;
use kbroute_core::usage::{FeedbackKind, UsageInsights, UsageLog};

pub struct SqliteUsageLog {
    pool: SqlitePool,
}

impl SqliteUsageLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn ranked(&self, sql: &str, limit: Option<usize>) -> Result<Vec<(String, i64)>> {
        let limit = limit
            .map(|l| i64::try_from(l).unwrap_or(i64::MAX))
            .unwrap_or(-1);
        let rows = sqlx::query(sql).bind(limit).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>(0), r.get::<i64, _>(1)))
            .collect())
    }
}

#[async_trait]
impl UsageLog for SqliteUsageLog {
    async fn record_interaction(
        &self,
        input: &str,
        intent: Category,
        model: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO interactions (user_input, intent, model_used, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(input)
        .bind(intent.slug())
        .bind(model)
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_feedback(
        &self,
        input: &str,
        response: Option<&str>,
        kind: FeedbackKind,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO feedback (user_input, response, feedback_type, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(input)
        .bind(response)
        .bind(kind.as_str())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insights(&self, limit: usize) -> Result<UsageInsights> {
        let total_interactions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM interactions")
            .fetch_one(&self.pool)
            .await?;
        let total_feedback: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feedback")
            .fetch_one(&self.pool)
            .await?;
        let positive_feedback: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM feedback WHERE feedback_type = 'positive'")
                .fetch_one(&self.pool)
                .await?;

        let frequent_queries = self
            .ranked(
                r#"
                SELECT user_input, COUNT(*) AS n FROM interactions
                GROUP BY user_input
                ORDER BY n DESC, MAX(created_at) DESC
                LIMIT ?
                "#,
                Some(limit),
            )
            .await?;
        let popular_intents = self
            .ranked(
                r#"
                SELECT intent, COUNT(*) AS n FROM interactions
                GROUP BY intent
                ORDER BY n DESC, intent ASC
                LIMIT ?
                "#,
                Some(limit),
            )
            .await?;
        let problem_intents = self
            .ranked(
                r#"
                SELECT i.intent, COUNT(*) AS n
                FROM feedback f
                JOIN interactions i ON i.id = (
                    SELECT id FROM interactions
                    WHERE user_input = f.user_input
                    ORDER BY created_at DESC, id DESC
                    LIMIT 1
                )
                WHERE f.feedback_type = 'negative'
                GROUP BY i.intent
                ORDER BY n DESC, i.intent ASC
                LIMIT ?
                "#,
                None,
            )
            .await?;

        Ok(UsageInsights {
            total_interactions,
            total_feedback,
            positive_feedback,
            frequent_queries,
            popular_intents,
            problem_intents,
        })
    }
}
