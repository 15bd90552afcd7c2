//! Usage tracking: routed interactions, answer feedback, and the insights
//! derived from them.
//!
//! The [`UsageLog`] trait is implemented over SQLite in the app crate.
//! [`UsageInsights`] is plain data so the reporting rules can be tested
//! without a database.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

use crate::category::Category;

/// A popular intent becomes an expansion candidate above this many requests.
pub const EXPAND_THRESHOLD: i64 = 10;

/// An intent needs attention once it collects this many negative ratings.
pub const PROBLEM_THRESHOLD: i64 = 2;

/// How the user rated an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedbackKind {
    Positive,
    Negative,
    Neutral,
}

impl FeedbackKind {
    pub const ALL: [FeedbackKind; 3] = [
        FeedbackKind::Positive,
        FeedbackKind::Negative,
        FeedbackKind::Neutral,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackKind::Positive => "positive",
            FeedbackKind::Negative => "negative",
            FeedbackKind::Neutral => "neutral",
        }
    }

    pub fn from_slug(slug: &str) -> Option<FeedbackKind> {
        let slug = slug.trim();
        Self::ALL
            .into_iter()
            .find(|k| k.as_str().eq_ignore_ascii_case(slug))
    }
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated usage, as reported by `kbr stats`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageInsights {
    pub total_interactions: i64,
    pub total_feedback: i64,
    pub positive_feedback: i64,
    /// `(input, count)`, most asked first.
    pub frequent_queries: Vec<(String, i64)>,
    /// `(intent slug, count)`, most requested first.
    pub popular_intents: Vec<(String, i64)>,
    /// `(intent slug, negative ratings)`. A rating is attributed to the
    /// intent of the latest interaction with the same input.
    pub problem_intents: Vec<(String, i64)>,
}

impl UsageInsights {
    /// Share of positive ratings in percent, `None` without any feedback.
    pub fn success_rate(&self) -> Option<f64> {
        if self.total_feedback == 0 {
            return None;
        }
        Some(self.positive_feedback as f64 * 100.0 / self.total_feedback as f64)
    }

    pub fn recommendations(&self) -> Vec<String> {
        let mut out = Vec::new();
        for (intent, count) in &self.problem_intents {
            if *count >= PROBLEM_THRESHOLD {
                out.push(format!("Improve {} answers: {} negative ratings", intent, count));
            }
        }
        for (intent, count) in &self.popular_intents {
            if *count > EXPAND_THRESHOLD {
                out.push(format!("Expand {} coverage: {} requests", intent, count));
            }
        }
        out
    }
}

/// Append-only record of how the assistant is used.
#[async_trait]
pub trait UsageLog: Send + Sync {
    /// Record one answered request. `model` is `None` when no model was
    /// involved, as for the fixed media replies.
    async fn record_interaction(
        &self,
        input: &str,
        intent: Category,
        model: Option<&str>,
    ) -> Result<()>;

    async fn record_feedback(
        &self,
        input: &str,
        response: Option<&str>,
        kind: FeedbackKind,
    ) -> Result<()>;

    /// Totals plus the top `limit` queries and intents.
    async fn insights(&self, limit: usize) -> Result<UsageInsights>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feedback_kind_from_slug() {
        assert_eq!(FeedbackKind::from_slug(" Positive "), Some(FeedbackKind::Positive));
        assert_eq!(FeedbackKind::from_slug("negative"), Some(FeedbackKind::Negative));
        assert_eq!(FeedbackKind::from_slug("meh"), None);
    }

    #[test]
    fn test_success_rate() {
        let mut insights = UsageInsights::default();
        assert_eq!(insights.success_rate(), None);

        insights.total_feedback = 4;
        insights.positive_feedback = 3;
        assert_eq!(insights.success_rate(), Some(75.0));
    }

    #[test]
    fn test_recommendations_use_thresholds() {
        let insights = UsageInsights {
            popular_intents: vec![("accounting".into(), 11), ("general".into(), 10)],
            problem_intents: vec![("database".into(), 2), ("general".into(), 1)],
            ..UsageInsights::default()
        };
        assert_eq!(
            insights.recommendations(),
            vec![
                "Improve database answers: 2 negative ratings".to_string(),
                "Expand accounting coverage: 11 requests".to_string(),
            ]
        );
    }
}
