//! Store statistics and knowledge base overview.
//!
//! Summarizes what has been ingested (documents, fragments, embedding
//! coverage), the state of each cached knowledge base artifact, and how the
//! assistant has been used. Used by `kbr stats` to check that ingestion and
//! builds are working.

use anyhow::Result;
use chrono::{DateTime, Utc};

use kbroute_core::error::IndexLoadError;
use kbroute_core::store::ContentStore;
use kbroute_core::usage::{UsageInsights, UsageLog};

use crate::artifact;
use crate::config::{Config, KnowledgeConfig};
use crate::db;
use crate::sqlite_store::SqliteContentStore;
use crate::usage_log::SqliteUsageLog;

/// Number of queries and intents listed under usage.
const TOP_USAGE: usize = 5;

/// Run the stats command: query the store and print a summary.
pub async fn run_stats(config: &Config) -> Result<()> {
    let store = SqliteContentStore::new(db::connect(config).await?);
    let counts = store.counts().await?;

    let db_size = std::fs::metadata(&config.db.path)
        .map(|m| m.len())
        .unwrap_or(0);

    println!("kbroute stats");
    println!("=============");
    println!();
    println!("  Database:    {}", config.db.path.display());
    println!("  Size:        {}", format_bytes(db_size));
    println!();
    println!("  Documents:   {}", counts.documents);
    println!("  Fragments:   {}", counts.fragments);
    println!(
        "  Embedded:    {} / {} ({}%)",
        counts.embedded,
        counts.fragments,
        if counts.fragments > 0 {
            (counts.embedded * 100) / counts.fragments
        } else {
            0
        }
    );

    println!();
    println!("  Knowledge bases:");
    println!(
        "  {:<12} {:>8} {:>7}   {:<14} {}",
        "CATEGORY", "ENTRIES", "HYBRID", "BUILT", "ARTIFACT"
    );
    println!("  {}", "-".repeat(76));

    for category in KnowledgeConfig::CATEGORIES {
        let Some(kb) = config.knowledge.settings(category) else {
            continue;
        };
        let path = artifact::artifact_path(&config.cache.dir, &kb.cache_key);
        match artifact::load_index(&path, 0).await {
            Ok(index) => {
                let built = format_age(index.created_at());
                let stale = kb.ttl_secs > 0
                    && (Utc::now() - index.created_at()).num_seconds() > kb.ttl_secs as i64;
                println!(
                    "  {:<12} {:>8} {:>7}   {:<14} {}",
                    category.slug(),
                    index.len(),
                    if index.is_hybrid() { "yes" } else { "no" },
                    if stale { format!("{} (expired)", built) } else { built },
                    path.display()
                );
            }
            Err(IndexLoadError::Missing { .. }) => {
                println!(
                    "  {:<12} {:>8} {:>7}   {:<14} {}",
                    category.slug(),
                    "-",
                    "-",
                    "not built",
                    path.display()
                );
            }
            Err(e) => {
                println!(
                    "  {:<12} {:>8} {:>7}   {:<14} {} ({})",
                    category.slug(),
                    "-",
                    "-",
                    "unreadable",
                    path.display(),
                    e
                );
            }
        }
    }

    println!();
    let insights = SqliteUsageLog::new(store.pool().clone())
        .insights(TOP_USAGE)
        .await?;
    print_usage(&insights);

    store.pool().close().await;
    Ok(())
}

fn print_usage(insights: &UsageInsights) {
    println!("  Usage:");
    println!("  Interactions: {}", insights.total_interactions);
    println!("  Feedback:     {}", insights.total_feedback);
    println!(
        "  Success rate: {}",
        insights
            .success_rate()
            .map(|r| format!("{:.0}%", r))
            .unwrap_or_else(|| "n/a".to_string())
    );

    if !insights.popular_intents.is_empty() {
        println!();
        println!("  {:<16} {:>8}", "INTENT", "REQUESTS");
        for (intent, count) in &insights.popular_intents {
            println!("  {:<16} {:>8}", intent, count);
        }
    }

    if !insights.frequent_queries.is_empty() {
        println!();
        println!("  Frequent queries:");
        for (query, count) in &insights.frequent_queries {
            println!("  {:>6}  {}", count, query);
        }
    }

    let recommendations = insights.recommendations();
    if !recommendations.is_empty() {
        println!();
        println!("  Recommendations:");
        for r in recommendations {
            println!("  - {}", r);
        }
    }
    println!();
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a timestamp relative to now (e.g. "3 hours ago").
fn format_age(ts: DateTime<Utc>) -> String {
    let delta = (Utc::now() - ts).num_seconds();

    if delta < 0 {
        ts.format("%Y-%m-%d %H:%M").to_string()
    } else if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        ts.format("%Y-%m-%d %H:%M").to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(2048), "2.0 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.0 MB");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Utc::now()), "just now");
        assert_eq!(
            format_age(Utc::now() - chrono::Duration::hours(3)),
            "3 hours ago"
        );
        assert_eq!(
            format_age(Utc::now() - chrono::Duration::days(1)),
            "1 day ago"
        );
    }
}
