//! Ingestion pipeline: collect → process → embed.
//!
//! Each stage is idempotent and can be run on its own:
//!
//! - **collect** fetches articles by ID and upserts them into the store.
//!   Missing IDs are skipped, and requests are spaced by the configured delay.
//! - **process** chunks every document that has no fragments yet.
//! - **embed** fills in vectors for fragments still lacking one. Failed
//!   batches stay pending for the next run.
//!
//! The stage functions work against the store traits. The `run_*`
//! functions wire them to the SQLite store and print a short report.

use anyhow::{bail, Result};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, info, warn};

use kbroute_core::chunk::chunk_document;
use kbroute_core::embedding::Embedder;
use kbroute_core::fetch::ArticleSource;
use kbroute_core::store::ContentStore;

use crate::collector::ArticleApiClient;
use crate::config::Config;
use crate::embedding;
use crate::db;
use crate::sqlite_store::SqliteContentStore;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectReport {
    pub requested: usize,
    pub upserted: usize,
    pub not_found: usize,
    pub failed: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub documents: usize,
    pub fragments: usize,
    /// Documents skipped because their content produced no fragments.
    pub empty: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct EmbedReport {
    pub pending: usize,
    pub embedded: usize,
    pub failed: usize,
}

/// Fetch each article in `ids` and upsert it. Duplicate IDs are fetched once.
pub async fn collect(
    store: &dyn ContentStore,
    source: &dyn ArticleSource,
    ids: &[i64],
    delay: Duration,
) -> Result<CollectReport> {
    let mut seen = HashSet::new();
    let ids: Vec<i64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

    let mut report = CollectReport {
        requested: ids.len(),
        ..CollectReport::default()
    };

    for (i, id) in ids.iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        match source.fetch_article(*id).await {
            Ok(article) => {
                let doc = article.into_document();
                store.upsert_document(&doc).await?;
                debug!(id, title = %doc.title, "article stored");
                report.upserted += 1;
            }
            Err(e) if e.is_not_found() => {
                info!(id, "article not found, skipping");
                report.not_found += 1;
            }
            Err(e) => {
                warn!(id, error = %e, "article fetch failed, skipping");
                report.failed += 1;
            }
        }
    }

    Ok(report)
}

/// Chunk every document without fragments.
pub async fn process(
    store: &dyn ContentStore,
    max_chars: usize,
    overlap_chars: usize,
) -> Result<ProcessReport> {
    let mut report = ProcessReport::default();

    for doc in store.documents_without_fragments().await? {
        let fragments = chunk_document(&doc, max_chars, overlap_chars);
        if fragments.is_empty() {
            debug!(id = doc.external_id, "document has no content, skipping");
            report.empty += 1;
            continue;
        }
        report.fragments += store.insert_fragments(doc.external_id, &fragments).await?;
        report.documents += 1;
    }

    Ok(report)
}

/// Embed up to `limit` pending fragments in batches of `batch_size`.
pub async fn embed_pending(
    store: &dyn ContentStore,
    embedder: &dyn Embedder,
    batch_size: usize,
    limit: Option<usize>,
) -> Result<EmbedReport> {
    if embedder.dims() == 0 {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let pending = store
        .pending_fragments(embedder.model_name(), limit)
        .await?;
    let mut report = EmbedReport {
        pending: pending.len(),
        ..EmbedReport::default()
    };

    for batch in pending.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|f| f.clean_text.clone()).collect();

        let vectors = match embedder.embed_batch(&texts).await {
            Ok(v) if v.len() == batch.len() => v,
            Ok(v) => {
                warn!(
                    expected = batch.len(),
                    got = v.len(),
                    "embedding batch returned the wrong number of vectors"
                );
                report.failed += batch.len();
                continue;
            }
            Err(e) => {
                warn!(error = %e, fragments = batch.len(), "embedding batch failed");
                report.failed += batch.len();
                continue;
            }
        };

        for (fragment, vector) in batch.iter().zip(vectors) {
            if vector.len() != embedder.dims() {
                warn!(
                    fragment = %fragment.key(),
                    expected = embedder.dims(),
                    got = vector.len(),
                    "embedding has the wrong dimension"
                );
                report.failed += 1;
                continue;
            }
            store
                .set_embedding(
                    fragment.parent_id,
                    fragment.sequence_index,
                    &vector,
                    embedder.model_name(),
                )
                .await?;
            report.embedded += 1;
        }
    }

    Ok(report)
}

// ============ CLI runners ============

/// `kbr collect`: fetch the configured article IDs (or `ids` if given).
pub async fn run_collect(config: &Config, ids: &[i64]) -> Result<()> {
    let ids = if ids.is_empty() {
        config.collector.article_ids.as_slice()
    } else {
        ids
    };
    if ids.is_empty() {
        bail!("No article IDs to collect. Set [collector] article_ids in config.");
    }

    let client = ArticleApiClient::from_config(&config.collector)?;
    let store = SqliteContentStore::new(db::connect(config).await?);
    let report = collect(
        &store,
        &client,
        ids,
        Duration::from_millis(config.collector.delay_ms),
    )
    .await?;

    println!("collect");
    println!("  requested: {}", report.requested);
    println!("  upserted documents: {}", report.upserted);
    println!("  not found: {}", report.not_found);
    println!("  failed: {}", report.failed);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// `kbr process`: chunk new documents into fragments.
pub async fn run_process(config: &Config) -> Result<()> {
    let store = SqliteContentStore::new(db::connect(config).await?);
    let report = process(
        &store,
        config.chunking.store_max_chars,
        config.chunking.store_overlap_chars,
    )
    .await?;

    println!("process");
    println!("  documents chunked: {}", report.documents);
    println!("  fragments written: {}", report.fragments);
    println!("  empty documents: {}", report.empty);
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// `kbr embed pending`: embed fragments that have no vector yet.
pub async fn run_embed_pending(
    config: &Config,
    limit: Option<usize>,
    batch_size_override: Option<usize>,
) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let store = SqliteContentStore::new(db::connect(config).await?);
    let batch_size = batch_size_override.unwrap_or(config.embedding.batch_size);
    let report = embed_pending(
        &store,
        embedder.as_ref(),
        batch_size,
        limit,
    )
    .await?;

    println!("embed pending");
    if report.pending == 0 {
        println!("  all fragments up to date");
    } else {
        println!("  total pending: {}", report.pending);
        println!("  embedded: {}", report.embedded);
        println!("  failed: {}", report.failed);
    }
    println!("ok");

    store.pool().close().await;
    Ok(())
}

/// `kbr ingest`: collect, process, and embed in one run.
///
/// Embedding is skipped when no provider is configured.
pub async fn run_ingest(config: &Config, ids: &[i64]) -> Result<()> {
    run_collect(config, ids).await?;
    run_process(config).await?;
    if config.embedding.is_enabled() {
        run_embed_pending(config, None, None).await?;
    } else {
        info!("embedding provider disabled, leaving fragments pending");
    }
    Ok(())
}
