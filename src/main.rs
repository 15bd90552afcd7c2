//! # kbroute CLI (`kbr`)
//!
//! The `kbr` binary drives the ingestion pipeline, builds the per-category
//! knowledge bases, and answers questions through the intent router.
//!
//! ## Usage
//!
//! ```bash
//! kbr --config ./config/kbr.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `kbr init` | Create the SQLite database, schema, and cache directory |
//! | `kbr collect` | Fetch configured articles into the store |
//! | `kbr process` | Chunk new documents into fragments |
//! | `kbr embed pending` | Embed fragments that have no vector yet |
//! | `kbr ingest` | Run collect, process, and embed in sequence |
//! | `kbr build <category>` | Load, augment, or build a knowledge base |
//! | `kbr classify "<text>"` | Print the intent category of a request |
//! | `kbr ask "<question>"` | Route a question and print the answer |
//! | `kbr feedback <rating> "<question>"` | Rate an answer |
//! | `kbr stats` | Show store counts, knowledge base status, and usage |
//!
//! Logs go to stderr and are filtered with `RUST_LOG`; command output goes
//! to stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use kbroute::config::{self, KnowledgeConfig};
use kbroute::services::Services;
use kbroute::usage_log::SqliteUsageLog;
use kbroute::{db, migrate, pipeline, stats};
use kbroute_core::category::Category;
use kbroute_core::usage::{FeedbackKind, UsageLog};

/// kbroute: an intent-routed assistant with a local knowledge pipeline.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/kbr.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "kbr",
    about = "kbroute: an intent-routed assistant with a local retrieval-augmented knowledge pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/kbr.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and cache directory.
    ///
    /// Idempotent: running it multiple times is safe.
    Init,

    /// Fetch articles from the knowledge-base API into the store.
    Collect {
        /// Article IDs to fetch instead of `[collector] article_ids`.
        ids: Vec<i64>,
    },

    /// Chunk documents that have no fragments yet.
    Process,

    /// Manage fragment embeddings.
    Embed {
        #[command(subcommand)]
        action: EmbedAction,
    },

    /// Run collect, process, and embed in sequence.
    Ingest {
        /// Article IDs to fetch instead of `[collector] article_ids`.
        ids: Vec<i64>,
    },

    /// Load, augment, or build the knowledge base of a category.
    Build {
        /// `accounting` or `management`.
        category: String,

        /// Ignore the cached artifact and build from scratch.
        #[arg(long)]
        force: bool,
    },

    /// Classify a request and print its category.
    Classify { text: String },

    /// Answer a question, routing it by intent.
    Ask {
        question: String,

        /// Skip classification and answer as this category.
        #[arg(long)]
        category: Option<String>,
    },

    /// Rate the answer to a question.
    Feedback {
        /// `positive`, `negative`, or `neutral`.
        rating: String,

        /// The question as it was asked.
        question: String,

        /// The answer being rated.
        #[arg(long)]
        response: Option<String>,
    },

    /// Show store, knowledge base, and usage statistics.
    Stats,
}

#[derive(Subcommand)]
enum EmbedAction {
    /// Embed fragments that do not have a vector yet.
    Pending {
        /// Maximum number of fragments to embed in this run.
        #[arg(long)]
        limit: Option<usize>,

        /// Override the batch size from config.
        #[arg(long)]
        batch_size: Option<usize>,
    },
}

fn parse_category(slug: &str) -> Result<Category> {
    match Category::from_slug(slug) {
        Some(c) => Ok(c),
        None => bail!(
            "Unknown category: '{}'. Available: {}",
            slug,
            Category::ALL.map(|c| c.slug()).join(", ")
        ),
    }
}

fn parse_rating(slug: &str) -> Result<FeedbackKind> {
    match FeedbackKind::from_slug(slug) {
        Some(k) => Ok(k),
        None => bail!(
            "Unknown rating: '{}'. Available: {}",
            slug,
            FeedbackKind::ALL.map(|k| k.as_str()).join(", ")
        ),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,kbroute=info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            std::fs::create_dir_all(&cfg.cache.dir).with_context(|| {
                format!("Failed to create cache directory: {}", cfg.cache.dir.display())
            })?;
            println!("Database initialized successfully.");
        }
        Commands::Collect { ids } => {
            pipeline::run_collect(&cfg, &ids).await?;
        }
        Commands::Process => {
            pipeline::run_process(&cfg).await?;
        }
        Commands::Embed { action } => match action {
            EmbedAction::Pending { limit, batch_size } => {
                pipeline::run_embed_pending(&cfg, limit, batch_size).await?;
            }
        },
        Commands::Ingest { ids } => {
            pipeline::run_ingest(&cfg, &ids).await?;
        }
        Commands::Build { category, force } => {
            let category = parse_category(&category)?;
            if !KnowledgeConfig::CATEGORIES.contains(&category) {
                bail!("Category '{}' has no knowledge base", category);
            }
            let services = Services::connect(&cfg).await?;
            let index = if force {
                services.knowledge.rebuild(category).await?
            } else {
                services.knowledge.load_or_create(category).await?
            };
            println!("build {}", category);
            println!("  entries: {}", index.len());
            println!("  hybrid: {}", if index.is_hybrid() { "yes" } else { "no" });
            println!("  model: {} ({} dims)", index.model(), index.dims());
            println!("ok");
            services.close().await;
        }
        Commands::Classify { text } => {
            let services = Services::connect(&cfg).await?;
            let category = services.classifier().classify(&text).await;
            println!("{}", category);
            services.close().await;
        }
        Commands::Ask { question, category } => {
            let category = category.as_deref().map(parse_category).transpose()?;
            let services = Services::connect(&cfg).await?;
            let router = services.router(&cfg);
            let reply = match category {
                Some(c) => router.dispatch(c, &question).await,
                None => router.handle(&question).await,
            };
            println!("{}", reply.text);
            services.close().await;
        }
        Commands::Feedback {
            rating,
            question,
            response,
        } => {
            let kind = parse_rating(&rating)?;
            migrate::run_migrations(&cfg).await?;
            let usage = SqliteUsageLog::new(db::connect(&cfg).await?);
            usage
                .record_feedback(&question, response.as_deref(), kind)
                .await?;
            println!("feedback");
            println!("  rating: {}", kind);
            println!("ok");
            usage.pool().close().await;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
    }

    Ok(())
}
