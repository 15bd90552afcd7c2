//! Wiring of the store, providers, and knowledge bases for the assistant
//! commands.

use anyhow::Result;
use std::sync::Arc;

use kbroute_core::embedding::Embedder;
use kbroute_core::fetch::PageFetcher;
use kbroute_core::generation::Generator;

use crate::answer::Answerer;
use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::generation::create_generator;
use crate::intent::IntentClassifier;
use crate::knowledge::KnowledgeBases;
use crate::migrate;
use crate::router::Router;
use crate::sqlite_store::SqliteContentStore;
use crate::usage_log::SqliteUsageLog;
use crate::web::HttpPageFetcher;

pub struct Services {
    pub store: Arc<SqliteContentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub knowledge: Arc<KnowledgeBases>,
    pub usage: Arc<SqliteUsageLog>,
}

impl Services {
    /// Open the database (creating the schema if needed) and build every
    /// provider named in `config`.
    pub async fn connect(config: &Config) -> Result<Self> {
        migrate::run_migrations(config).await?;
        let pool = db::connect(config).await?;
        let usage = Arc::new(SqliteUsageLog::new(pool.clone()));
        let store = Arc::new(SqliteContentStore::new(pool));
        let embedder = create_embedder(&config.embedding)?;
        let generator = create_generator(&config.generation)?;
        let fetcher: Arc<dyn PageFetcher> =
            Arc::new(HttpPageFetcher::new(config.collector.timeout_secs)?);
        let knowledge = Arc::new(KnowledgeBases::from_config(
            config,
            store.clone(),
            embedder.clone(),
            fetcher.clone(),
        ));

        Ok(Self {
            store,
            embedder,
            generator,
            fetcher,
            knowledge,
            usage,
        })
    }

    pub fn answerer(&self, config: &Config) -> Answerer {
        Answerer::new(
            self.knowledge.clone(),
            self.embedder.clone(),
            self.generator.clone(),
            config.retrieval.k_single,
            config.retrieval.k_hybrid,
        )
    }

    pub fn classifier(&self) -> IntentClassifier {
        IntentClassifier::new(self.generator.clone())
    }

    pub fn router(&self, config: &Config) -> Router {
        Router::new(self.generator.clone(), self.answerer(config))
            .with_usage_log(self.usage.clone())
    }

    pub async fn close(&self) {
        self.store.pool().close().await;
    }
}
