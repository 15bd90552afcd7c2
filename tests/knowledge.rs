//! Knowledge base, answering, and routing tests with stub providers.
//!
//! Web pages and generation are served in-process; embeddings come from
//! the deterministic hash embedder, so every run sees the same vectors.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use kbroute::answer::{Answerer, GENERATION_FAILED_MESSAGE};
use kbroute::artifact;
use kbroute::config::Config;
use kbroute::knowledge::{KbState, KnowledgeBases};
use kbroute::router::Router;
use kbroute::sqlite_store::SqliteContentStore;
use kbroute::usage_log::SqliteUsageLog;
use kbroute::{db, migrate};
use kbroute_core::category::Category;
use kbroute_core::chunk::chunk_document;
use kbroute_core::embedding::{Embedder, HashEmbedder};
use kbroute_core::error::{FetchError, GenerationError};
use kbroute_core::fetch::PageFetcher;
use kbroute_core::generation::Generator;
use kbroute_core::index::VectorIndex;
use kbroute_core::models::{EntryType, SourceDocument};
use kbroute_core::store::ContentStore;
use kbroute_core::usage::{FeedbackKind, UsageLog};

// ─── Stub providers ─────────────────────────────────────────────────

struct StubPages(HashMap<String, String>);

#[async_trait]
impl PageFetcher for StubPages {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        self.0.get(url).cloned().ok_or_else(|| FetchError::Status {
            target: url.to_string(),
            status: 503,
        })
    }
}

/// Records every prompt and echoes a fixed reply.
struct RecordingGenerator {
    reply: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl RecordingGenerator {
    fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl Generator for RecordingGenerator {
    fn model_name(&self) -> &str {
        "recording"
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply
            .clone()
            .ok_or_else(|| GenerationError::Request("connection refused".into()))
    }
}

// ─── Fixtures ───────────────────────────────────────────────────────

const RECEITA: &str = "https://receita.example/pt-br";
const SPED: &str = "https://sped.example/";

struct Env {
    _tmp: TempDir,
    config: Config,
    store: Arc<SqliteContentStore>,
    embedder: Arc<dyn Embedder>,
}

async fn setup(urls: &[&str], keywords: &[&str]) -> Env {
    let tmp = TempDir::new().unwrap();
    let urls = urls
        .iter()
        .map(|u| format!("\"{}\"", u))
        .collect::<Vec<_>>()
        .join(", ");
    let keywords = keywords
        .iter()
        .map(|k| format!("\"{}\"", k))
        .collect::<Vec<_>>()
        .join(", ");
    let config: Config = toml::from_str(&format!(
        r#"[db]
path = "{root}/data/kbr.sqlite"

[cache]
dir = "{root}/cache"

[embedding]
provider = "hash"
dims = 64

[knowledge.accounting]
urls = [{urls}]
keywords = [{keywords}]
"#,
        root = tmp.path().display(),
    ))
    .unwrap();

    migrate::run_migrations(&config).await.unwrap();
    let store = Arc::new(SqliteContentStore::new(db::connect(&config).await.unwrap()));
    Env {
        _tmp: tmp,
        config,
        store,
        embedder: Arc::new(HashEmbedder::new(64)),
    }
}

fn pages() -> Arc<StubPages> {
    Arc::new(StubPages(HashMap::from([
        (
            RECEITA.to_string(),
            "Declaração de imposto de renda da pessoa jurídica. O prazo de entrega \
             da ECF é o último dia útil de julho."
                .to_string(),
        ),
        (
            SPED.to_string(),
            "O SPED Fiscal reúne a escrituração digital de ICMS e IPI.".to_string(),
        ),
    ])))
}

fn knowledge(env: &Env) -> Arc<KnowledgeBases> {
    Arc::new(KnowledgeBases::from_config(
        &env.config,
        env.store.clone(),
        env.embedder.clone(),
        pages(),
    ))
}

fn answerer(env: &Env, kbs: Arc<KnowledgeBases>, generator: Arc<RecordingGenerator>) -> Answerer {
    Answerer::new(
        kbs,
        env.embedder.clone(),
        generator,
        env.config.retrieval.k_single,
        env.config.retrieval.k_hybrid,
    )
}

async fn add_fiscal_article(store: &SqliteContentStore, id: i64, title: &str, body: &str) {
    store
        .upsert_document(&SourceDocument::new(id, title, body, vec!["Fiscal".into()]))
        .await
        .unwrap();
}

// ─── Knowledge bases ────────────────────────────────────────────────

#[tokio::test]
async fn test_web_only_build_and_artifact_round_trip() {
    let env = setup(&[RECEITA, SPED, "https://offline.example/"], &["fiscal"]).await;
    let kbs = knowledge(&env);

    let index = kbs.load_or_create(Category::Accounting).await.unwrap();
    assert_eq!(index.len(), 2);
    assert!(index.has_entry_type(EntryType::Web));
    assert!(!index.is_hybrid());
    assert_eq!(kbs.state(Category::Accounting).await, Some(KbState::Ready));

    // The saved artifact answers queries exactly like the in-memory index.
    let path = artifact::artifact_path(&env.config.cache.dir, "accounting");
    let loaded = artifact::load_index(&path, 0).await.unwrap();
    let query = env.embedder.embed("prazo da ECF").await.unwrap();
    let expected: Vec<_> = index
        .query(&query, 2)
        .into_iter()
        .map(|(e, s)| (e.text.clone(), s))
        .collect();
    let actual: Vec<_> = loaded
        .query(&query, 2)
        .into_iter()
        .map(|(e, s)| (e.text.clone(), s))
        .collect();
    assert_eq!(expected, actual);
}

#[tokio::test]
async fn test_exact_text_ranks_first() {
    let env = setup(&[RECEITA, SPED], &[]).await;
    let index = knowledge(&env)
        .load_or_create(Category::Accounting)
        .await
        .unwrap();

    let target = &index.entries()[1];
    let hits = index.query(&target.vector, 2);
    assert_eq!(hits[0].0.text, target.text);
    assert!((hits[0].1 - 1.0).abs() < 1e-5);
}

#[tokio::test]
async fn test_hybrid_build_persists_store_fragments() {
    let env = setup(&[RECEITA], &["fiscal"]).await;
    add_fiscal_article(&env.store, 10, "Emissão de NF-e", "Acesse Fiscal > NF-e > Emitir.").await;
    add_fiscal_article(&env.store, 11, "Cancelamento de NF-e", "Cancele em até 24 horas.").await;
    env.store
        .upsert_document(&SourceDocument::new(12, "Recursos Humanos", "Folha.", vec![]))
        .await
        .unwrap();

    let index = knowledge(&env)
        .load_or_create(Category::Accounting)
        .await
        .unwrap();
    assert!(index.is_hybrid());
    assert_eq!(index.len(), 3);

    // Fragments of matched documents were created and embedded on demand.
    let counts = env.store.counts().await.unwrap();
    assert_eq!(counts.fragments, 2);
    assert_eq!(counts.embedded, 2);
    assert!(env.store.fragments_for(12).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_cached_index_is_augmented_once() {
    let env = setup(&[RECEITA], &["fiscal"]).await;
    let first = knowledge(&env)
        .load_or_create(Category::Accounting)
        .await
        .unwrap();
    assert_eq!(first.len(), 1);

    // Ingested and embedded after the artifact was written.
    add_fiscal_article(&env.store, 20, "SPED Contribuições", "Entrega mensal do EFD.").await;
    let doc = env.store.get_document(20).await.unwrap().unwrap();
    env.store
        .insert_fragments(20, &chunk_document(&doc, 500, 50))
        .await
        .unwrap();
    let vector = env.embedder.embed(&doc.raw_content).await.unwrap();
    env.store
        .set_embedding(20, 0, &vector, env.embedder.model_name())
        .await
        .unwrap();

    let second = knowledge(&env)
        .load_or_create(Category::Accounting)
        .await
        .unwrap();
    assert_eq!(second.len(), 2);
    assert!(second.is_hybrid());
    // Augmentation keeps the original build time.
    assert_eq!(second.created_at(), first.created_at());

    let third = knowledge(&env)
        .load_or_create(Category::Accounting)
        .await
        .unwrap();
    assert_eq!(third.len(), 2);
}

#[tokio::test]
async fn test_model_change_triggers_rebuild() {
    let env = setup(&[RECEITA], &[]).await;
    let path = artifact::artifact_path(&env.config.cache.dir, "accounting");
    artifact::save_index(&VectorIndex::new(8, "other-model"), &path)
        .await
        .unwrap();

    let index = knowledge(&env)
        .load_or_create(Category::Accounting)
        .await
        .unwrap();
    assert_eq!(index.dims(), 64);
    assert_eq!(index.len(), 1);
}

// ─── Answering ──────────────────────────────────────────────────────

#[tokio::test]
async fn test_answer_without_content_still_replies() {
    let env = setup(&["https://offline.example/"], &["fiscal"]).await;
    let kbs = knowledge(&env);
    let generator = RecordingGenerator::replying("Resposta geral.");
    let answerer = answerer(&env, kbs.clone(), generator.clone());

    let reply = answerer
        .answer("Qual o prazo da ECF?", Category::Accounting)
        .await;
    assert_eq!(reply, "Resposta geral.");
    assert_eq!(
        kbs.state(Category::Accounting).await,
        Some(KbState::Unavailable)
    );
    assert!(!generator.last_prompt().contains("KNOWLEDGE BASE CONTEXT"));
}

#[tokio::test]
async fn test_answer_generation_failure_is_friendly() {
    let env = setup(&["https://offline.example/"], &[]).await;
    let answerer = answerer(&env, knowledge(&env), RecordingGenerator::failing());

    let reply = answerer.answer("Qual o prazo?", Category::Accounting).await;
    assert_eq!(reply, GENERATION_FAILED_MESSAGE);
    assert!(!reply.contains("connection refused"));
}

#[tokio::test]
async fn test_retrieval_depth_depends_on_sources() {
    let env = setup(&[RECEITA, SPED], &["fiscal"]).await;
    for i in 0..4 {
        add_fiscal_article(
            &env.store,
            100 + i,
            &format!("Rotina fiscal {}", i),
            &format!("Passo a passo da rotina fiscal número {}.", i),
        )
        .await;
    }
    let kbs = knowledge(&env);
    let generator = RecordingGenerator::replying("ok");
    let answerer = answerer(&env, kbs.clone(), generator.clone());

    answerer.answer("rotina fiscal", Category::Accounting).await;
    let index = kbs.load_or_create(Category::Accounting).await.unwrap();
    assert!(index.is_hybrid());
    assert_eq!(answerer.retrieval_k(&index), 5);
    // Five `[source]` blocks made it into the prompt.
    assert_eq!(generator.last_prompt().matches("\n[").count(), 5);

    let single = VectorIndex::new(64, "hash");
    assert_eq!(answerer.retrieval_k(&single), 3);
}

// ─── Routing ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_router_dispatch() {
    let env = setup(&[RECEITA], &[]).await;
    let generator = RecordingGenerator::replying("database");
    let router = Router::new(
        generator.clone(),
        answerer(&env, knowledge(&env), generator.clone()),
    );

    let reply = router.handle("Quais produtos venderam mais em março?").await;
    assert_eq!(reply.category, Category::Database);
    assert!(generator.last_prompt().contains("vendas.produto_id"));

    let reply = router.dispatch(Category::ImageAnalysis, "analise isto").await;
    assert!(reply.text.contains("upload"));

    let reply = router.dispatch(Category::VideoGeneration, "crie um vídeo").await;
    assert!(reply.text.contains("not available"));

    let reply = router.dispatch(Category::General, "Olá!").await;
    assert_eq!(reply.text, "database");
}

#[tokio::test]
async fn test_router_records_interactions_and_feedback() {
    let env = setup(&[RECEITA], &[]).await;
    let usage = Arc::new(SqliteUsageLog::new(env.store.pool().clone()));
    let generator = RecordingGenerator::replying("database");
    let router = Router::new(
        generator.clone(),
        answerer(&env, knowledge(&env), generator.clone()),
    )
    .with_usage_log(usage.clone());

    router.handle("Quais produtos venderam mais?").await;
    router.dispatch(Category::ImageAnalysis, "analise isto").await;
    router.dispatch(Category::General, "Olá!").await;
    router.dispatch(Category::General, "Olá!").await;

    usage
        .record_feedback("Quais produtos venderam mais?", Some("database"), FeedbackKind::Positive)
        .await
        .unwrap();
    for _ in 0..2 {
        usage
            .record_feedback("Olá!", None, FeedbackKind::Negative)
            .await
            .unwrap();
    }

    let insights = usage.insights(5).await.unwrap();
    assert_eq!(insights.total_interactions, 4);
    assert_eq!(insights.total_feedback, 3);
    assert_eq!(insights.frequent_queries[0], ("Olá!".to_string(), 2));
    assert_eq!(
        insights.popular_intents,
        vec![
            ("general".to_string(), 2),
            ("analyze_image".to_string(), 1),
            ("database".to_string(), 1),
        ]
    );
    assert_eq!(insights.problem_intents, vec![("general".to_string(), 2)]);
    let rate = insights.success_rate().unwrap();
    assert!((rate - 100.0 / 3.0).abs() < 1e-9);
    assert_eq!(
        insights.recommendations(),
        vec!["Improve general answers: 2 negative ratings".to_string()]
    );

    // Fixed media replies involve no model.
    let models: Vec<(String, Option<String>)> =
        sqlx::query_as("SELECT intent, model_used FROM interactions ORDER BY id")
            .fetch_all(env.store.pool())
            .await
            .unwrap();
    assert_eq!(models[0], ("database".to_string(), Some("recording".to_string())));
    assert_eq!(models[1], ("analyze_image".to_string(), None));
}
