//! Configuration parsing and validation.
//!
//! kbroute is configured with a TOML file (default `./config/kbr.toml`).
//! Every section except `[db]` is optional and falls back to the defaults
//! below. Secrets never live in the file: API keys and the article token are
//! read from the environment variables the config names.
//!
//! ```toml
//! [db]
//! path = "./data/kbr.sqlite"
//!
//! [cache]
//! dir = "./data/cache"
//!
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//! dims = 1536
//!
//! [generation]
//! provider = "openai"
//! model = "gpt-4o-mini"
//!
//! [collector]
//! article_ids = [551342, 551343]
//!
//! [knowledge.management]
//! keywords = ["estoque", "venda"]
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use kbroute_core::category::Category;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub knowledge: KnowledgeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Directory holding one `<cache_key>.kbix` artifact per knowledge base.
    #[serde(default = "default_cache_dir")]
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
        }
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("./data/cache")
}

/// Fragment sizes, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_store_max_chars")]
    pub store_max_chars: usize,
    #[serde(default = "default_store_overlap_chars")]
    pub store_overlap_chars: usize,
    #[serde(default = "default_web_max_chars")]
    pub web_max_chars: usize,
    #[serde(default = "default_web_overlap_chars")]
    pub web_overlap_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            store_max_chars: default_store_max_chars(),
            store_overlap_chars: default_store_overlap_chars(),
            web_max_chars: default_web_max_chars(),
            web_overlap_chars: default_web_overlap_chars(),
        }
    }
}

fn default_store_max_chars() -> usize {
    500
}
fn default_store_overlap_chars() -> usize {
    50
}
fn default_web_max_chars() -> usize {
    1000
}
fn default_web_overlap_chars() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Fragments retrieved when the index holds one kind of source.
    #[serde(default = "default_k_single")]
    pub k_single: usize,
    /// Fragments retrieved when the index mixes web and database entries.
    #[serde(default = "default_k_hybrid")]
    pub k_hybrid: usize,
    /// Cap on documents matched by keyword when augmenting an index.
    #[serde(default = "default_match_limit")]
    pub match_limit: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_single: default_k_single(),
            k_hybrid: default_k_hybrid(),
            match_limit: default_match_limit(),
        }
    }
}

fn default_k_single() -> usize {
    3
}
fn default_k_hybrid() -> usize {
    5
}
fn default_match_limit() -> usize {
    50
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_timeout_secs(),
            url: None,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_embedding_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    /// `disabled` or `openai` (any OpenAI-compatible chat completions API).
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default = "default_generation_url")]
    pub url: String,
    /// Environment variable holding the API key. Unset means no auth header.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: default_generation_url(),
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_generation_provider() -> String {
    "disabled".to_string()
}
fn default_generation_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_generation_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}
fn default_temperature() -> f32 {
    0.3
}
fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectorConfig {
    #[serde(default = "default_collector_base_url")]
    pub base_url: String,
    /// Environment variable holding the API token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default)]
    pub article_ids: Vec<i64>,
    /// Pause between consecutive article requests.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            base_url: default_collector_base_url(),
            token_env: default_token_env(),
            article_ids: Vec::new(),
            delay_ms: default_delay_ms(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_collector_base_url() -> String {
    "https://api.movidesk.com/public/v1/article".to_string()
}
fn default_token_env() -> String {
    "KBR_ARTICLE_TOKEN".to_string()
}
fn default_delay_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct KnowledgeConfig {
    #[serde(default)]
    pub accounting: KnowledgeBaseConfig,
    #[serde(default)]
    pub management: KnowledgeBaseConfig,
}

/// Per-category knowledge base settings. Omitted fields take the
/// category's built-in defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct KnowledgeBaseConfig {
    #[serde(default)]
    pub cache_key: Option<String>,
    #[serde(default)]
    pub urls: Option<Vec<String>>,
    #[serde(default)]
    pub keywords: Option<Vec<String>>,
    /// Maximum artifact age before a rebuild. `0` never expires.
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for KnowledgeBaseConfig {
    fn default() -> Self {
        Self {
            cache_key: None,
            urls: None,
            keywords: None,
            ttl_secs: default_ttl_secs(),
        }
    }
}

fn default_ttl_secs() -> u64 {
    86_400
}

const ACCOUNTING_URLS: &[&str] = &[
    "https://www.gov.br/receitafederal/pt-br",
    "https://www.cfc.org.br/",
    "https://www.sped.fazenda.gov.br/",
    "https://www.nfe.fazenda.gov.br/",
    "https://www.contabilizei.com.br/contabilidade-online/",
    "https://blog.sage.com/pt-br/",
];

const ACCOUNTING_KEYWORDS: &[&str] = &[
    "contab",
    "fiscal",
    "nota fiscal",
    "imposto",
    "tribut",
    "sped",
    "financeiro",
];

const MANAGEMENT_URLS: &[&str] = &[
    "https://sebrae.com.br/",
    "https://www.gov.br/empresas-e-negocios/pt-br",
    "https://www.bndes.gov.br/",
    "https://endeavor.org.br/",
    "https://www.administradores.com.br/",
];

const MANAGEMENT_KEYWORDS: &[&str] = &[
    "gestão",
    "estoque",
    "venda",
    "compra",
    "relatório",
    "comercial",
];

/// Knowledge base settings with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub struct KnowledgeSettings {
    pub category: Category,
    pub cache_key: String,
    pub urls: Vec<String>,
    pub keywords: Vec<String>,
    pub ttl_secs: u64,
}

impl KnowledgeConfig {
    /// Categories answered from a knowledge base.
    pub const CATEGORIES: [Category; 2] = [Category::Accounting, Category::Management];

    /// Resolved settings for `category`, or `None` when the category has no
    /// knowledge base.
    pub fn settings(&self, category: Category) -> Option<KnowledgeSettings> {
        let (cfg, urls, keywords) = match category {
            Category::Accounting => (&self.accounting, ACCOUNTING_URLS, ACCOUNTING_KEYWORDS),
            Category::Management => (&self.management, MANAGEMENT_URLS, MANAGEMENT_KEYWORDS),
            _ => return None,
        };
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Some(KnowledgeSettings {
            category,
            cache_key: cfg
                .cache_key
                .clone()
                .unwrap_or_else(|| category.slug().to_string()),
            urls: cfg.urls.clone().unwrap_or_else(|| owned(urls)),
            keywords: cfg.keywords.clone().unwrap_or_else(|| owned(keywords)),
            ttl_secs: cfg.ttl_secs,
        })
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    let c = &config.chunking;
    if c.store_max_chars == 0 || c.web_max_chars == 0 {
        bail!("chunking sizes must be > 0");
    }
    if c.store_overlap_chars >= c.store_max_chars {
        bail!("chunking.store_overlap_chars must be smaller than chunking.store_max_chars");
    }
    if c.web_overlap_chars >= c.web_max_chars {
        bail!("chunking.web_overlap_chars must be smaller than chunking.web_max_chars");
    }

    // Validate retrieval
    let r = &config.retrieval;
    if r.k_single < 1 || r.k_hybrid < 1 {
        bail!("retrieval.k_single and retrieval.k_hybrid must be >= 1");
    }
    if r.match_limit < 1 {
        bail!("retrieval.match_limit must be >= 1");
    }

    // Validate embedding
    let e = &config.embedding;
    if e.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }
    match e.provider.as_str() {
        "openai" | "ollama" => {
            if e.dims.unwrap_or(0) == 0 {
                bail!("embedding.dims must be > 0 when provider is '{}'", e.provider);
            }
            if e.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    e.provider
                );
            }
        }
        "hash" => {
            if e.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        "disabled" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, local, or hash.",
            other
        ),
    }

    // Validate generation
    match config.generation.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml_str: &str) -> Result<Config> {
        let config: Config = toml::from_str(toml_str)?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse("[db]\npath = \"./kbr.sqlite\"\n").unwrap();
        assert_eq!(cfg.chunking.store_max_chars, 500);
        assert_eq!(cfg.chunking.web_overlap_chars, 200);
        assert_eq!(cfg.retrieval.k_single, 3);
        assert_eq!(cfg.retrieval.k_hybrid, 5);
        assert_eq!(cfg.collector.delay_ms, 500);
        assert!(!cfg.embedding.is_enabled());
        assert_eq!(cfg.generation.provider, "disabled");
    }

    #[test]
    fn test_example_config_is_valid() {
        let cfg = parse(include_str!("../config/kbr.example.toml")).unwrap();
        assert_eq!(cfg.embedding.provider, "openai");
        assert_eq!(cfg.collector.article_ids, vec![551342]);
    }

    #[test]
    fn test_knowledge_defaults_per_category() {
        let cfg = parse("[db]\npath = \"./kbr.sqlite\"\n").unwrap();
        let acc = cfg.knowledge.settings(Category::Accounting).unwrap();
        assert_eq!(acc.cache_key, "accounting");
        assert_eq!(acc.ttl_secs, 86_400);
        assert!(!acc.urls.is_empty());
        assert!(acc.keywords.iter().any(|k| k == "fiscal"));

        let mgmt = cfg.knowledge.settings(Category::Management).unwrap();
        assert!(mgmt.keywords.iter().any(|k| k == "estoque"));
        assert!(cfg.knowledge.settings(Category::General).is_none());
    }

    #[test]
    fn test_knowledge_overrides() {
        let cfg = parse(
            r#"
[db]
path = "./kbr.sqlite"

[knowledge.management]
cache_key = "mgmt_v2"
urls = []
ttl_secs = 0
"#,
        )
        .unwrap();
        let mgmt = cfg.knowledge.settings(Category::Management).unwrap();
        assert_eq!(mgmt.cache_key, "mgmt_v2");
        assert!(mgmt.urls.is_empty());
        assert_eq!(mgmt.ttl_secs, 0);
        assert!(!mgmt.keywords.is_empty());
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(parse("[db]\npath = \"x\"\n[chunking]\nstore_max_chars = 0\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[chunking]\nweb_overlap_chars = 1000\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"openai\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[generation]\nprovider = \"magic\"\n").is_err());
        assert!(parse("[db]\npath = \"x\"\n[embedding]\nprovider = \"hash\"\n").is_ok());
    }
}
