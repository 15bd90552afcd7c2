//! Per-category knowledge bases: load, augment, or build a vector index.
//!
//! Each knowledge-backed category moves through
//!
//! ```text
//! Uninitialized ─▶ Loading ─┬─▶ Ready (cached artifact, then augmented)
//!                           └─▶ Building ─┬─▶ Ready
//!                                         └─▶ Unavailable (no content; terminal)
//! ```
//!
//! **Loading** reads `<cache_dir>/<cache_key>.kbix`. A usable artifact is
//! *augmented*: embedded fragments of documents whose title or tags match
//! the category keywords are appended unless their fragment key is already
//! indexed, and the artifact is re-saved only when something was added.
//!
//! **Building** fetches every configured URL (failures are skipped),
//! chunks the pages, adds the keyword-matched store documents (chunking and
//! embedding them on demand and persisting the results), embeds whatever
//! still lacks a vector, and saves the artifact atomically.
//!
//! [`KnowledgeBases`] holds one `tokio::sync::Mutex` per category so a
//! category is never loaded or built twice at the same time.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use kbroute_core::category::Category;
use kbroute_core::chunk::{chunk_document, split_text};
use kbroute_core::embedding::Embedder;
use kbroute_core::error::{IndexLoadError, NoContentError};
use kbroute_core::fetch::PageFetcher;
use kbroute_core::index::VectorIndex;
use kbroute_core::models::{EntryMetadata, IndexEntry};
use kbroute_core::store::ContentStore;

use crate::artifact;
use crate::config::{Config, KnowledgeConfig, KnowledgeSettings};

/// Lifecycle of one category's knowledge base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KbState {
    Uninitialized,
    Loading,
    Building,
    Ready,
    Unavailable,
}

/// Sizes and limits shared by every knowledge base.
#[derive(Debug, Clone)]
pub struct BuildSettings {
    pub cache_dir: PathBuf,
    pub web_max_chars: usize,
    pub web_overlap_chars: usize,
    pub store_max_chars: usize,
    pub store_overlap_chars: usize,
    pub match_limit: usize,
    pub batch_size: usize,
}

impl BuildSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            cache_dir: config.cache.dir.clone(),
            web_max_chars: config.chunking.web_max_chars,
            web_overlap_chars: config.chunking.web_overlap_chars,
            store_max_chars: config.chunking.store_max_chars,
            store_overlap_chars: config.chunking.store_overlap_chars,
            match_limit: config.retrieval.match_limit,
            batch_size: config.embedding.batch_size,
        }
    }
}

/// An index entry that may still need its vector.
struct PendingEntry {
    text: String,
    metadata: EntryMetadata,
    vector: Option<Vec<f32>>,
    /// `(parent_id, sequence_index)` for store fragments.
    fragment: Option<(i64, i64)>,
}

/// Builds and augments indexes from the web and the content store.
pub struct KnowledgeBuilder {
    store: Arc<dyn ContentStore>,
    embedder: Arc<dyn Embedder>,
    fetcher: Arc<dyn PageFetcher>,
    settings: BuildSettings,
}

impl KnowledgeBuilder {
    pub fn new(
        store: Arc<dyn ContentStore>,
        embedder: Arc<dyn Embedder>,
        fetcher: Arc<dyn PageFetcher>,
        settings: BuildSettings,
    ) -> Self {
        Self {
            store,
            embedder,
            fetcher,
            settings,
        }
    }

    pub fn artifact_path(&self, kb: &KnowledgeSettings) -> PathBuf {
        artifact::artifact_path(&self.settings.cache_dir, &kb.cache_key)
    }

    /// Whether a cached index was produced by the current embedder.
    fn is_compatible(&self, index: &VectorIndex) -> bool {
        index.dims() == self.embedder.dims() && index.model() == self.embedder.model_name()
    }

    /// Append embedded, not yet indexed store fragments matching the
    /// category keywords. Returns the number of entries added.
    pub async fn augment(&self, kb: &KnowledgeSettings, index: &mut VectorIndex) -> Result<usize> {
        let docs = self
            .store
            .find_by_title_or_tags(&kb.keywords, self.settings.match_limit)
            .await?;

        let mut entries = Vec::new();
        for doc in &docs {
            for fragment in self.store.fragments_for(doc.external_id).await? {
                // Vectors from another model wait for `kbr embed pending`.
                let Some(vector) = fragment.embedding_for(index.model(), index.dims()) else {
                    continue;
                };
                if index.contains_fragment(&fragment.key()) {
                    continue;
                }
                entries.push(IndexEntry {
                    vector: vector.to_vec(),
                    text: fragment.clean_text.clone(),
                    metadata: EntryMetadata::database(doc, &fragment),
                });
            }
        }

        let added = index.add(entries)?;
        debug!(
            category = %kb.category,
            matched_documents = docs.len(),
            added,
            "augmentation finished"
        );
        Ok(added)
    }

    /// Build a fresh index for `kb`.
    ///
    /// Fails with [`NoContentError`] when neither the web nor the store
    /// yields any text.
    pub async fn full_build(&self, kb: &KnowledgeSettings) -> Result<VectorIndex> {
        if self.embedder.dims() == 0 {
            bail!(
                "embedding provider is disabled; cannot build the {} knowledge base",
                kb.category
            );
        }

        let mut pending = self.web_entries(kb).await;
        let web_count = pending.len();
        pending.extend(self.store_entries(kb).await?);
        let store_count = pending.len() - web_count;

        if pending.is_empty() {
            return Err(NoContentError {
                category: kb.category.slug().to_string(),
            }
            .into());
        }

        let total = pending.len();
        let entries = self.embed_entries(pending).await?;
        if entries.is_empty() {
            bail!(
                "none of the {} fragments for the {} knowledge base could be embedded",
                total,
                kb.category
            );
        }

        let mut index = VectorIndex::new(self.embedder.dims(), self.embedder.model_name());
        let added = index.add(entries)?;
        info!(
            category = %kb.category,
            web_fragments = web_count,
            store_fragments = store_count,
            indexed = added,
            dropped = total - added,
            "knowledge base built"
        );
        Ok(index)
    }

    async fn web_entries(&self, kb: &KnowledgeSettings) -> Vec<PendingEntry> {
        let mut entries = Vec::new();
        let mut failed = 0usize;
        for url in &kb.urls {
            let text = match self.fetcher.fetch_page(url).await {
                Ok(text) => text,
                Err(e) => {
                    warn!(url = %url, error = %e, "page fetch failed, skipping");
                    failed += 1;
                    continue;
                }
            };
            let chunks = split_text(
                &text,
                self.settings.web_max_chars,
                self.settings.web_overlap_chars,
            );
            debug!(url = %url, fragments = chunks.len(), "page fetched");
            entries.extend(chunks.into_iter().map(|chunk| PendingEntry {
                text: chunk,
                metadata: EntryMetadata::web(url),
                vector: None,
                fragment: None,
            }));
        }
        if !kb.urls.is_empty() && failed == kb.urls.len() {
            warn!(category = %kb.category, "every page fetch failed; continuing without web content");
        }
        entries
    }

    async fn store_entries(&self, kb: &KnowledgeSettings) -> Result<Vec<PendingEntry>> {
        let docs = self
            .store
            .find_by_title_or_tags(&kb.keywords, self.settings.match_limit)
            .await?;

        let dims = self.embedder.dims();
        let model = self.embedder.model_name();
        let mut entries = Vec::new();
        for doc in &docs {
            let mut fragments = self.store.fragments_for(doc.external_id).await?;
            if fragments.is_empty() {
                let chunked = chunk_document(
                    doc,
                    self.settings.store_max_chars,
                    self.settings.store_overlap_chars,
                );
                if chunked.is_empty() {
                    continue;
                }
                self.store
                    .insert_fragments(doc.external_id, &chunked)
                    .await?;
                fragments = self.store.fragments_for(doc.external_id).await?;
            }

            for fragment in fragments {
                // A cached vector from another model is re-embedded.
                let vector = fragment.embedding_for(model, dims).map(<[f32]>::to_vec);
                entries.push(PendingEntry {
                    text: fragment.clean_text.clone(),
                    metadata: EntryMetadata::database(doc, &fragment),
                    vector,
                    fragment: Some((fragment.parent_id, fragment.sequence_index)),
                });
            }
        }
        Ok(entries)
    }

    /// Fill in missing vectors, persisting those of store fragments.
    /// Entries that cannot be embedded are dropped.
    async fn embed_entries(&self, mut pending: Vec<PendingEntry>) -> Result<Vec<IndexEntry>> {
        let missing: Vec<usize> = pending
            .iter()
            .enumerate()
            .filter(|(_, p)| p.vector.is_none())
            .map(|(i, _)| i)
            .collect();

        let dims = self.embedder.dims();
        let model = self.embedder.model_name().to_string();
        for batch in missing.chunks(self.settings.batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|&i| pending[i].text.clone()).collect();
            let vectors = match self.embedder.embed_batch(&texts).await {
                Ok(v) if v.len() == batch.len() => v,
                Ok(v) => {
                    warn!(
                        expected = batch.len(),
                        got = v.len(),
                        "embedding batch returned the wrong number of vectors, dropping it"
                    );
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, fragments = batch.len(), "embedding batch failed, dropping it");
                    continue;
                }
            };

            for (&i, vector) in batch.iter().zip(vectors) {
                if vector.len() != dims {
                    continue;
                }
                if let Some((parent, seq)) = pending[i].fragment {
                    self.store
                        .set_embedding(parent, seq, &vector, &model)
                        .await?;
                }
                pending[i].vector = Some(vector);
            }
        }

        Ok(pending
            .into_iter()
            .filter_map(|p| {
                p.vector.map(|vector| IndexEntry {
                    vector,
                    text: p.text,
                    metadata: p.metadata,
                })
            })
            .collect())
    }
}

/// One category's knowledge base and its current index.
pub struct KnowledgeBase {
    settings: KnowledgeSettings,
    state: KbState,
    index: Option<Arc<VectorIndex>>,
}

impl KnowledgeBase {
    pub fn new(settings: KnowledgeSettings) -> Self {
        Self {
            settings,
            state: KbState::Uninitialized,
            index: None,
        }
    }

    pub fn state(&self) -> KbState {
        self.state
    }
}

/// Registry of knowledge bases, one mutex per category.
pub struct KnowledgeBases {
    builder: KnowledgeBuilder,
    bases: HashMap<Category, Mutex<KnowledgeBase>>,
}

impl KnowledgeBases {
    pub fn new(builder: KnowledgeBuilder, settings: Vec<KnowledgeSettings>) -> Self {
        let bases = settings
            .into_iter()
            .map(|s| (s.category, Mutex::new(KnowledgeBase::new(s))))
            .collect();
        Self { builder, bases }
    }

    /// Registry with the accounting and management knowledge bases.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn ContentStore>,
        embedder: Arc<dyn Embedder>,
        fetcher: Arc<dyn PageFetcher>,
    ) -> Self {
        let builder =
            KnowledgeBuilder::new(store, embedder, fetcher, BuildSettings::from_config(config));
        let settings = KnowledgeConfig::CATEGORIES
            .iter()
            .filter_map(|c| config.knowledge.settings(*c))
            .collect();
        Self::new(builder, settings)
    }

    pub fn builder(&self) -> &KnowledgeBuilder {
        &self.builder
    }

    fn slot(&self, category: Category) -> Result<&Mutex<KnowledgeBase>> {
        match self.bases.get(&category) {
            Some(slot) => Ok(slot),
            None => bail!("no knowledge base for category {}", category),
        }
    }

    pub async fn state(&self, category: Category) -> Option<KbState> {
        match self.bases.get(&category) {
            Some(slot) => Some(slot.lock().await.state()),
            None => None,
        }
    }

    /// Return the category's index, loading and augmenting the cached
    /// artifact or building a new one as needed.
    pub async fn load_or_create(&self, category: Category) -> Result<Arc<VectorIndex>> {
        let mut kb = self.slot(category)?.lock().await;

        match kb.state {
            KbState::Ready => {
                if let Some(index) = &kb.index {
                    return Ok(index.clone());
                }
            }
            KbState::Unavailable => {
                return Err(NoContentError {
                    category: category.slug().to_string(),
                }
                .into())
            }
            _ => {}
        }

        kb.state = KbState::Loading;
        let path = self.builder.artifact_path(&kb.settings);
        let mut expired = None;
        // Expiry is checked here so an expired index can still back a
        // rebuild that finds no content.
        match artifact::load_index(&path, 0).await {
            Ok(index) if !self.builder.is_compatible(&index) => {
                info!(
                    category = %category,
                    cached_model = index.model(),
                    "cached index was built with a different embedder, rebuilding"
                );
            }
            Ok(index) if artifact::is_expired(&index, kb.settings.ttl_secs) => {
                info!(category = %category, "cached index expired, rebuilding");
                expired = Some(index);
            }
            Ok(mut index) => {
                kb.state = KbState::Ready;
                match self.builder.augment(&kb.settings, &mut index).await {
                    Ok(0) => {}
                    Ok(added) => {
                        if let Err(e) = artifact::save_index(&index, &path).await {
                            warn!(path = %path.display(), error = %e, "failed to save augmented index");
                        } else {
                            info!(category = %category, added, "cached index augmented");
                        }
                    }
                    Err(e) => {
                        warn!(category = %category, error = %e, "augmentation failed, serving cached index");
                    }
                }
                info!(category = %category, entries = index.len(), "knowledge base loaded from cache");
                let index = Arc::new(index);
                kb.index = Some(index.clone());
                return Ok(index);
            }
            Err(IndexLoadError::Missing { .. }) => {
                info!(category = %category, "no cached index, building");
            }
            Err(e) => {
                warn!(category = %category, error = %e, "cached index unusable, rebuilding");
            }
        }

        self.build_locked(&mut kb, expired).await
    }

    /// Discard any cached artifact and build the category's index anew.
    pub async fn rebuild(&self, category: Category) -> Result<Arc<VectorIndex>> {
        let mut kb = self.slot(category)?.lock().await;
        self.build_locked(&mut kb, None).await
    }

    /// Build `kb`'s index. `expired` is served instead when the build
    /// finds no content.
    async fn build_locked(
        &self,
        kb: &mut KnowledgeBase,
        expired: Option<VectorIndex>,
    ) -> Result<Arc<VectorIndex>> {
        kb.state = KbState::Building;
        kb.index = None;

        match self.builder.full_build(&kb.settings).await {
            Ok(index) => {
                let path = self.builder.artifact_path(&kb.settings);
                if let Err(e) = artifact::save_index(&index, &path).await {
                    warn!(path = %path.display(), error = %e, "failed to save index artifact");
                }
                let index = Arc::new(index);
                kb.state = KbState::Ready;
                kb.index = Some(index.clone());
                Ok(index)
            }
            Err(e) => match expired {
                Some(index) if e.is::<NoContentError>() => {
                    warn!(
                        category = %kb.settings.category,
                        "no content found, serving the expired index"
                    );
                    let index = Arc::new(index);
                    kb.state = KbState::Ready;
                    kb.index = Some(index.clone());
                    Ok(index)
                }
                _ => {
                    kb.state = if e.is::<NoContentError>() {
                        warn!(category = %kb.settings.category, "no content found, knowledge base unavailable");
                        KbState::Unavailable
                    } else {
                        KbState::Uninitialized
                    };
                    Err(e)
                }
            },
        }
    }
}
