//! Storage abstraction for source documents and their fragments.
//!
//! The [`ContentStore`] trait defines every storage operation the ingestion
//! pipeline and the knowledge base builder need, so the SQLite backend in
//! the app crate and the in-memory backend here are interchangeable.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Fragment, SourceDocument};

/// Row counts reported by `kbr stats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub documents: i64,
    pub fragments: i64,
    pub embedded: i64,
}

impl StoreCounts {
    pub fn pending(&self) -> i64 {
        self.fragments - self.embedded
    }
}

/// Abstract repository of source documents.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`upsert_document`](ContentStore::upsert_document) | Insert or update by external ID |
/// | [`get_document`](ContentStore::get_document) | Fetch one document |
/// | [`find_by_title_or_tags`](ContentStore::find_by_title_or_tags) | Keyword match for augmentation |
/// | [`documents_without_fragments`](ContentStore::documents_without_fragments) | Work list for processing |
/// | [`insert_fragments`](ContentStore::insert_fragments) | Persist a document's fragments |
/// | [`fragments_for`](ContentStore::fragments_for) | Fragments of one document |
/// | [`pending_fragments`](ContentStore::pending_fragments) | Fragments lacking an embedding from the current model |
/// | [`set_embedding`](ContentStore::set_embedding) | Cache a fragment embedding |
/// | [`counts`](ContentStore::counts) | Summary statistics |
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Insert a document, or update title, content, and tags of the
    /// existing row with the same `external_id`. The stored `created_at`
    /// of an existing row is never changed.
    async fn upsert_document(&self, doc: &SourceDocument) -> Result<()>;

    async fn get_document(&self, external_id: i64) -> Result<Option<SourceDocument>>;

    /// Documents whose title or any category tag contains any of
    /// `keywords` (case-insensitive substring), most recently updated
    /// first, at most `limit` of them. Blank keywords are ignored; no
    /// usable keyword yields an empty result.
    async fn find_by_title_or_tags(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<SourceDocument>>;

    /// Documents that have not been chunked yet, oldest first.
    async fn documents_without_fragments(&self) -> Result<Vec<SourceDocument>>;

    /// Persist the fragments of one document atomically.
    ///
    /// Returns the number of fragments written. A document that already
    /// has fragments is left untouched and `0` is returned.
    async fn insert_fragments(&self, parent_id: i64, fragments: &[Fragment]) -> Result<usize>;

    /// Fragments of one document in `sequence_index` order.
    async fn fragments_for(&self, parent_id: i64) -> Result<Vec<Fragment>>;

    /// Fragments without an embedding from `model`, ordered by parent and
    /// sequence. Vectors cached by another model count as pending.
    async fn pending_fragments(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Fragment>>;

    /// Store the embedding of one fragment.
    async fn set_embedding(
        &self,
        parent_id: i64,
        sequence_index: i64,
        vector: &[f32],
        model: &str,
    ) -> Result<()>;

    async fn counts(&self) -> Result<StoreCounts>;
}

/// Trim, lower-case, and drop blank keywords.
pub fn normalize_keywords(keywords: &[String]) -> Vec<String> {
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .collect()
}

/// Lower-cased text that [`ContentStore::find_by_title_or_tags`] matches
/// keywords against: the title and each tag on its own line.
pub fn search_key(doc: &SourceDocument) -> String {
    let mut key = doc.title.to_lowercase();
    for tag in &doc.category_tags {
        key.push('\n');
        key.push_str(&tag.to_lowercase());
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_keywords() {
        let kws = vec![" Estoque ".to_string(), "".to_string(), "  ".to_string()];
        assert_eq!(normalize_keywords(&kws), vec!["estoque"]);
    }

    #[test]
    fn test_search_key_covers_title_and_tags() {
        let doc = SourceDocument::new(
            1,
            "Nota Fiscal",
            "",
            vec!["Fiscal".into(), "GESTÃO".into()],
        );
        let key = search_key(&doc);
        assert!(key.contains("nota fiscal"));
        assert!(key.contains("gestão"));
    }
}
