//! In-memory [`ContentStore`] implementation for tests.
//!
//! Uses `BTreeMap` behind `std::sync::RwLock`. Keyword matching scans every
//! document; fine for the handful of rows tests create.

use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;

use crate::models::{Fragment, SourceDocument};

use super::{normalize_keywords, search_key, ContentStore, StoreCounts};

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryContentStore {
    docs: RwLock<BTreeMap<i64, SourceDocument>>,
    fragments: RwLock<BTreeMap<(i64, i64), Fragment>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn upsert_document(&self, doc: &SourceDocument) -> Result<()> {
        let mut docs = self.docs.write().unwrap_or_else(PoisonError::into_inner);
        let now = Utc::now();
        match docs.get_mut(&doc.external_id) {
            Some(existing) => {
                existing.title = doc.title.clone();
                existing.raw_content = doc.raw_content.clone();
                existing.category_tags = doc.category_tags.clone();
                existing.updated_at = now;
            }
            None => {
                let mut stored = doc.clone();
                stored.updated_at = now;
                docs.insert(doc.external_id, stored);
            }
        }
        Ok(())
    }

    async fn get_document(&self, external_id: i64) -> Result<Option<SourceDocument>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        Ok(docs.get(&external_id).cloned())
    }

    async fn find_by_title_or_tags(
        &self,
        keywords: &[String],
        limit: usize,
    ) -> Result<Vec<SourceDocument>> {
        let keywords = normalize_keywords(keywords);
        if keywords.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let mut matched: Vec<SourceDocument> = docs
            .values()
            .filter(|d| {
                let key = search_key(d);
                keywords.iter().any(|k| key.contains(k.as_str()))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then(a.external_id.cmp(&b.external_id))
        });
        matched.truncate(limit);
        Ok(matched)
    }

    async fn documents_without_fragments(&self) -> Result<Vec<SourceDocument>> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let fragments = self.fragments.read().unwrap_or_else(PoisonError::into_inner);
        let mut pending: Vec<SourceDocument> = docs
            .values()
            .filter(|d| {
                fragments
                    .range((d.external_id, i64::MIN)..=(d.external_id, i64::MAX))
                    .next()
                    .is_none()
            })
            .cloned()
            .collect();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.external_id.cmp(&b.external_id))
        });
        Ok(pending)
    }

    async fn insert_fragments(&self, parent_id: i64, new: &[Fragment]) -> Result<usize> {
        let mut fragments = self.fragments.write().unwrap_or_else(PoisonError::into_inner);
        if fragments
            .range((parent_id, i64::MIN)..=(parent_id, i64::MAX))
            .next()
            .is_some()
        {
            return Ok(0);
        }
        for f in new {
            let mut stored = f.clone();
            stored.parent_id = parent_id;
            fragments.insert((parent_id, f.sequence_index), stored);
        }
        Ok(new.len())
    }

    async fn fragments_for(&self, parent_id: i64) -> Result<Vec<Fragment>> {
        let fragments = self.fragments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(fragments
            .range((parent_id, i64::MIN)..=(parent_id, i64::MAX))
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn pending_fragments(
        &self,
        model: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Fragment>> {
        let fragments = self.fragments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(fragments
            .values()
            .filter(|f| f.embedding.is_none() || f.embedding_model.as_deref() != Some(model))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn set_embedding(
        &self,
        parent_id: i64,
        sequence_index: i64,
        vector: &[f32],
        model: &str,
    ) -> Result<()> {
        let mut fragments = self.fragments.write().unwrap_or_else(PoisonError::into_inner);
        match fragments.get_mut(&(parent_id, sequence_index)) {
            Some(f) => {
                f.embedding = Some(vector.to_vec());
                f.embedding_model = Some(model.to_string());
                Ok(())
            }
            None => anyhow::bail!("no fragment {}#{}", parent_id, sequence_index),
        }
    }

    async fn counts(&self) -> Result<StoreCounts> {
        let docs = self.docs.read().unwrap_or_else(PoisonError::into_inner);
        let fragments = self.fragments.read().unwrap_or_else(PoisonError::into_inner);
        Ok(StoreCounts {
            documents: docs.len() as i64,
            fragments: fragments.len() as i64,
            embedded: fragments.values().filter(|f| f.embedding.is_some()).count() as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragment(parent: i64, seq: i64, text: &str) -> Fragment {
        Fragment {
            parent_id: parent,
            sequence_index: seq,
            clean_text: text.to_string(),
            embedding: None,
            embedding_model: None,
        }
    }

    #[tokio::test]
    async fn test_upsert_updates_in_place() {
        let store = InMemoryContentStore::new();
        let first = SourceDocument::new(1, "Old", "a", vec![]);
        store.upsert_document(&first).await.unwrap();
        let created = store.get_document(1).await.unwrap().unwrap().created_at;

        let second = SourceDocument::new(1, "New", "b", vec!["Tag".into()]);
        store.upsert_document(&second).await.unwrap();

        let doc = store.get_document(1).await.unwrap().unwrap();
        assert_eq!(doc.title, "New");
        assert_eq!(doc.raw_content, "b");
        assert_eq!(doc.created_at, created);
        assert_eq!(store.counts().await.unwrap().documents, 1);
    }

    #[tokio::test]
    async fn test_keyword_match_title_or_tags() {
        let store = InMemoryContentStore::new();
        store
            .upsert_document(&SourceDocument::new(1, "Controle de Estoque", "", vec![]))
            .await
            .unwrap();
        store
            .upsert_document(&SourceDocument::new(2, "Recursos Humanos", "", vec![]))
            .await
            .unwrap();
        store
            .upsert_document(&SourceDocument::new(3, "Ajustes", "", vec!["ESTOQUE".into()]))
            .await
            .unwrap();

        let found = store
            .find_by_title_or_tags(&["estoque".to_string()], 50)
            .await
            .unwrap();
        let mut ids: Vec<i64> = found.iter().map(|d| d.external_id).collect();
        ids.sort();
        assert_eq!(ids, vec![1, 3]);

        assert!(store
            .find_by_title_or_tags(&["  ".to_string()], 50)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_insert_fragments_only_once() {
        let store = InMemoryContentStore::new();
        store
            .upsert_document(&SourceDocument::new(5, "Doc", "text", vec![]))
            .await
            .unwrap();
        assert_eq!(store.documents_without_fragments().await.unwrap().len(), 1);

        let frags = vec![fragment(5, 0, "a"), fragment(5, 1, "b")];
        assert_eq!(store.insert_fragments(5, &frags).await.unwrap(), 2);
        assert_eq!(store.insert_fragments(5, &frags).await.unwrap(), 0);
        assert!(store.documents_without_fragments().await.unwrap().is_empty());
        assert_eq!(store.fragments_for(5).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_set_embedding_clears_pending() {
        let store = InMemoryContentStore::new();
        store
            .insert_fragments(9, &[fragment(9, 0, "a"), fragment(9, 1, "b")])
            .await
            .unwrap();
        assert_eq!(store.pending_fragments("m", None).await.unwrap().len(), 2);
        assert_eq!(store.pending_fragments("m", Some(1)).await.unwrap().len(), 1);

        store.set_embedding(9, 0, &[1.0, 0.0], "m").await.unwrap();
        let pending = store.pending_fragments("m", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sequence_index, 1);

        let counts = store.counts().await.unwrap();
        assert_eq!(counts.embedded, 1);
        assert_eq!(counts.pending(), 1);
        assert!(store.set_embedding(9, 7, &[1.0], "m").await.is_err());
    }

    #[tokio::test]
    async fn test_vectors_from_another_model_are_pending() {
        let store = InMemoryContentStore::new();
        store
            .insert_fragments(4, &[fragment(4, 0, "a"), fragment(4, 1, "b")])
            .await
            .unwrap();
        store.set_embedding(4, 0, &[1.0, 0.0], "old").await.unwrap();
        store.set_embedding(4, 1, &[0.0, 1.0], "new").await.unwrap();

        let pending = store.pending_fragments("new", None).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sequence_index, 0);
        assert_eq!(pending[0].embedding_model.as_deref(), Some("old"));
        assert!(pending[0].embedding_for("new", 2).is_none());
        assert!(pending[0].embedding_for("old", 2).is_some());
    }
}
