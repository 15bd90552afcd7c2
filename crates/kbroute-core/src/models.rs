//! Core data models used throughout kbroute.
//!
//! These types represent the documents, fragments, and index entries that
//! flow through the ingestion and retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One externally sourced article, keyed by its remote identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDocument {
    pub external_id: i64,
    /// Menu/category labels, in the order the remote listed them.
    pub category_tags: Vec<String>,
    pub title: String,
    pub raw_content: String,
    /// Set on first ingestion, preserved by later upserts.
    pub created_at: DateTime<Utc>,
    /// Refreshed on every upsert.
    pub updated_at: DateTime<Utc>,
}

impl SourceDocument {
    pub fn new(
        external_id: i64,
        title: impl Into<String>,
        raw_content: impl Into<String>,
        category_tags: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            external_id,
            category_tags,
            title: title.into(),
            raw_content: raw_content.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Human-readable provenance used in index metadata and prompts.
    pub fn source_label(&self) -> String {
        format!("article {}: {}", self.external_id, self.title)
    }
}

/// A chunk of a document's content.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    /// `external_id` of the owning [`SourceDocument`].
    pub parent_id: i64,
    pub sequence_index: i64,
    pub clean_text: String,
    pub embedding: Option<Vec<f32>>,
    /// Model that produced `embedding`.
    pub embedding_model: Option<String>,
}

impl Fragment {
    /// Stable key for this fragment, unique across the store.
    pub fn key(&self) -> String {
        fragment_key(self.parent_id, self.sequence_index)
    }

    /// The cached vector, if it came from `model` and has `dims` entries.
    pub fn embedding_for(&self, model: &str, dims: usize) -> Option<&[f32]> {
        match (&self.embedding, &self.embedding_model) {
            (Some(v), Some(m)) if m == model && v.len() == dims => Some(v.as_slice()),
            _ => None,
        }
    }
}

pub fn fragment_key(parent_id: i64, sequence_index: i64) -> String {
    format!("{}#{}", parent_id, sequence_index)
}

/// Where an index entry's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Web,
    Database,
}

impl EntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryType::Web => "web",
            EntryType::Database => "database",
        }
    }
}

/// Provenance attached to every [`IndexEntry`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    pub source: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub category_tags: Vec<String>,
    /// `parent#sequence` for database fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fragment_key: Option<String>,
}

impl EntryMetadata {
    pub fn web(url: &str) -> Self {
        Self {
            source: url.to_string(),
            entry_type: EntryType::Web,
            title: None,
            category_tags: Vec::new(),
            fragment_key: None,
        }
    }

    pub fn database(doc: &SourceDocument, fragment: &Fragment) -> Self {
        Self {
            source: doc.source_label(),
            entry_type: EntryType::Database,
            title: Some(doc.title.clone()),
            category_tags: doc.category_tags.clone(),
            fragment_key: Some(fragment.key()),
        }
    }
}

/// The unit stored in the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: EntryMetadata,
}

/// An article as returned by the remote knowledge-base API.
///
/// Only the fields the collector stores are modelled; anything else in the
/// payload is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct Article {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "contentText", default)]
    pub content_text: Option<String>,
    #[serde(default)]
    pub categories: Vec<ArticleCategory>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArticleCategory {
    #[serde(default)]
    pub name: String,
}

impl Article {
    pub fn into_document(self) -> SourceDocument {
        let tags = self
            .categories
            .into_iter()
            .map(|c| c.name)
            .filter(|n| !n.trim().is_empty())
            .collect();
        SourceDocument::new(
            self.id,
            self.title,
            self.content_text.unwrap_or_default(),
            tags,
        )
    }
}
