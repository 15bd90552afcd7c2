//! Brute-force cosine vector index with a versioned binary encoding.
//!
//! The index holds [`IndexEntry`] values in insertion order and answers
//! top-k queries by scoring every entry. It is append-only: adding an entry
//! twice stores it twice.
//!
//! # Encoding
//!
//! ```text
//! +--------+-------------+------------------+----------------+----------------------+
//! | "KBIX" | version u32 | manifest_len u64 | manifest JSON  | count × dims × f32   |
//! +--------+-------------+------------------+----------------+----------------------+
//! ```
//!
//! Integers and floats are little-endian. The manifest carries the
//! dimensionality, model name, creation time, entry texts and metadata, and
//! the SHA-256 of the vector payload, which is verified on decode so a
//! truncated or tampered artifact is rejected as corrupt.
//!
//! Reading and writing files is the caller's job; this module only turns an
//! index into bytes and back.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use crate::error::{DimensionMismatch, IndexLoadError};
use crate::models::{EntryMetadata, EntryType, IndexEntry};

pub const MAGIC: &[u8; 4] = b"KBIX";
pub const FORMAT_VERSION: u32 = 1;

const HEADER_LEN: usize = 4 + 4 + 8;

#[derive(Serialize, Deserialize)]
struct Manifest {
    dims: usize,
    model: String,
    created_at: DateTime<Utc>,
    vectors_sha256: String,
    entries: Vec<ManifestEntry>,
}

#[derive(Serialize, Deserialize)]
struct ManifestEntry {
    text: String,
    metadata: EntryMetadata,
}

/// In-memory vector index.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    dims: usize,
    model: String,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
    fragment_keys: HashSet<String>,
}

impl VectorIndex {
    pub fn new(dims: usize, model: impl Into<String>) -> Self {
        Self {
            dims,
            model: model.into(),
            created_at: Utc::now(),
            entries: Vec::new(),
            fragment_keys: HashSet::new(),
        }
    }

    /// Override the build timestamp.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// When the index was first built. Preserved across encode/decode.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Append entries in order.
    ///
    /// Either every entry is added or none is: a vector whose length differs
    /// from the index dimensionality rejects the whole batch.
    pub fn add(&mut self, entries: Vec<IndexEntry>) -> Result<usize, DimensionMismatch> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != self.dims) {
            return Err(DimensionMismatch {
                expected: self.dims,
                found: bad.vector.len(),
            });
        }
        let added = entries.len();
        for entry in entries {
            if let Some(key) = &entry.metadata.fragment_key {
                self.fragment_keys.insert(key.clone());
            }
            self.entries.push(entry);
        }
        Ok(added)
    }

    /// Return up to `k` entries ranked by descending cosine similarity to
    /// `vector`. Equal scores keep insertion order.
    ///
    /// A query vector of the wrong dimensionality matches nothing.
    pub fn query(&self, vector: &[f32], k: usize) -> Vec<(&IndexEntry, f32)> {
        if k == 0 || vector.len() != self.dims {
            return Vec::new();
        }
        let mut scored: Vec<(&IndexEntry, f32)> = self
            .entries
            .iter()
            .map(|e| (e, cosine_similarity(vector, &e.vector)))
            .collect();
        // sort_by is stable, so ties stay in insertion order.
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);
        scored
    }

    pub fn has_entry_type(&self, entry_type: EntryType) -> bool {
        self.entries
            .iter()
            .any(|e| e.metadata.entry_type == entry_type)
    }

    /// True when the index mixes web pages and database fragments.
    pub fn is_hybrid(&self) -> bool {
        self.has_entry_type(EntryType::Web) && self.has_entry_type(EntryType::Database)
    }

    /// Whether a database fragment with this key has already been indexed.
    pub fn contains_fragment(&self, key: &str) -> bool {
        self.fragment_keys.contains(key)
    }

    /// Serialize the index into the `KBIX` binary format.
    pub fn encode(&self) -> serde_json::Result<Vec<u8>> {
        let mut payload = Vec::with_capacity(self.entries.len() * self.dims * 4);
        for entry in &self.entries {
            payload.extend_from_slice(&vec_to_blob(&entry.vector));
        }

        let manifest = Manifest {
            dims: self.dims,
            model: self.model.clone(),
            created_at: self.created_at,
            vectors_sha256: format!("{:x}", Sha256::digest(&payload)),
            entries: self
                .entries
                .iter()
                .map(|e| ManifestEntry {
                    text: e.text.clone(),
                    metadata: e.metadata.clone(),
                })
                .collect(),
        };
        let manifest_json = serde_json::to_vec(&manifest)?;

        let mut out = Vec::with_capacity(HEADER_LEN + manifest_json.len() + payload.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        out.extend_from_slice(&(manifest_json.len() as u64).to_le_bytes());
        out.extend_from_slice(&manifest_json);
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse bytes produced by [`VectorIndex::encode`].
    pub fn decode(bytes: &[u8]) -> Result<Self, IndexLoadError> {
        if bytes.len() < HEADER_LEN {
            return Err(IndexLoadError::corrupt("artifact shorter than header"));
        }
        if &bytes[0..4] != MAGIC {
            return Err(IndexLoadError::corrupt("bad magic bytes"));
        }

        let version = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != FORMAT_VERSION {
            return Err(IndexLoadError::UnsupportedVersion {
                found: version,
                expected: FORMAT_VERSION,
            });
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&bytes[8..16]);
        let manifest_len = usize::try_from(u64::from_le_bytes(len_bytes))
            .map_err(|_| IndexLoadError::corrupt("manifest length overflows"))?;
        let manifest_end = HEADER_LEN
            .checked_add(manifest_len)
            .filter(|end| *end <= bytes.len())
            .ok_or_else(|| IndexLoadError::corrupt("manifest extends past end of artifact"))?;

        let manifest: Manifest = serde_json::from_slice(&bytes[HEADER_LEN..manifest_end])
            .map_err(|e| IndexLoadError::corrupt(format!("invalid manifest: {}", e)))?;

        let payload = &bytes[manifest_end..];
        let expected_payload = manifest
            .entries
            .len()
            .checked_mul(manifest.dims)
            .and_then(|n| n.checked_mul(4))
            .ok_or_else(|| IndexLoadError::corrupt("vector payload size overflows"))?;
        if payload.len() != expected_payload {
            return Err(IndexLoadError::corrupt(format!(
                "vector payload is {} bytes, expected {}",
                payload.len(),
                expected_payload
            )));
        }
        if format!("{:x}", Sha256::digest(payload)) != manifest.vectors_sha256 {
            return Err(IndexLoadError::corrupt("vector payload checksum mismatch"));
        }

        let mut index = VectorIndex {
            dims: manifest.dims,
            model: manifest.model,
            created_at: manifest.created_at,
            entries: Vec::with_capacity(manifest.entries.len()),
            fragment_keys: HashSet::new(),
        };

        let stride = manifest.dims * 4;
        let entries = manifest
            .entries
            .into_iter()
            .enumerate()
            .map(|(i, e)| IndexEntry {
                vector: blob_to_vec(&payload[i * stride..(i + 1) * stride]),
                text: e.text,
                metadata: e.metadata,
            })
            .collect();
        index
            .add(entries)
            .map_err(|e| IndexLoadError::corrupt(e.to_string()))?;
        Ok(index)
    }
}
