//! Persistence of vector index artifacts.
//!
//! Each knowledge base is cached as `<cache_dir>/<cache_key>.kbix`. Saves
//! write a temporary file in the same directory and rename it over the
//! target, so readers only ever see a complete artifact.

use anyhow::{Context, Result};
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use kbroute_core::error::IndexLoadError;
use kbroute_core::index::VectorIndex;

pub const ARTIFACT_EXTENSION: &str = "kbix";

pub fn artifact_path(cache_dir: &Path, cache_key: &str) -> PathBuf {
    cache_dir.join(format!("{}.{}", cache_key, ARTIFACT_EXTENSION))
}

/// Atomically write `index` to `path`, creating parent directories.
pub async fn save_index(index: &VectorIndex, path: &Path) -> Result<()> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create cache directory: {}", dir.display()))?;

    let bytes = index.encode().context("Failed to encode index")?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "index".to_string());
    let tmp = dir.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    tokio::fs::write(&tmp, &bytes)
        .await
        .with_context(|| format!("Failed to write {}", tmp.display()))?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e).with_context(|| format!("Failed to move index into {}", path.display()));
    }
    Ok(())
}

/// Read and decode the artifact at `path`.
///
/// An index older than `ttl_secs` is reported as
/// [`IndexLoadError::Expired`]; a `ttl_secs` of `0` disables expiry.
pub async fn load_index(path: &Path, ttl_secs: u64) -> Result<VectorIndex, IndexLoadError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(IndexLoadError::Missing {
                path: path.display().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };

    let index = VectorIndex::decode(&bytes)?;

    if is_expired(&index, ttl_secs) {
        return Err(IndexLoadError::Expired {
            age_secs: age_secs(&index),
        });
    }
    Ok(index)
}

fn age_secs(index: &VectorIndex) -> u64 {
    (Utc::now() - index.created_at()).num_seconds().max(0) as u64
}

/// Whether `index` is older than `ttl_secs`. A `ttl_secs` of `0` never expires.
pub fn is_expired(index: &VectorIndex, ttl_secs: u64) -> bool {
    ttl_secs > 0 && age_secs(index) > ttl_secs
}
