//! Remote content capabilities.
//!
//! [`PageFetcher`] retrieves a web page as plain text for the knowledge
//! base builder; [`ArticleSource`] retrieves one article from the remote
//! knowledge-base API for the collect stage. Both are injected, so tests
//! supply in-process stubs instead of hitting the network.

use async_trait::async_trait;

use crate::error::FetchError;
use crate::models::Article;

/// Fetches a URL and returns its readable text.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

/// Fetches articles by their remote identifier.
///
/// An identifier the remote does not know must surface as
/// [`FetchError::NotFound`].
#[async_trait]
pub trait ArticleSource: Send + Sync {
    async fn fetch_article(&self, id: i64) -> Result<Article, FetchError>;
}
