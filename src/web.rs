//! HTTP page fetching for knowledge base builds.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use kbroute_core::error::FetchError;
use kbroute_core::fetch::PageFetcher;

/// Line width used when rendering HTML to text.
const TEXT_WIDTH: usize = 120;

/// Fetches pages over HTTP and renders HTML bodies as plain text.
pub struct HttpPageFetcher {
    client: reqwest::Client,
}

impl HttpPageFetcher {
    pub fn new(timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(concat!("kbroute/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client })
    }
}

/// Convert a response body to text based on its content type.
fn page_text(content_type: &str, body: &[u8]) -> String {
    if content_type.contains("html") {
        html2text::from_read(body, TEXT_WIDTH)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).to_string())
    } else {
        String::from_utf8_lossy(body).to_string()
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchError::Network {
                target: url.to_string(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound {
                target: url.to_string(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                target: url.to_string(),
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string();

        let body = resp.bytes().await.map_err(|e| FetchError::Network {
            target: url.to_string(),
            message: e.to_string(),
        })?;

        Ok(page_text(&content_type, &body))
    }
}
