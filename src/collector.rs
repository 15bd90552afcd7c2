//! Client for the remote knowledge-base article API.
//!
//! Articles are fetched one at a time with
//! `GET <base_url>/<id>?token=<token>`. A 404 means the ID does not exist
//! (or no longer exists) and is reported as [`FetchError::NotFound`].

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;

use kbroute_core::error::FetchError;
use kbroute_core::fetch::ArticleSource;
use kbroute_core::models::Article;

use crate::config::CollectorConfig;

pub struct ArticleApiClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl ArticleApiClient {
    pub fn new(base_url: &str, token: &str, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Build a client from config, reading the token from the environment.
    pub fn from_config(config: &CollectorConfig) -> Result<Self> {
        let token = match std::env::var(&config.token_env) {
            Ok(t) if !t.trim().is_empty() => t,
            _ => bail!("{} environment variable not set", config.token_env),
        };
        Self::new(&config.base_url, &token, config.timeout_secs)
    }

    fn article_url(&self, id: i64) -> String {
        format!("{}/{}", self.base_url, id)
    }
}

#[async_trait]
impl ArticleSource for ArticleApiClient {
    async fn fetch_article(&self, id: i64) -> Result<Article, FetchError> {
        let target = id.to_string();
        let resp = self
            .client
            .get(self.article_url(id))
            .query(&[("token", self.token.as_str())])
            .send()
            .await
            .map_err(|e| FetchError::Network {
                target: target.clone(),
                message: e.to_string(),
            })?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound { target });
        }
        if !status.is_success() {
            return Err(FetchError::Status {
                target,
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(|e| FetchError::Network {
            target: target.clone(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode {
            target,
            message: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_article_url() {
        let client = ArticleApiClient::new("https://kb.example.com/article/", "t", 5).unwrap();
        assert_eq!(
            client.article_url(551342),
            "https://kb.example.com/article/551342"
        );
    }

    #[test]
    fn test_missing_token_is_an_error() {
        let config = CollectorConfig {
            token_env: "KBR_TEST_TOKEN_THAT_IS_NEVER_SET".into(),
            ..CollectorConfig::default()
        };
        let err = ArticleApiClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("KBR_TEST_TOKEN_THAT_IS_NEVER_SET"));
    }
}
