// src/services/fetcher.rs

//! Page retrieval.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::WatcherConfig;
use crate::utils::http::{create_async_client, fetch_text};

/// Something that can return the markup behind a URL.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch `url`; transport failures, timeouts and non-2xx statuses are errors.
    async fn fetch(&self, url: &str) -> Result<String>;
}

/// [`PageSource`] over one shared `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &WatcherConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl PageSource for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        fetch_text(&self.client, url).await
    }
}
