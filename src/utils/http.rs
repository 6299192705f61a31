// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use crate::error::{AppError, Result};
use crate::models::WatcherConfig;

/// Create the shared asynchronous HTTP client.
pub fn create_async_client(config: &WatcherConfig) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// Fetch a page body as text, treating non-2xx statuses as errors.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| AppError::fetch(url, describe(&e)))?;
    let response = response
        .error_for_status()
        .map_err(|e| AppError::fetch(url, describe(&e)))?;
    let text = response
        .text()
        .await
        .map_err(|e| AppError::fetch(url, describe(&e)))?;
    Ok(text)
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "timed out".to_string()
    } else if let Some(status) = e.status() {
        format!("HTTP {status}")
    } else {
        e.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_builds_from_defaults() {
        let config = WatcherConfig::default();
        assert!(create_async_client(&config).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_fetch_error() {
        let config = WatcherConfig {
            timeout_secs: 2,
            ..WatcherConfig::default()
        };
        let client = create_async_client(&config).unwrap();
        let err = fetch_text(&client, "http://127.0.0.1:1/").await.unwrap_err();
        assert!(matches!(err, AppError::Fetch { .. }));
    }
}
