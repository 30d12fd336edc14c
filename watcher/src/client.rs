//! HTTP client for the node's balance endpoint

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::debug;
use url::Url;

use crate::{types::BalanceSnapshot, Result, WatcherError};

/// Path of the balance endpoint relative to the node API base URL
pub const BALANCES_PATH: &str = "api/v3/account/balances";

/// Header carrying the node API token
pub const AUTH_HEADER: &str = "x-auth-token";

/// Which node to ask and how to authenticate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeTarget {
    pub api_endpoint: String,
    pub api_token: Option<String>,
}

impl NodeTarget {
    pub fn new<S: Into<String>>(api_endpoint: S, api_token: Option<String>) -> Self {
        Self {
            api_endpoint: api_endpoint.into(),
            api_token,
        }
    }

    /// Full URL of the balance endpoint
    pub fn balances_url(&self) -> Result<Url> {
        let base = if self.api_endpoint.ends_with('/') {
            Url::parse(&self.api_endpoint)?
        } else {
            Url::parse(&format!("{}/", self.api_endpoint))?
        };
        Ok(base.join(BALANCES_PATH)?)
    }
}

/// Source of node and Safe balances
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BalanceApi: Send + Sync {
    /// Fetch the current balances of the target node and its Safe
    async fn get_balances(&self, target: &NodeTarget) -> Result<BalanceSnapshot>;
}

/// `reqwest` implementation of [`BalanceApi`]
#[derive(Debug, Clone)]
pub struct NodeApiClient {
    http: Client,
}

impl NodeApiClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl BalanceApi for NodeApiClient {
    async fn get_balances(&self, target: &NodeTarget) -> Result<BalanceSnapshot> {
        let url = target.balances_url()?;
        let started = Instant::now();

        let mut request = self.http.get(url.clone());
        if let Some(token) = &target.api_token {
            request = request.header(AUTH_HEADER, token);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        debug!(
            url = %url,
            status = status.as_u16(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Balance request completed"
        );

        if !status.is_success() {
            return Err(WatcherError::node_api(status.as_u16(), error_message(&body)));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

/// Pull the node's `status`/`error` field out of an error body, or fall back to the raw text
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            ["error", "status"]
                .iter()
                .find_map(|key| value.get(*key).and_then(|v| v.as_str()).map(str::to_string))
        })
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balances_url() {
        let target = NodeTarget::new("http://localhost:3001", None);
        assert_eq!(
            target.balances_url().unwrap().as_str(),
            "http://localhost:3001/api/v3/account/balances"
        );

        let target = NodeTarget::new("https://node.example.org/", Some("secret".to_string()));
        assert_eq!(
            target.balances_url().unwrap().as_str(),
            "https://node.example.org/api/v3/account/balances"
        );
    }

    #[test]
    fn test_balances_url_rejects_garbage() {
        let target = NodeTarget::new("localhost without scheme", None);
        assert!(target.balances_url().is_err());
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(r#"{"status":"INVALID_TOKEN"}"#), "INVALID_TOKEN");
        assert_eq!(error_message(r#"{"status":"UNKNOWN_FAILURE","error":"db locked"}"#), "db locked");
        assert_eq!(error_message("  Bad Gateway \n"), "Bad Gateway");
    }
}
