//! # Authenticated JSON Client
//!
//! Shared by the marketplace and ERP clients. Maps HTTP outcomes onto
//! `SyncError` so `RetryPolicy` can tell a rate limit from anything else.
//!
//! ```text
//! 2xx            → decode body as T (failure → Decode)
//! 429            → RateLimited
//! 401 / 403      → AuthFailure
//! other status   → Transport("<op>: HTTP <code>: <body excerpt>")
//! connect/timeout→ Transport
//! ```

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::auth::TokenProvider;
use crate::error::{SyncError, SyncResult};

/// Longest slice of an error body kept in a `Transport` message.
const BODY_EXCERPT_CHARS: usize = 200;

#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    tokens: Arc<dyn TokenProvider>,
}

impl ApiClient {
    /// ## Errors
    /// `SyncError::InvalidUrl` if `base` does not parse.
    pub fn new(
        http: reqwest::Client,
        base: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> SyncResult<Self> {
        Url::parse(base)?;
        Ok(ApiClient {
            http,
            base: base.trim_end_matches('/').to_string(),
            tokens,
        })
    }

    /// Builds the reqwest client with a per-request timeout.
    pub fn build_http(timeout: Duration) -> SyncResult<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to create HTTP client: {e}")))
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// GET `path` with a bearer token and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let url = Url::parse(&format!("{}{}", self.base, path))?;
        let token = self.tokens.access_token().await?;

        debug!(operation, %url, "GET");

        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .header(reqwest::header::ACCEPT, "application/json")
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::Transport(format!("{operation}: {e}")))?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SyncError::RateLimited {
                operation: operation.to_string(),
            });
        }

        if matches!(
            status,
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN
        ) {
            return Err(SyncError::AuthFailure(format!(
                "{operation}: HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SyncError::Transport(format!("{operation}: {e}")))?;

        if !status.is_success() {
            let text = String::from_utf8_lossy(&body);
            let excerpt: String = text.chars().take(BODY_EXCERPT_CHARS).collect();
            return Err(SyncError::Transport(format!(
                "{operation}: HTTP {}: {excerpt}",
                status.as_u16()
            )));
        }

        serde_json::from_slice(&body).map_err(|e| SyncError::Decode(format!("{operation}: {e}")))
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient").field("base", &self.base).finish()
    }
}
