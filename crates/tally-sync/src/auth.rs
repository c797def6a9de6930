//! # Token Providers
//!
//! Bearer tokens for the marketplace and ERP APIs.
//!
//! ## Refresh Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Marketplace OAuth Refresh                          │
//! │                                                                         │
//! │  ┌────────────────┐                         ┌─────────────────────┐    │
//! │  │  tally-sync    │                         │  Token endpoint     │    │
//! │  └───────┬────────┘                         └──────────┬──────────┘    │
//! │          │  POST {grant_type: refresh_token,           │               │
//! │          │        client_id, client_secret,            │               │
//! │          │        refresh_token}                       │               │
//! │          │────────────────────────────────────────────►│               │
//! │          │  {access_token, expires_in, refresh_token}  │               │
//! │          │◄────────────────────────────────────────────│               │
//! │          │                                              │               │
//! │  Cached until 5 minutes before expiry. A rotated refresh token         │
//! │  replaces the configured one for later refreshes.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! No retries here: a failed refresh aborts the cycle.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

/// Margin before token expiration to trigger refresh (5 minutes)
const REFRESH_MARGIN_SECS: u64 = 300;

/// Lifetime assumed when the endpoint omits `expires_in` (6 hours).
const DEFAULT_EXPIRES_IN_SECS: u64 = 21_600;

/// Source of bearer tokens for one API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token valid for at least the next request.
    async fn access_token(&self) -> SyncResult<String>;
}

// =============================================================================
// Static Token
// =============================================================================

/// A token issued out of band, such as the ERP bearer token.
#[derive(Debug, Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        StaticTokenProvider {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn access_token(&self) -> SyncResult<String> {
        if self.token.trim().is_empty() {
            return Err(SyncError::AuthFailure("no access token configured".into()));
        }
        Ok(self.token.clone())
    }
}

// =============================================================================
// Refresh Token
// =============================================================================

/// Token information stored after a refresh.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub access_token: String,
    /// When the access token expires (local time)
    pub expires_at: Instant,
    pub refresh_token: String,
}

impl TokenInfo {
    /// Check if the token is expired or about to expire
    pub fn needs_refresh(&self) -> bool {
        Instant::now() + Duration::from_secs(REFRESH_MARGIN_SECS) >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    pub fn remaining_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    client_id: &'a str,
    client_secret: &'a str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// OAuth `refresh_token` grant against the marketplace token endpoint.
pub struct RefreshTokenProvider {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    token: Arc<RwLock<Option<TokenInfo>>>,
}

impl RefreshTokenProvider {
    pub fn new(
        http: reqwest::Client,
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        RefreshTokenProvider {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            token: Arc::new(RwLock::new(None)),
        }
    }

    async fn do_refresh(&self, refresh_token: &str) -> SyncResult<TokenInfo> {
        debug!(url = %self.token_url, "Refreshing marketplace access token");

        let response = self
            .http
            .post(&self.token_url)
            .json(&RefreshRequest {
                grant_type: "refresh_token",
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                refresh_token,
            })
            .send()
            .await
            .map_err(|e| SyncError::AuthFailure(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::AuthFailure(format!(
                "token endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| SyncError::AuthFailure(format!("malformed token response: {e}")))?;

        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN_SECS);

        Ok(TokenInfo {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(expires_in),
            refresh_token: body
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
        })
    }
}

#[async_trait]
impl TokenProvider for RefreshTokenProvider {
    async fn access_token(&self) -> SyncResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if !token.needs_refresh() {
                    debug!(remaining_secs = token.remaining_secs(), "Using cached token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;

        // Double-check after acquiring write lock
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
        }

        let refresh_token = guard
            .as_ref()
            .map(|t| t.refresh_token.clone())
            .unwrap_or_else(|| self.refresh_token.clone());

        let token = self.do_refresh(&refresh_token).await?;
        info!(
            expires_in_secs = token.remaining_secs(),
            "Marketplace access token refreshed"
        );

        let access_token = token.access_token.clone();
        *guard = Some(token);
        Ok(access_token)
    }
}
