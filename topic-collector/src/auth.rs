use crate::fetcher::{FetchRequest, Fetcher};
use crate::types::{CollectorError, Result};
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::{debug, info};

const REFRESH_MARGIN: Duration = Duration::from_secs(60);
/// Longer advertised lifetimes are clamped to this.
const MAX_TOKEN_LIFETIME: Duration = Duration::from_secs(24 * 3600);

#[derive(Debug, Clone)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Debug, Clone)]
struct BearerToken {
    value: String,
    refresh_at: Instant,
}

/// Client-credentials token holder. Tokens are reused until a minute before expiry.
pub struct TokenProvider {
    fetcher: Fetcher,
    token_url: String,
    credentials: ClientCredentials,
    cached: AsyncMutex<Option<BearerToken>>,
}

impl TokenProvider {
    pub fn new(fetcher: Fetcher, token_url: impl Into<String>, credentials: ClientCredentials) -> Self {
        Self {
            fetcher,
            token_url: token_url.into(),
            credentials,
            cached: AsyncMutex::new(None),
        }
    }

    pub fn user_agent(&self) -> &str {
        &self.credentials.user_agent
    }

    pub async fn bearer(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.value.clone());
            }
            debug!(token_url = %self.token_url, "Bearer token due for refresh");
        }

        let request = FetchRequest::post_form(
            &self.token_url,
            vec![("grant_type".to_string(), "client_credentials".to_string())],
        )
        .basic_auth(&self.credentials.client_id, &self.credentials.client_secret)
        .header("User-Agent", &self.credentials.user_agent);

        let response: TokenResponse = self.fetcher.fetch_json(&request).await?;
        if response.access_token.is_empty() {
            return Err(CollectorError::Parse("token endpoint returned an empty access token".to_string()));
        }

        let lifetime = Duration::from_secs(response.expires_in).min(MAX_TOKEN_LIFETIME);
        let token = BearerToken {
            value: response.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(REFRESH_MARGIN),
        };
        info!(token_url = %self.token_url, expires_in = response.expires_in, "Acquired bearer token");
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}
