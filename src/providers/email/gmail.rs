//! Gmail API provider implementation.
//!
//! Implements [`TokenRefresher`] and [`MailProvider`] over the Gmail REST API.
//!
//! # Authentication
//!
//! Gmail uses OAuth 2.0. This provider never stores tokens: the credential
//! manager hands it a refresh grant or an access token per call and owns
//! persistence of the results.
//!
//! # API Usage
//!
//! - `POST https://oauth2.googleapis.com/token` with `grant_type=refresh_token`
//! - `users.messages.send` for sending raw RFC 5322 messages

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::RETRY_AFTER;
use serde::{Deserialize, Serialize};

use super::{
    MailProvider, ProviderError, RefreshGrant, RefreshedToken, Result, SentMessage, TokenRefresher,
};
use crate::domain::{MessageId, ThreadId};

/// Default Gmail API base for the authenticated user.
pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Default Google OAuth token endpoint.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 3600;

/// OAuth token response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    raw: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    thread_id: String,
}

/// Endpoint and client settings for [`GmailProvider`].
#[derive(Clone)]
pub struct GmailConfig {
    /// Base URL of the Gmail user API, without a trailing slash.
    pub api_base: String,
    /// Token endpoint used when the grant does not name one.
    pub token_uri: String,
    /// OAuth client id used when the grant does not carry one.
    pub client_id: Option<String>,
    /// OAuth client secret used when the grant does not carry one.
    pub client_secret: Option<String>,
    /// Deadline for a token refresh request.
    pub refresh_timeout: Duration,
    /// Deadline for a send request.
    pub send_timeout: Duration,
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            api_base: GMAIL_API_BASE.to_string(),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
            client_id: None,
            client_secret: None,
            refresh_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(15),
        }
    }
}

impl std::fmt::Debug for GmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GmailConfig")
            .field("api_base", &self.api_base)
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("refresh_timeout", &self.refresh_timeout)
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}

/// Gmail API provider.
///
/// # Example
///
/// ```ignore
/// use reminder_relay::providers::email::{GmailConfig, GmailProvider, MailProvider};
///
/// let provider = GmailProvider::new(GmailConfig::default());
/// let sent = provider.send_raw(&access_token, &raw).await?;
/// ```
#[derive(Debug, Clone)]
pub struct GmailProvider {
    /// HTTP client for API requests.
    client: reqwest::Client,
    config: GmailConfig,
}

impl GmailProvider {
    /// Creates a provider with the given endpoint configuration.
    pub fn new(config: GmailConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Returns the provider configuration.
    pub fn config(&self) -> &GmailConfig {
        &self.config
    }

    fn send_url(&self) -> String {
        format!("{}/messages/send", self.config.api_base.trim_end_matches('/'))
    }

    /// Handles API error responses.
    async fn handle_error(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();

        classify_status(status.as_u16(), retry_after_secs, body)
    }
}

/// Maps an unsuccessful HTTP status to a provider error.
fn classify_status(status: u16, retry_after_secs: Option<u64>, body: String) -> ProviderError {
    match status {
        401 | 403 => ProviderError::Authentication(format!("unauthorized ({status}): {body}")),
        404 => ProviderError::NotFound(body),
        429 => ProviderError::RateLimited { retry_after_secs },
        500..=599 => ProviderError::Unavailable { status, body },
        _ => ProviderError::Provider(format!("API error ({status}): {body}")),
    }
}

fn transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Connection(e.to_string())
    }
}

#[async_trait]
impl TokenRefresher for GmailProvider {
    async fn refresh_grant(&self, grant: &RefreshGrant) -> Result<RefreshedToken> {
        let client_id = grant
            .client_id
            .as_deref()
            .or(self.config.client_id.as_deref())
            .ok_or_else(|| {
                ProviderError::InvalidRequest("no OAuth client id for refresh".to_string())
            })?;
        let client_secret = grant
            .client_secret
            .as_deref()
            .or(self.config.client_secret.as_deref())
            .unwrap_or_default();
        let token_uri = grant
            .token_uri
            .as_deref()
            .unwrap_or(self.config.token_uri.as_str());

        let params = [
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("refresh_token", grant.refresh_token.as_str()),
            ("grant_type", "refresh_token"),
        ];

        let response = self
            .client
            .post(token_uri)
            .timeout(self.config.refresh_timeout)
            .form(&params)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            // The token endpoint answers a revoked or unknown grant with 400.
            if status.is_client_error() && status.as_u16() != 429 {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Authentication(format!(
                    "token refresh failed ({status}): {body}"
                )));
            }
            return Err(Self::handle_error(response).await);
        }

        let token_response: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse token response: {e}")))?;

        if token_response.access_token.trim().is_empty() {
            return Err(ProviderError::Authentication(
                "token endpoint returned an empty access token".to_string(),
            ));
        }

        let lifetime = token_response
            .expires_in
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS)
            .max(0);
        let expires_at = chrono::Duration::try_seconds(lifetime)
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| {
                ProviderError::Internal(format!("token lifetime out of range: {lifetime}s"))
            })?;

        tracing::debug!(expires_in = lifetime, "access token refreshed via Google");
        Ok(RefreshedToken {
            access_token: token_response.access_token,
            expires_at,
            refresh_token: token_response
                .refresh_token
                .filter(|token| !token.trim().is_empty()),
            scopes: token_response
                .scope
                .map(|scope| scope.split_whitespace().map(str::to_owned).collect()),
        })
    }
}

#[async_trait]
impl MailProvider for GmailProvider {
    fn name(&self) -> &'static str {
        "gmail_api"
    }

    async fn send_raw(&self, access_token: &str, raw: &str) -> Result<SentMessage> {
        let response = self
            .client
            .post(self.send_url())
            .timeout(self.config.send_timeout)
            .bearer_auth(access_token)
            .json(&SendRequest { raw })
            .send()
            .await
            .map_err(transport_error)?;

        if !response.status().is_success() {
            return Err(Self::handle_error(response).await);
        }

        let sent: SendResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Internal(format!("parse send response: {e}")))?;

        if sent.id.trim().is_empty() {
            return Err(ProviderError::Provider(
                "send response carried no message id".to_string(),
            ));
        }

        tracing::info!(message_id = %sent.id, "Email sent via Gmail API");
        Ok(SentMessage {
            message_id: MessageId::from(sent.id),
            thread_id: ThreadId::from(sent.thread_id),
        })
    }
}
