//! Mail provider trait definitions.
//!
//! The dispatch pipeline reaches the outside world through two narrow
//! capabilities: [`TokenRefresher`] exchanges a refresh token for a new access
//! token, and [`MailProvider`] submits an already encoded message. Both are
//! implemented by [`GmailProvider`](super::GmailProvider) and faked in tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MessageId, ThreadId};

/// Result type alias for mail provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Errors that can occur during mail provider operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The grant was rejected or has been revoked.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Network or connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The request did not complete within its deadline.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        /// Seconds to wait before retrying, if known.
        retry_after_secs: Option<u64>,
    },

    /// Requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request or parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The provider reported a server-side failure.
    #[error("provider unavailable ({status}): {body}")]
    Unavailable {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Provider-specific error.
    #[error("provider error: {0}")]
    Provider(String),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ProviderError {
    /// Returns true for failures that may succeed if tried again later.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProviderError::Connection(_)
                | ProviderError::Timeout(_)
                | ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. }
        )
    }

    /// Returns true when the provider rejected the authorization itself.
    pub fn is_authentication(&self) -> bool {
        matches!(self, ProviderError::Authentication(_))
    }
}

/// Everything needed to exchange a refresh token at the token endpoint.
///
/// Fields other than `refresh_token` come from the stored record when it has
/// them; the provider fills gaps from its own configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshGrant {
    /// Long-lived refresh token.
    pub refresh_token: String,
    /// OAuth client id recorded with the grant.
    pub client_id: Option<String>,
    /// OAuth client secret recorded with the grant.
    pub client_secret: Option<String>,
    /// Token endpoint recorded with the grant.
    pub token_uri: Option<String>,
}

impl std::fmt::Debug for RefreshGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshGrant")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_uri", &self.token_uri)
            .finish()
    }
}

impl RefreshGrant {
    /// Creates a grant carrying only a refresh token.
    pub fn new(refresh_token: impl Into<String>) -> Self {
        Self {
            refresh_token: refresh_token.into(),
            client_id: None,
            client_secret: None,
            token_uri: None,
        }
    }
}

/// Result of a successful refresh exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    /// Newly minted access token.
    pub access_token: String,
    /// When the new access token expires.
    pub expires_at: DateTime<Utc>,
    /// Replacement refresh token, if the provider rotated it.
    pub refresh_token: Option<String>,
    /// Scopes of the new token, if the provider reported them.
    pub scopes: Option<Vec<String>>,
}

impl std::fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Identifiers the provider assigned to a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    /// Provider message id.
    pub message_id: MessageId,
    /// Provider thread id.
    pub thread_id: ThreadId,
}

/// Exchanges refresh tokens for new access tokens.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Performs one refresh exchange against the token endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Authentication`] when the refresh token is
    /// rejected, or a transport error when the endpoint cannot be reached.
    async fn refresh_grant(&self, grant: &RefreshGrant) -> Result<RefreshedToken>;
}

/// Submits encoded messages for delivery.
///
/// # Example
///
/// ```ignore
/// use reminder_relay::providers::email::{encode_raw_message, MailProvider};
///
/// async fn deliver(provider: &dyn MailProvider, token: &str, message: &OutboundMessage) {
///     let raw = encode_raw_message(message, "reminders@example.com").unwrap();
///     let sent = provider.send_raw(token, &raw).await.unwrap();
///     println!("delivered as {}", sent.message_id);
/// }
/// ```
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Short provider name recorded in responses, e.g. `gmail_api`.
    fn name(&self) -> &'static str;

    /// Sends a base64url-encoded RFC 5322 message using `access_token`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Authentication`] when the token is rejected
    /// at send time. Other variants describe transport or provider failures.
    async fn send_raw(&self, access_token: &str, raw: &str) -> Result<SentMessage>;
}
