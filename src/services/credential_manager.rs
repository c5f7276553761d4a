//! Credential lifecycle management.
//!
//! The [`CredentialManager`] turns whatever is in the credential store into a
//! usable access token: it validates the record, refreshes it through the
//! provider when it has expired, and writes the refreshed record back before
//! handing it out.
//!
//! # Concurrency
//!
//! Every acquisition runs under a single async mutex. The store is re-read
//! after the lock is taken, so a caller that waited behind a refresh sees the
//! refreshed record and does not refresh again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;

use crate::domain::{Credential, CredentialDefect, GMAIL_SEND_SCOPE};
use crate::providers::email::{RefreshGrant, RefreshedToken, TokenRefresher};
use crate::storage::{CredentialStore, StoreError};

/// Default deadline for a refresh exchange.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Default margin before expiry at which a token is treated as expired.
pub const DEFAULT_EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// Why no usable credential could be produced.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// No usable credential exists; the user must authorize again.
    #[error("authorization required: {0}")]
    AuthRequired(String),

    /// The credential record could not be read or written.
    #[error("credential store error: {0}")]
    Store(#[source] StoreError),
}

impl CredentialError {
    /// Returns true when external re-authorization is the only remedy.
    pub fn is_auth_required(&self) -> bool {
        matches!(self, CredentialError::AuthRequired(_))
    }
}

/// Snapshot of the stored credential, computed without network access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CredentialState {
    /// Nothing has been stored yet.
    Absent,
    /// A record exists but cannot be used.
    Malformed {
        /// Decoder or validation message.
        reason: String,
    },
    /// The grant lacks scopes the relay needs.
    ScopeMismatch {
        /// Required scopes that were not granted.
        missing: Vec<String>,
    },
    /// The access token is usable now.
    Valid {
        /// Expiry of the access token, when known.
        expires_at: Option<DateTime<Utc>>,
    },
    /// The access token has expired.
    Expired {
        /// Whether a refresh token is available.
        refreshable: bool,
    },
    /// The store itself could not be read.
    Unreadable {
        /// Underlying error.
        reason: String,
    },
}

impl CredentialState {
    /// Returns true when a send could obtain a token without re-authorization.
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            CredentialState::Valid { .. } | CredentialState::Expired { refreshable: true }
        )
    }
}

/// Loads, validates, refreshes, and persists the delegated credential.
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    required_scopes: BTreeSet<String>,
    refresh_timeout: Duration,
    expiry_skew: Duration,
    /// Last credential handed out; cleared whenever acquisition fails.
    cache: Mutex<Option<Credential>>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("store", &self.store.location())
            .field("required_scopes", &self.required_scopes)
            .field("refresh_timeout", &self.refresh_timeout)
            .field("expiry_skew", &self.expiry_skew)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// Creates a manager that requires the Gmail send scope.
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            required_scopes: BTreeSet::from([GMAIL_SEND_SCOPE.to_string()]),
            refresh_timeout: DEFAULT_REFRESH_TIMEOUT,
            expiry_skew: DEFAULT_EXPIRY_SKEW,
            cache: Mutex::new(None),
        }
    }

    /// Replaces the set of scopes a credential must carry.
    pub fn with_required_scopes(
        mut self,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.required_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the deadline for a refresh exchange.
    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Sets how long before expiry a token is already treated as expired.
    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    /// Returns the credential store.
    pub fn store(&self) -> &Arc<dyn CredentialStore> {
        &self.store
    }

    /// Returns the scopes a usable credential must carry.
    pub fn required_scopes(&self) -> &BTreeSet<String> {
        &self.required_scopes
    }

    /// Returns the credential handed out by the last successful acquisition.
    pub async fn cached(&self) -> Option<Credential> {
        self.cache.lock().await.clone()
    }

    /// Returns a credential that can be presented to the provider now.
    ///
    /// # Errors
    ///
    /// [`CredentialError::AuthRequired`] when nothing is stored, the record is
    /// unusable, or it expired and could not be refreshed.
    /// [`CredentialError::Store`] when the store cannot be read or the
    /// refreshed record cannot be written.
    pub async fn acquire_usable(&self) -> Result<Credential, CredentialError> {
        let mut cache = self.cache.lock().await;

        match self.acquire_locked().await {
            Ok(credential) => {
                *cache = Some(credential.clone());
                Ok(credential)
            }
            Err(e) => {
                *cache = None;
                tracing::warn!(error = %e, store = %self.store.location(), "no usable credential");
                Err(e)
            }
        }
    }

    async fn acquire_locked(&self) -> Result<Credential, CredentialError> {
        let credential = match self.store.load().await {
            Ok(Some(credential)) => credential,
            Ok(None) => {
                return Err(CredentialError::AuthRequired(format!(
                    "no credential stored at {}",
                    self.store.location()
                )))
            }
            Err(StoreError::Malformed(reason)) => {
                return Err(CredentialError::AuthRequired(format!(
                    "stored credential is malformed: {reason}"
                )))
            }
            Err(e) => return Err(CredentialError::Store(e)),
        };

        credential
            .validate(&self.required_scopes)
            .map_err(unusable)?;

        if !credential.is_expired_at(Utc::now(), self.skew()) {
            tracing::trace!("stored credential is still valid");
            return Ok(credential);
        }

        let Some(refresh_token) = credential.usable_refresh_token() else {
            return Err(CredentialError::AuthRequired(
                "credential expired and has no refresh token".to_string(),
            ));
        };

        let grant = RefreshGrant {
            refresh_token: refresh_token.to_string(),
            client_id: credential.client_id.clone(),
            client_secret: credential.client_secret.clone(),
            token_uri: credential.token_uri.clone(),
        };

        tracing::info!(expired_at = ?credential.expiry, "refreshing expired access token");
        let refreshed =
            match tokio::time::timeout(self.refresh_timeout, self.refresher.refresh_grant(&grant))
                .await
            {
                Ok(Ok(refreshed)) => refreshed,
                Ok(Err(e)) => {
                    return Err(CredentialError::AuthRequired(format!(
                        "token refresh failed: {e}"
                    )))
                }
                Err(_) => {
                    return Err(CredentialError::AuthRequired(format!(
                        "token refresh timed out after {}s",
                        self.refresh_timeout.as_secs_f32()
                    )))
                }
            };

        let credential = apply_refresh(credential, refreshed);
        credential
            .validate(&self.required_scopes)
            .map_err(unusable)?;

        self.store
            .save(&credential)
            .await
            .map_err(CredentialError::Store)?;

        tracing::info!(expires_at = ?credential.expiry, "refreshed credential persisted");
        Ok(credential)
    }

    /// Reports the state of the stored credential without refreshing it.
    pub async fn status(&self) -> CredentialState {
        let credential = match self.store.load().await {
            Ok(Some(credential)) => credential,
            Ok(None) => return CredentialState::Absent,
            Err(StoreError::Malformed(reason)) => return CredentialState::Malformed { reason },
            Err(e) => {
                return CredentialState::Unreadable {
                    reason: e.to_string(),
                }
            }
        };

        match credential.validate(&self.required_scopes) {
            Err(CredentialDefect::MissingScopes(missing)) => {
                return CredentialState::ScopeMismatch { missing }
            }
            Err(defect) => {
                return CredentialState::Malformed {
                    reason: defect.to_string(),
                }
            }
            Ok(()) => {}
        }

        if credential.is_expired_at(Utc::now(), self.skew()) {
            CredentialState::Expired {
                refreshable: credential.usable_refresh_token().is_some(),
            }
        } else {
            CredentialState::Valid {
                expires_at: credential.expiry,
            }
        }
    }

    fn skew(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.expiry_skew).unwrap_or(chrono::Duration::zero())
    }
}

fn unusable(defect: CredentialDefect) -> CredentialError {
    CredentialError::AuthRequired(defect.to_string())
}

fn apply_refresh(mut credential: Credential, refreshed: RefreshedToken) -> Credential {
    credential.access_token = refreshed.access_token;
    credential.expiry = Some(refreshed.expires_at);
    if let Some(refresh_token) = refreshed.refresh_token {
        credential.refresh_token = Some(refresh_token);
    }
    if let Some(scopes) = refreshed.scopes.filter(|scopes| !scopes.is_empty()) {
        credential.scopes = scopes.into_iter().collect();
    }
    credential
}
