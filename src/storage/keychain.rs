//! OS keychain backend for the credential record.
//!
//! Wraps the keyring crate so the credential can live in the platform's
//! native secret store instead of a file. The record is stored as the same
//! JSON document the file backend writes.

use std::sync::Arc;

use async_trait::async_trait;

use super::credential_store::{CredentialStore, Result, StoreError};
use crate::domain::Credential;

/// Stores the credential record in the OS keychain.
///
/// The record lives under `service_name` / `account`. Keychain writes
/// replace the whole entry, so readers never observe a partial record.
#[derive(Clone)]
pub struct KeychainCredentialStore {
    service_name: String,
    account: String,
    entry: Option<Arc<keyring::Entry>>,
}

impl std::fmt::Debug for KeychainCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeychainCredentialStore")
            .field("service_name", &self.service_name)
            .field("account", &self.account)
            .field("pinned_entry", &self.entry.is_some())
            .finish()
    }
}

impl KeychainCredentialStore {
    /// Default service name for reminder-relay credentials.
    pub const DEFAULT_SERVICE: &'static str = "io.reminder-relay";

    /// Default account key for the Gmail grant.
    pub const DEFAULT_ACCOUNT: &'static str = "gmail.oauth";

    /// Creates a store with the default service and account names.
    pub fn new() -> Self {
        Self::with_service(Self::DEFAULT_SERVICE)
    }

    /// Creates a store with a custom service name.
    ///
    /// Useful for testing to avoid interfering with real credentials.
    pub fn with_service(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account: Self::DEFAULT_ACCOUNT.to_string(),
            entry: None,
        }
    }

    /// Creates a store bound to an existing keychain entry.
    ///
    /// Every read and write goes through `entry` instead of a fresh lookup
    /// by service and account, which lets callers supply entries backed by
    /// a non-default credential store.
    pub fn with_entry(service_name: impl Into<String>, entry: keyring::Entry) -> Self {
        Self {
            entry: Some(Arc::new(entry)),
            ..Self::with_service(service_name)
        }
    }

    /// Returns the service name used for this keychain entry.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Returns the account name used for this keychain entry.
    pub fn account(&self) -> &str {
        &self.account
    }

    fn entry(&self) -> Result<Arc<keyring::Entry>> {
        match &self.entry {
            Some(entry) => Ok(Arc::clone(entry)),
            None => Ok(Arc::new(keyring::Entry::new(
                &self.service_name,
                &self.account,
            )?)),
        }
    }

    async fn read_secret(&self) -> Result<Option<String>> {
        let store = self.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<String>> {
            match store.entry()?.get_password() {
                Ok(secret) => Ok(Some(secret)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(StoreError::Keychain(e)),
            }
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }
}

impl Default for KeychainCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeychainCredentialStore {
    async fn load(&self) -> Result<Option<Credential>> {
        match self.read_secret().await? {
            Some(secret) if !secret.trim().is_empty() => serde_json::from_str(&secret)
                .map(Some)
                .map_err(|e| StoreError::Malformed(e.to_string())),
            _ => Ok(None),
        }
    }

    async fn save(&self, credential: &Credential) -> Result<()> {
        let secret =
            serde_json::to_string(credential).map_err(|e| StoreError::Encode(e.to_string()))?;
        let store = self.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            store.entry()?.set_password(&secret)?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::TaskFailed(e.to_string()))?
    }

    async fn exists(&self) -> Result<bool> {
        Ok(self
            .read_secret()
            .await?
            .is_some_and(|secret| !secret.trim().is_empty()))
    }

    fn location(&self) -> String {
        format!("keychain:{}/{}", self.service_name, self.account)
    }
}
