//! Credential and outcome storage.
//!
//! This module provides the storage layer for the relay:
//!
//! - A single OAuth credential record, kept in a JSON file or the OS keychain
//! - The append-only outcome log
//! - Async-safe blocking I/O via `tokio::task::spawn_blocking`

mod credential_store;
mod keychain;
mod outcome_log;

pub use credential_store::{CredentialStore, FileCredentialStore, Result, StoreError};
pub use keychain::KeychainCredentialStore;
pub use outcome_log::{OutcomeLog, OutcomeLogError};

#[cfg(test)]
pub use credential_store::MockCredentialStore;
