//! Business services layer.
//!
//! This module contains the services that carry a reminder from request to
//! recorded outcome, coordinating between providers, storage, and domain types.
//!
//! # Architecture
//!
//! Services sit between the application layer and the infrastructure layer:
//!
//! ```text
//! Application Layer (App, CLI)
//!          |
//!          v
//!    Services Layer  <-- You are here
//!          |
//!          v
//! Infrastructure (Providers, Storage)
//! ```
//!
//! # Services Overview
//!
//! - [`CredentialManager`]: Loads, validates, refreshes, and persists the OAuth credential
//! - [`MessageComposer`]: Builds the outbound message from a reminder request
//! - [`Dispatcher`]: Runs the compose, authorize, send pipeline and records outcomes

mod composer;
mod credential_manager;
mod dispatcher;

pub use composer::{
    detect_content_kind, MessageComposer, DEFAULT_BODY, DEFAULT_ITEM, DEFAULT_SENDER_NAME,
    DEFAULT_STATUS, DEFAULT_SUBJECT, DEFAULT_TIME,
};
pub use credential_manager::{
    CredentialError, CredentialManager, CredentialState, DEFAULT_EXPIRY_SKEW,
    DEFAULT_REFRESH_TIMEOUT,
};
pub use dispatcher::{classify_provider_error, Dispatcher, DEFAULT_SEND_TIMEOUT};
