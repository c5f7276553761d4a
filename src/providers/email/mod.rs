//! Mail provider implementations.
//!
//! This module contains the provider capabilities used by the dispatch
//! pipeline and their Gmail implementation:
//!
//! - [`TokenRefresher`] - refresh-token exchange at the OAuth token endpoint
//! - [`MailProvider`] - submission of an encoded message
//! - [`GmailProvider`] - both capabilities over the Gmail REST API
//!
//! # Example
//!
//! ```ignore
//! use reminder_relay::providers::email::{encode_raw_message, GmailConfig, GmailProvider, MailProvider};
//!
//! async fn deliver(message: &OutboundMessage, access_token: &str) {
//!     let provider = GmailProvider::new(GmailConfig::default());
//!     let raw = encode_raw_message(message, "reminders@example.com").unwrap();
//!     let sent = provider.send_raw(access_token, &raw).await.unwrap();
//!     println!("sent {} in thread {}", sent.message_id, sent.thread_id);
//! }
//! ```

mod gmail;
mod mime;
mod traits;

pub use gmail::{GmailConfig, GmailProvider, GMAIL_API_BASE, GOOGLE_TOKEN_URL};
pub use mime::{build_message, encode_raw_message, EncodeError};
pub use traits::{
    MailProvider, ProviderError, RefreshGrant, RefreshedToken, Result, SentMessage,
    TokenRefresher,
};

#[cfg(test)]
pub use traits::{MockMailProvider, MockTokenRefresher};
