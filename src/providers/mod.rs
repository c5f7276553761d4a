//! External provider implementations.
//!
//! - [`email`] - Mail providers (Gmail API)

pub mod email;
