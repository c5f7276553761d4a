//! Domain layer types for reminder delivery.
//!
//! This module contains the core domain types used throughout the crate:
//! the delegated credential record, reminder requests and composed messages,
//! and the outcome of each dispatch attempt.

mod credential;
mod message;
mod outcome;
mod types;

pub use credential::{Credential, CredentialDefect, GMAIL_SEND_SCOPE};
pub(crate) use message::non_blank;
pub use message::{ContentKind, OutboundMessage, ReminderRequest, TemplateFields};
pub use outcome::{Delivery, DispatchOutcome, DispatchStatus, FailureKind};
pub use types::{MessageId, OutcomeId, ThreadId};
