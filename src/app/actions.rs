//! Inbound actions and their wire shapes.
//!
//! Callers hand the relay a loosely typed JSON payload. This module turns it
//! into a [`ReminderRequest`] and turns the resulting [`DispatchOutcome`] into
//! the response returned to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::{DispatchOutcome, DispatchStatus, MessageId, ReminderRequest, TemplateFields};
use crate::services::CredentialState;

/// Reasons a reminder payload cannot become a request.
#[derive(Debug, Error)]
pub enum ComposeError {
    /// The payload is not a JSON object.
    #[error("reminder payload must be a JSON object, got {0}")]
    NotAnObject(&'static str),

    /// A field has the wrong JSON type.
    #[error("invalid reminder payload: {0}")]
    InvalidField(#[from] serde_json::Error),

    /// The dispatcher refused the request.
    #[error("reminder rejected: {0}")]
    Rejected(String),
}

/// Parses a send-reminder payload.
///
/// Template fields may be nested under `template` or given at the top level
/// (`item`, `medication` or `name`, then `time`, `status`, `dosage`). The
/// first non-blank item alias wins. A nested `template` object wins over
/// top-level fields.
pub fn parse_reminder_payload(payload: Value) -> Result<ReminderRequest, ComposeError> {
    if !payload.is_object() {
        return Err(ComposeError::NotAnObject(json_kind(&payload)));
    }

    let top_level: TemplateFields = serde_json::from_value(payload.clone())?;
    let mut request: ReminderRequest = serde_json::from_value(payload)?;

    if request.template.is_none() && top_level.has_any() {
        request.template = Some(top_level);
    }
    Ok(request)
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// How a reminder left the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    /// Delivered through the Gmail API.
    GmailApi,
    /// Recorded without reaching the provider.
    Simulated,
}

/// Response to a successful send-reminder call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReminderResponse {
    /// Always `"success"`; rejected requests are errors instead.
    pub status: String,
    /// Human-readable summary.
    pub message: String,
    /// When the dispatch was recorded.
    pub timestamp: DateTime<Utc>,
    /// Delivery method.
    pub method: DeliveryMethod,
    /// Provider message id for real deliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<MessageId>,
    /// The recorded outcome.
    pub outcome: DispatchOutcome,
}

impl SendReminderResponse {
    /// Builds the response for `outcome`, or the rejection for failed ones.
    pub fn from_outcome(outcome: DispatchOutcome) -> Result<Self, ComposeError> {
        let (method, message) = match outcome.status() {
            DispatchStatus::Sent => (
                DeliveryMethod::GmailApi,
                format!("Email sent to {}", outcome.recipient),
            ),
            DispatchStatus::Simulated => (
                DeliveryMethod::Simulated,
                format!(
                    "Email to {} recorded as simulated: {}",
                    outcome.recipient,
                    outcome.failure_reason().unwrap_or("provider not used")
                ),
            ),
            DispatchStatus::Failed => {
                return Err(ComposeError::Rejected(
                    outcome
                        .failure_reason()
                        .unwrap_or("malformed request")
                        .to_string(),
                ))
            }
        };

        Ok(Self {
            status: "success".to_string(),
            message,
            timestamp: outcome.timestamp,
            method,
            provider_message_id: outcome.provider_message_id().cloned(),
            outcome,
        })
    }
}

/// Snapshot of the Gmail integration's readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GmailStatus {
    /// Where the credential record lives.
    pub credential_store: String,
    /// Whether a record is present.
    pub store_exists: bool,
    /// Whether real delivery is configured.
    pub provider_enabled: bool,
    /// State of the stored credential.
    pub credential_state: CredentialState,
    /// Whether a send right now would reach the provider without re-consent.
    pub ready: bool,
}
