//! Dispatch outcomes recorded in the outcome log.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ContentKind, MessageId, OutboundMessage, OutcomeId, ThreadId};

/// Terminal status of a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    /// Delivered by the provider.
    Sent,
    /// Recorded as delivered without reaching the provider.
    Simulated,
    /// Rejected because the request itself was malformed.
    Failed,
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DispatchStatus::Sent => "sent",
            DispatchStatus::Simulated => "simulated",
            DispatchStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Category of the condition that prevented real delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No provider integration is configured.
    ProviderDisabled,
    /// No usable credential; external re-authorization is needed.
    AuthRequired,
    /// The credential record could not be read or written.
    CredentialStore,
    /// The message could not be encoded for the provider.
    Encoding,
    /// The provider rejected the grant at send time.
    ProviderAuth,
    /// The provider was unreachable, slow, or overloaded.
    ProviderTransient,
    /// The provider rejected the request for a non-transient reason.
    ProviderPermanent,
    /// The caller's request was structurally invalid.
    MalformedRequest,
}

impl FailureKind {
    /// Short human-readable description, used when no detail is available.
    pub fn describe(self) -> &'static str {
        match self {
            FailureKind::ProviderDisabled => "mail provider integration is disabled",
            FailureKind::AuthRequired => "mail provider authorization is required",
            FailureKind::CredentialStore => "credential store is unavailable",
            FailureKind::Encoding => "message could not be encoded",
            FailureKind::ProviderAuth => "mail provider rejected the authorization",
            FailureKind::ProviderTransient => "mail provider is temporarily unavailable",
            FailureKind::ProviderPermanent => "mail provider rejected the message",
            FailureKind::MalformedRequest => "request is malformed",
        }
    }
}

/// How a dispatch attempt ended.
///
/// Provider identifiers exist only on `Sent`; a failure reason exists on
/// every other variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "status",
    rename_all = "snake_case",
    try_from = "DeliveryWire"
)]
pub enum Delivery {
    /// The provider accepted the message.
    Sent {
        /// Provider message id, never empty.
        provider_message_id: MessageId,
        /// Provider thread id.
        provider_thread_id: ThreadId,
    },
    /// Real delivery was skipped or failed; the attempt is logged only.
    Simulated {
        /// Category of the underlying problem.
        failure_kind: FailureKind,
        /// Diagnostic detail, never empty.
        failure_reason: String,
    },
    /// The request was rejected before dispatch.
    Failed {
        /// Always [`FailureKind::MalformedRequest`] today.
        failure_kind: FailureKind,
        /// Diagnostic detail, never empty.
        failure_reason: String,
    },
}

impl Delivery {
    /// Creates a sent delivery, or `None` when the provider message id is
    /// blank.
    pub fn sent(provider_message_id: MessageId, provider_thread_id: ThreadId) -> Option<Self> {
        if provider_message_id.0.trim().is_empty() {
            return None;
        }
        Some(Delivery::Sent {
            provider_message_id,
            provider_thread_id,
        })
    }

    /// Creates a simulated delivery. A blank reason is replaced by the
    /// kind's description.
    pub fn simulated(failure_kind: FailureKind, reason: impl Into<String>) -> Self {
        Delivery::Simulated {
            failure_kind,
            failure_reason: reason_or_default(failure_kind, reason.into()),
        }
    }

    /// Creates a failed delivery for a malformed request.
    pub fn malformed(reason: impl Into<String>) -> Self {
        let failure_kind = FailureKind::MalformedRequest;
        Delivery::Failed {
            failure_kind,
            failure_reason: reason_or_default(failure_kind, reason.into()),
        }
    }

    /// Returns the terminal status.
    pub fn status(&self) -> DispatchStatus {
        match self {
            Delivery::Sent { .. } => DispatchStatus::Sent,
            Delivery::Simulated { .. } => DispatchStatus::Simulated,
            Delivery::Failed { .. } => DispatchStatus::Failed,
        }
    }

    /// Returns the failure reason for non-sent deliveries.
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            Delivery::Sent { .. } => None,
            Delivery::Simulated { failure_reason, .. } | Delivery::Failed { failure_reason, .. } => {
                Some(failure_reason)
            }
        }
    }

    /// Returns the failure kind for non-sent deliveries.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Delivery::Sent { .. } => None,
            Delivery::Simulated { failure_kind, .. } | Delivery::Failed { failure_kind, .. } => {
                Some(*failure_kind)
            }
        }
    }
}

/// Unchecked shape of a [`Delivery`] as read from the log.
#[derive(Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum DeliveryWire {
    Sent {
        provider_message_id: MessageId,
        provider_thread_id: ThreadId,
    },
    Simulated {
        failure_kind: FailureKind,
        failure_reason: String,
    },
    Failed {
        failure_kind: FailureKind,
        failure_reason: String,
    },
}

impl TryFrom<DeliveryWire> for Delivery {
    type Error = String;

    fn try_from(wire: DeliveryWire) -> Result<Self, Self::Error> {
        match wire {
            DeliveryWire::Sent {
                provider_message_id,
                provider_thread_id,
            } => Delivery::sent(provider_message_id, provider_thread_id)
                .ok_or_else(|| "sent delivery has a blank provider_message_id".to_string()),
            DeliveryWire::Simulated {
                failure_kind,
                failure_reason,
            } => Ok(Delivery::simulated(failure_kind, failure_reason)),
            DeliveryWire::Failed {
                failure_kind,
                failure_reason,
            } => Ok(Delivery::Failed {
                failure_kind,
                failure_reason: reason_or_default(failure_kind, failure_reason),
            }),
        }
    }
}

fn reason_or_default(kind: FailureKind, reason: String) -> String {
    if reason.trim().is_empty() {
        kind.describe().to_string()
    } else {
        reason
    }
}

/// The result of one dispatch attempt, as returned to the caller and
/// appended to the outcome log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Identifier of this attempt.
    pub id: OutcomeId,
    /// When the attempt reached its terminal state.
    pub timestamp: DateTime<Utc>,
    /// Resolved recipient address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Sender contact named in the message.
    pub contact_name: String,
    /// Body content type, absent when composition never happened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_kind: Option<ContentKind>,
    /// Terminal state and its details.
    #[serde(flatten)]
    pub delivery: Delivery,
}

impl DispatchOutcome {
    /// Records the outcome of dispatching a composed message.
    pub fn for_message(id: OutcomeId, message: &OutboundMessage, delivery: Delivery) -> Self {
        Self {
            id,
            timestamp: Utc::now(),
            recipient: message.recipient.clone(),
            subject: message.subject.clone(),
            contact_name: message.contact_name.clone(),
            content_kind: Some(message.content_kind),
            delivery,
        }
    }

    /// Returns the terminal status.
    pub fn status(&self) -> DispatchStatus {
        self.delivery.status()
    }

    /// Returns the provider message id if the message was sent.
    pub fn provider_message_id(&self) -> Option<&MessageId> {
        match &self.delivery {
            Delivery::Sent {
                provider_message_id,
                ..
            } => Some(provider_message_id),
            _ => None,
        }
    }

    /// Returns the provider thread id if the message was sent.
    pub fn provider_thread_id(&self) -> Option<&ThreadId> {
        match &self.delivery {
            Delivery::Sent {
                provider_thread_id, ..
            } => Some(provider_thread_id),
            _ => None,
        }
    }

    /// Returns the failure reason for simulated and failed outcomes.
    pub fn failure_reason(&self) -> Option<&str> {
        self.delivery.failure_reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message() -> OutboundMessage {
        OutboundMessage {
            recipient: "family@example.com".to_string(),
            recipient_is_fallback: false,
            subject: "Medication Reminder".to_string(),
            body: "Take your medication.".to_string(),
            content_kind: ContentKind::Plain,
            contact_name: "Hanako".to_string(),
        }
    }

    #[test]
    fn simulated_with_blank_reason_uses_description() {
        let delivery = Delivery::simulated(FailureKind::AuthRequired, "  ");
        assert_eq!(
            delivery.failure_reason(),
            Some(FailureKind::AuthRequired.describe())
        );
        assert_eq!(delivery.status(), DispatchStatus::Simulated);
    }

    #[test]
    fn sent_has_no_failure_reason() {
        let delivery = Delivery::Sent {
            provider_message_id: MessageId::from("m-1"),
            provider_thread_id: ThreadId::from("t-1"),
        };
        assert!(delivery.failure_reason().is_none());
        assert!(delivery.failure_kind().is_none());
    }

    #[test]
    fn sent_requires_a_message_id() {
        assert!(Delivery::sent(MessageId::from("  "), ThreadId::from("t-1")).is_none());
        assert_eq!(
            Delivery::sent(MessageId::from("m-1"), ThreadId::from("t-1"))
                .map(|delivery| delivery.status()),
            Some(DispatchStatus::Sent)
        );
    }

    #[test]
    fn blank_sent_id_is_rejected_on_decode() {
        let json = r#"{"status":"sent","provider_message_id":"","provider_thread_id":"t-1"}"#;
        assert!(serde_json::from_str::<Delivery>(json).is_err());

        let json = r#"{"status":"sent","provider_message_id":"m-1","provider_thread_id":"t-1"}"#;
        let delivery: Delivery = serde_json::from_str(json).unwrap();
        assert_eq!(delivery.status(), DispatchStatus::Sent);
    }

    #[test]
    fn outcome_serializes_flat_with_status_tag() {
        let outcome = DispatchOutcome::for_message(
            OutcomeId::new(),
            &message(),
            Delivery::simulated(FailureKind::ProviderTransient, "send timed out after 15s"),
        );

        let value = serde_json::to_value(&outcome).unwrap();
        assert_eq!(value["status"], "simulated");
        assert_eq!(value["failure_kind"], "provider_transient");
        assert_eq!(value["failure_reason"], "send timed out after 15s");
        assert_eq!(value["recipient"], "family@example.com");
        assert!(value.get("provider_message_id").is_none());

        let parsed: DispatchOutcome = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, outcome);
    }

    #[test]
    fn sent_outcome_exposes_provider_ids() {
        let outcome = DispatchOutcome::for_message(
            OutcomeId::new(),
            &message(),
            Delivery::Sent {
                provider_message_id: MessageId::from("m-1"),
                provider_thread_id: ThreadId::from("t-1"),
            },
        );

        assert_eq!(outcome.status(), DispatchStatus::Sent);
        assert_eq!(outcome.provider_message_id(), Some(&MessageId::from("m-1")));
        assert_eq!(outcome.provider_thread_id(), Some(&ThreadId::from("t-1")));
    }

    #[test]
    fn malformed_is_failed() {
        let delivery = Delivery::malformed("recipient contains a line break");
        assert_eq!(delivery.status(), DispatchStatus::Failed);
        assert_eq!(delivery.failure_kind(), Some(FailureKind::MalformedRequest));
    }

    #[test]
    fn status_display() {
        assert_eq!(DispatchStatus::Sent.to_string(), "sent");
        assert_eq!(DispatchStatus::Simulated.to_string(), "simulated");
        assert_eq!(DispatchStatus::Failed.to_string(), "failed");
    }
}
