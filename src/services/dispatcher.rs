//! Reminder dispatch pipeline.
//!
//! The [`Dispatcher`] composes a message, obtains a credential, and hands the
//! encoded message to the mail provider. Authorization and provider problems
//! never surface as errors: they end in a simulated outcome that records why
//! real delivery did not happen. Only a malformed request ends as failed.
//!
//! ```text
//! Composing -> Authenticating -> Sending -> { Sent | Simulated | Failed }
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;

use super::{CredentialError, CredentialManager, MessageComposer};
use crate::domain::{
    Delivery, DispatchOutcome, DispatchStatus, FailureKind, OutboundMessage, OutcomeId,
    ReminderRequest,
};
use crate::providers::email::{encode_raw_message, MailProvider, ProviderError};
use crate::storage::OutcomeLog;

/// Default deadline for a provider send call.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Orchestrates composition, authorization, and delivery of reminders.
pub struct Dispatcher {
    composer: MessageComposer,
    credentials: Arc<CredentialManager>,
    provider: Option<Arc<dyn MailProvider>>,
    sender_address: String,
    send_timeout: Duration,
    outcome_log: Arc<OutcomeLog>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("composer", &self.composer)
            .field("provider", &self.provider.as_ref().map(|p| p.name()))
            .field("sender_address", &self.sender_address)
            .field("send_timeout", &self.send_timeout)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher with no provider; every reminder is simulated
    /// until [`with_provider`](Self::with_provider) is called.
    pub fn new(
        composer: MessageComposer,
        credentials: Arc<CredentialManager>,
        outcome_log: Arc<OutcomeLog>,
    ) -> Self {
        Self {
            composer,
            credentials,
            provider: None,
            sender_address: String::new(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
            outcome_log,
        }
    }

    /// Enables real delivery through `provider`, sending as `sender_address`.
    pub fn with_provider(
        mut self,
        provider: Arc<dyn MailProvider>,
        sender_address: impl Into<String>,
    ) -> Self {
        self.provider = Some(provider);
        self.sender_address = sender_address.into();
        self
    }

    /// Sets the deadline for a provider send call.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Returns whether a provider is configured.
    pub fn provider_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Returns the message composer.
    pub fn composer(&self) -> &MessageComposer {
        &self.composer
    }

    /// Returns the credential manager.
    pub fn credentials(&self) -> &Arc<CredentialManager> {
        &self.credentials
    }

    /// Returns the outcome log every dispatch is recorded in.
    pub fn outcome_log(&self) -> &Arc<OutcomeLog> {
        &self.outcome_log
    }

    /// Dispatches one reminder and records the outcome.
    ///
    /// Always returns an outcome; the outcome has already been appended to
    /// the outcome log when this returns.
    pub async fn send(&self, request: &ReminderRequest) -> DispatchOutcome {
        let id = OutcomeId::new();
        let span = tracing::info_span!("dispatch", outcome_id = %id);

        async move {
            let message = self.composer.compose(request);

            let delivery = match header_injection(&message) {
                Some(reason) => Delivery::malformed(reason),
                None => self.deliver(&message).await,
            };

            let outcome = DispatchOutcome::for_message(id, &message, delivery);
            self.record(&outcome).await;
            outcome
        }
        .instrument(span)
        .await
    }

    async fn deliver(&self, message: &OutboundMessage) -> Delivery {
        let Some(provider) = self.provider.as_ref() else {
            return Delivery::simulated(FailureKind::ProviderDisabled, "");
        };

        let credential = match self.credentials.acquire_usable().await {
            Ok(credential) => credential,
            Err(CredentialError::AuthRequired(reason)) => {
                return Delivery::simulated(FailureKind::AuthRequired, reason)
            }
            Err(CredentialError::Store(e)) => {
                tracing::error!(error = %e, "credential store failure during dispatch");
                return Delivery::simulated(FailureKind::CredentialStore, e.to_string());
            }
        };

        let raw = match encode_raw_message(message, &self.sender_address) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode reminder");
                return Delivery::simulated(FailureKind::Encoding, e.to_string());
            }
        };

        let sent = match tokio::time::timeout(
            self.send_timeout,
            provider.send_raw(&credential.access_token, &raw),
        )
        .await
        {
            Ok(Ok(sent)) => sent,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, provider = provider.name(), "provider send failed");
                return Delivery::simulated(classify_provider_error(&e), e.to_string());
            }
            Err(_) => {
                tracing::warn!(provider = provider.name(), "provider send timed out");
                return Delivery::simulated(
                    FailureKind::ProviderTransient,
                    format!("send timed out after {}s", self.send_timeout.as_secs_f32()),
                );
            }
        };

        Delivery::sent(sent.message_id, sent.thread_id).unwrap_or_else(|| {
            Delivery::simulated(
                FailureKind::ProviderPermanent,
                "provider accepted the message without a message id",
            )
        })
    }

    async fn record(&self, outcome: &DispatchOutcome) {
        let log = Arc::clone(&self.outcome_log);
        let entry = outcome.clone();
        match tokio::task::spawn_blocking(move || log.append(&entry)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, outcome_id = %outcome.id, "failed to append dispatch outcome")
            }
            Err(e) => {
                tracing::error!(error = %e, outcome_id = %outcome.id, "outcome log task failed")
            }
        }

        match outcome.status() {
            DispatchStatus::Sent => tracing::info!(
                recipient = %outcome.recipient,
                message_id = ?outcome.provider_message_id(),
                "reminder sent"
            ),
            DispatchStatus::Simulated => tracing::warn!(
                recipient = %outcome.recipient,
                reason = outcome.failure_reason().unwrap_or_default(),
                "reminder simulated"
            ),
            DispatchStatus::Failed => tracing::warn!(
                reason = outcome.failure_reason().unwrap_or_default(),
                "reminder rejected"
            ),
        }
    }
}

/// Maps a provider failure to the failure kind recorded in the outcome.
pub fn classify_provider_error(error: &ProviderError) -> FailureKind {
    if error.is_authentication() {
        FailureKind::ProviderAuth
    } else if error.is_transient() {
        FailureKind::ProviderTransient
    } else {
        FailureKind::ProviderPermanent
    }
}

/// Returns a reason when a header value would smuggle extra header lines.
fn header_injection(message: &OutboundMessage) -> Option<String> {
    let has_line_break = |value: &str| value.contains(['\r', '\n']);

    if has_line_break(&message.recipient) {
        Some("recipient contains a line break".to_string())
    } else if has_line_break(&message.subject) {
        Some("subject contains a line break".to_string())
    } else {
        None
    }
}
