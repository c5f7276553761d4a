//! Application wiring and the inbound call-in interface.
//!
//! [`App`] assembles the relay from [`Settings`] and exposes the three
//! operations callers use: sending a reminder, checking Gmail readiness, and
//! reading recent outcomes.

mod actions;

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::config::{ConfigError, CredentialBackend, Settings};
use crate::domain::DispatchOutcome;
use crate::providers::email::GmailProvider;
use crate::services::{CredentialManager, Dispatcher, MessageComposer};
use crate::storage::{
    CredentialStore, FileCredentialStore, KeychainCredentialStore, OutcomeLog, OutcomeLogError,
};

pub use actions::{
    parse_reminder_payload, ComposeError, DeliveryMethod, GmailStatus, SendReminderResponse,
};

/// Errors surfaced to callers of [`App`].
#[derive(Debug, Error)]
pub enum AppError {
    /// The payload could not be turned into a reminder, or was rejected.
    #[error(transparent)]
    MalformedRequest(#[from] ComposeError),

    /// Settings are unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The outcome log could not be opened or read.
    #[error(transparent)]
    OutcomeLog(#[from] OutcomeLogError),

    /// A background task failed.
    #[error("background task failed: {0}")]
    TaskFailed(String),
}

/// The assembled relay.
#[derive(Debug)]
pub struct App {
    dispatcher: Dispatcher,
}

impl App {
    /// Wraps an already assembled dispatcher.
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Builds the relay described by `settings`.
    ///
    /// # Errors
    ///
    /// Fails when the settings do not validate or the outcome log cannot be
    /// opened.
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        settings.validate()?;

        let store: Arc<dyn CredentialStore> = match settings.storage.credential_backend {
            CredentialBackend::File => Arc::new(FileCredentialStore::new(
                settings.storage.credential_path.clone(),
            )),
            CredentialBackend::Keychain => Arc::new(KeychainCredentialStore::with_service(
                settings.storage.keychain_service.clone(),
            )),
        };
        let gmail = Arc::new(GmailProvider::new(settings.gmail_config()));

        let credentials = CredentialManager::new(store, gmail.clone())
            .with_required_scopes(settings.provider.required_scopes.iter().cloned())
            .with_refresh_timeout(settings.timeouts.refresh_timeout())
            .with_expiry_skew(settings.timeouts.expiry_skew());

        let composer = MessageComposer::new(settings.delivery.fallback_recipient.clone())
            .with_default_subject(settings.delivery.default_subject.clone())
            .with_sender_name(settings.delivery.sender_name.clone());

        let outcome_log = Arc::new(OutcomeLog::open(&settings.storage.outcome_log_path)?);

        let mut dispatcher = Dispatcher::new(composer, Arc::new(credentials), outcome_log)
            .with_send_timeout(settings.timeouts.send_timeout());
        if settings.provider.enabled {
            dispatcher = dispatcher.with_provider(gmail, settings.provider.sender_address.clone());
        }

        tracing::info!(
            credential_store = %dispatcher.credentials().store().location(),
            outcome_log = %settings.storage.outcome_log_path.display(),
            provider_enabled = settings.provider.enabled,
            "reminder relay ready"
        );
        Ok(Self::new(dispatcher))
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Parses `payload`, dispatches it, and reports how it left the relay.
    ///
    /// Simulated deliveries are successes. Only payloads that cannot be
    /// parsed or that the dispatcher rejects as malformed are errors.
    pub async fn send_reminder(&self, payload: Value) -> Result<SendReminderResponse, AppError> {
        let request = parse_reminder_payload(payload).map_err(|e| {
            tracing::warn!(error = %e, "rejecting reminder payload");
            e
        })?;
        let outcome = self.dispatcher.send(&request).await;
        Ok(SendReminderResponse::from_outcome(outcome)?)
    }

    /// Reports whether the Gmail integration can deliver right now.
    pub async fn gmail_status(&self) -> GmailStatus {
        let credentials = self.dispatcher.credentials();
        let store = credentials.store();

        let store_exists = match store.exists().await {
            Ok(exists) => exists,
            Err(e) => {
                tracing::warn!(error = %e, "could not check credential store");
                false
            }
        };
        let credential_state = credentials.status().await;
        let provider_enabled = self.dispatcher.provider_enabled();

        GmailStatus {
            credential_store: store.location(),
            store_exists,
            provider_enabled,
            ready: provider_enabled && credential_state.is_ready(),
            credential_state,
        }
    }

    /// Returns up to `limit` of the most recent outcomes, oldest first.
    ///
    /// A log that is not backed by a file has no history to read.
    pub async fn recent_outcomes(&self, limit: usize) -> Result<Vec<DispatchOutcome>, AppError> {
        let Some(path) = self.dispatcher.outcome_log().path().map(|p| p.to_path_buf()) else {
            return Ok(Vec::new());
        };

        tokio::task::spawn_blocking(move || OutcomeLog::read_recent(path, limit))
            .await
            .map_err(|e| AppError::TaskFailed(e.to_string()))?
            .map_err(AppError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Credential, DispatchStatus, FailureKind, GMAIL_SEND_SCOPE};
    use crate::providers::email::MockTokenRefresher;
    use crate::services::CredentialState;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn settings_in(dir: &TempDir) -> Settings {
        let mut settings = Settings::default();
        settings.storage.credential_path = dir.path().join("token.json");
        settings.storage.outcome_log_path = dir.path().join("logs").join("email_logs.jsonl");
        settings.delivery.fallback_recipient = "family@example.com".to_string();
        settings
    }

    fn offline_app(dir: &TempDir) -> App {
        let store = Arc::new(FileCredentialStore::new(dir.path().join("token.json")));
        let credentials = CredentialManager::new(store, Arc::new(MockTokenRefresher::new()));
        let outcome_log =
            Arc::new(OutcomeLog::open(dir.path().join("email_logs.jsonl")).unwrap());
        App::new(Dispatcher::new(
            MessageComposer::new("family@example.com"),
            Arc::new(credentials),
            outcome_log,
        ))
    }

    #[test]
    fn from_settings_rejects_invalid_settings() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.delivery.fallback_recipient = String::new();

        assert!(matches!(
            App::from_settings(&settings),
            Err(AppError::Config(_))
        ));
    }

    #[tokio::test]
    async fn from_settings_honours_disabled_provider() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings_in(&dir);
        settings.provider.enabled = false;

        let app = App::from_settings(&settings).unwrap();
        assert!(!app.dispatcher().provider_enabled());

        let response = app.send_reminder(json!({"medication": "Aspirin"})).await.unwrap();
        assert_eq!(response.method, DeliveryMethod::Simulated);
        assert_eq!(response.outcome.recipient, "family@example.com");
        assert!(settings.storage.outcome_log_path.exists());
    }

    #[tokio::test]
    async fn send_reminder_simulates_without_provider() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir);

        let response = app
            .send_reminder(json!({
                "to": "family@example.com",
                "item": "Aspirin",
                "time": "08:00",
                "status": "taken",
            }))
            .await
            .unwrap();

        assert_eq!(response.status, "success");
        assert_eq!(response.method, DeliveryMethod::Simulated);
        assert_eq!(
            response.outcome.delivery.failure_kind(),
            Some(FailureKind::ProviderDisabled)
        );
    }

    #[tokio::test]
    async fn send_reminder_rejects_wrong_types_without_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir);

        let result = app.send_reminder(json!({"subject": true})).await;
        assert!(matches!(result, Err(AppError::MalformedRequest(_))));
        assert!(app.recent_outcomes(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn send_reminder_rejects_header_injection() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir);

        let result = app
            .send_reminder(json!({"subject": "Hi\r\nBcc: everyone@example.com"}))
            .await;
        assert!(matches!(
            result,
            Err(AppError::MalformedRequest(ComposeError::Rejected(_)))
        ));

        let history = app.recent_outcomes(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status(), DispatchStatus::Failed);
    }

    #[tokio::test]
    async fn recent_outcomes_returns_tail_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir);

        for subject in ["first", "second", "third"] {
            app.send_reminder(json!({"subject": subject})).await.unwrap();
        }

        let history = app.recent_outcomes(2).await.unwrap();
        let subjects: Vec<_> = history.iter().map(|o| o.subject.as_str()).collect();
        assert_eq!(subjects, vec!["second", "third"]);
    }

    #[tokio::test]
    async fn gmail_status_reports_absent_store() {
        let dir = tempfile::tempdir().unwrap();
        let app = offline_app(&dir);

        let status = app.gmail_status().await;
        assert!(!status.store_exists);
        assert!(!status.provider_enabled);
        assert!(!status.ready);
        assert_eq!(status.credential_state, CredentialState::Absent);
        assert!(status.credential_store.ends_with("token.json"));
    }

    #[tokio::test]
    async fn gmail_status_is_ready_with_valid_record() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(&dir);
        FileCredentialStore::new(settings.storage.credential_path.clone())
            .save(&Credential::new("ya29.token", [GMAIL_SEND_SCOPE]))
            .await
            .unwrap();

        let app = App::from_settings(&settings).unwrap();
        let status = app.gmail_status().await;

        assert!(status.store_exists);
        assert!(status.provider_enabled);
        assert!(status.ready);
        assert_eq!(
            status.credential_state,
            CredentialState::Valid { expires_at: None }
        );
    }
}
