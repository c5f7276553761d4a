//! End-to-end dispatch tests: composer, credential manager, provider and
//! outcome log wired together over a temporary directory.

mod support;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use reminder_relay::domain::{DispatchStatus, FailureKind, ReminderRequest, TemplateFields};
use reminder_relay::providers::email::{MailProvider, ProviderError};
use reminder_relay::services::{CredentialManager, Dispatcher, MessageComposer};
use reminder_relay::storage::{CredentialStore, FileCredentialStore, OutcomeLog};
use support::{live_credential, FakeProvider, SendBehaviour, UnreachableRefresher};

struct Harness {
    _dir: TempDir,
    store: FileCredentialStore,
    log_path: PathBuf,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("token.json"));
        let log_path = dir.path().join("email_logs.jsonl");
        Self {
            _dir: dir,
            store,
            log_path,
        }
    }

    fn dispatcher(&self, provider: Option<Arc<dyn MailProvider>>) -> Dispatcher {
        let credentials =
            CredentialManager::new(Arc::new(self.store.clone()), Arc::new(UnreachableRefresher));
        let outcome_log = Arc::new(OutcomeLog::open(&self.log_path).unwrap());
        let dispatcher = Dispatcher::new(
            MessageComposer::new("family@example.com"),
            Arc::new(credentials),
            outcome_log,
        );
        match provider {
            Some(provider) => dispatcher.with_provider(provider, "reminders@example.com"),
            None => dispatcher,
        }
    }

    fn log_lines(&self) -> Vec<serde_json::Value> {
        std::fs::read_to_string(&self.log_path)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

fn aspirin_request() -> ReminderRequest {
    ReminderRequest::new()
        .recipient("family@example.com")
        .contact_name("Hanako")
        .template(TemplateFields {
            item: Some("Aspirin".to_string()),
            time: Some("08:00".to_string()),
            status: Some("taken".to_string()),
            dosage: None,
        })
}

#[tokio::test]
async fn absent_credential_is_simulated_and_logged_once() {
    let harness = Harness::new();
    let provider = FakeProvider::new(SendBehaviour::Deliver);
    let dispatcher = harness.dispatcher(Some(provider.clone()));

    let outcome = dispatcher.send(&aspirin_request()).await;

    assert_eq!(outcome.status(), DispatchStatus::Simulated);
    assert_eq!(
        outcome.delivery.failure_kind(),
        Some(FailureKind::AuthRequired)
    );
    assert!(!outcome.failure_reason().unwrap().is_empty());
    assert!(provider.sent().is_empty());

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["status"], "simulated");
    assert_eq!(lines[0]["recipient"], "family@example.com");
}

#[tokio::test]
async fn usable_credential_delivers_through_provider() {
    let harness = Harness::new();
    harness.store.save(&live_credential()).await.unwrap();
    let provider = FakeProvider::new(SendBehaviour::Deliver);
    let dispatcher = harness.dispatcher(Some(provider.clone()));

    let outcome = dispatcher.send(&aspirin_request()).await;

    assert_eq!(outcome.status(), DispatchStatus::Sent);
    assert_eq!(outcome.provider_message_id().unwrap().0, "msg-1");

    let sent = provider.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "live-token");
    assert!(!sent[0].1.contains('='));
    assert!(!sent[0].1.contains('+'));

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["status"], "sent");
    assert_eq!(lines[0]["provider_message_id"], "msg-1");
}

#[tokio::test]
async fn stalled_send_is_simulated_with_timeout_reason() {
    let harness = Harness::new();
    harness.store.save(&live_credential()).await.unwrap();
    let provider = FakeProvider::new(SendBehaviour::Stall);
    let dispatcher = harness
        .dispatcher(Some(provider))
        .with_send_timeout(Duration::from_millis(100));

    let outcome = dispatcher.send(&aspirin_request()).await;

    assert_eq!(outcome.status(), DispatchStatus::Simulated);
    assert_eq!(
        outcome.delivery.failure_kind(),
        Some(FailureKind::ProviderTransient)
    );
    assert!(outcome.failure_reason().unwrap().contains("timed out"));

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 1);
    assert!(lines[0]["failure_reason"]
        .as_str()
        .unwrap()
        .contains("timed out"));
}

#[tokio::test]
async fn revoked_grant_at_send_is_simulated() {
    let harness = Harness::new();
    harness.store.save(&live_credential()).await.unwrap();
    let provider = FakeProvider::new(SendBehaviour::Fail(ProviderError::Authentication(
        "invalid_grant".to_string(),
    )));
    let dispatcher = harness.dispatcher(Some(provider));

    let outcome = dispatcher.send(&aspirin_request()).await;

    assert_eq!(outcome.status(), DispatchStatus::Simulated);
    assert_eq!(
        outcome.delivery.failure_kind(),
        Some(FailureKind::ProviderAuth)
    );
}

#[tokio::test]
async fn disabled_provider_never_touches_credentials() {
    let harness = Harness::new();
    std::fs::write(harness.store.path(), "corrupt").unwrap();
    let dispatcher = harness.dispatcher(None);

    let outcome = dispatcher.send(&aspirin_request()).await;

    assert_eq!(
        outcome.delivery.failure_kind(),
        Some(FailureKind::ProviderDisabled)
    );
    assert_eq!(std::fs::read_to_string(harness.store.path()).unwrap(), "corrupt");
}

#[tokio::test]
async fn every_dispatch_appends_exactly_one_line() {
    let harness = Harness::new();
    let dispatcher = harness.dispatcher(None);

    for _ in 0..3 {
        dispatcher.send(&aspirin_request()).await;
    }
    dispatcher
        .send(&ReminderRequest::new().subject("Hi\nBcc: x@example.com"))
        .await;

    let lines = harness.log_lines();
    assert_eq!(lines.len(), 4);
    assert_eq!(lines[3]["status"], "failed");

    let recent = OutcomeLog::read_recent(&harness.log_path, 10).unwrap();
    assert_eq!(recent.len(), 4);
}

#[test]
fn template_body_names_item_time_and_status() {
    let composer = MessageComposer::new("family@example.com");
    let request = aspirin_request();

    let first = composer.compose(&request);
    let second = composer.compose(&request);

    assert_eq!(first, second);
    assert!(first.body.contains("Aspirin"));
    assert!(first.body.contains("08:00"));
    assert!(first.body.contains("taken"));
    assert!(first.body.contains("Hanako"));
}
