//! Hand-written fakes shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reminder_relay::domain::{Credential, MessageId, ThreadId, GMAIL_SEND_SCOPE};
use reminder_relay::providers::email::{
    MailProvider, ProviderError, RefreshGrant, RefreshedToken, SentMessage, TokenRefresher,
};
use reminder_relay::storage::{CredentialStore, FileCredentialStore, Result as StoreResult};

/// Whole-second timestamp an hour from now, so it survives a JSON round trip.
pub fn in_one_hour() -> DateTime<Utc> {
    DateTime::from_timestamp(Utc::now().timestamp() + 3600, 0).unwrap()
}

/// A granted record whose access token has already expired.
pub fn expired_credential() -> Credential {
    Credential::new("stale-token", [GMAIL_SEND_SCOPE])
        .with_refresh_token("refresh-1")
        .with_client("client-id", "client-secret")
        .with_expiry(DateTime::from_timestamp(Utc::now().timestamp() - 600, 0).unwrap())
}

/// A granted record that is usable now and never expires.
pub fn live_credential() -> Credential {
    Credential::new("live-token", [GMAIL_SEND_SCOPE]).with_refresh_token("refresh-1")
}

/// File store that counts saves.
pub struct CountingStore {
    inner: FileCredentialStore,
    saves: AtomicUsize,
}

impl CountingStore {
    pub fn new(inner: FileCredentialStore) -> Self {
        Self {
            inner,
            saves: AtomicUsize::new(0),
        }
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn load(&self) -> StoreResult<Option<Credential>> {
        self.inner.load().await
    }

    async fn save(&self, credential: &Credential) -> StoreResult<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.inner.save(credential).await
    }

    async fn exists(&self) -> StoreResult<bool> {
        self.inner.exists().await
    }

    fn location(&self) -> String {
        self.inner.location()
    }
}

/// Token endpoint stand-in that counts exchanges and always succeeds.
pub struct CountingRefresher {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingRefresher {
    pub fn new(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenRefresher for CountingRefresher {
    async fn refresh_grant(&self, grant: &RefreshGrant) -> Result<RefreshedToken, ProviderError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        tokio::time::sleep(self.delay).await;
        Ok(RefreshedToken {
            access_token: format!("fresh-token-{n}"),
            expires_at: in_one_hour(),
            refresh_token: Some(format!("{}-rotated", grant.refresh_token)),
            scopes: None,
        })
    }
}

/// Refresher for paths that must never reach the token endpoint.
pub struct UnreachableRefresher;

#[async_trait]
impl TokenRefresher for UnreachableRefresher {
    async fn refresh_grant(&self, _grant: &RefreshGrant) -> Result<RefreshedToken, ProviderError> {
        Err(ProviderError::Connection("token endpoint unreachable".to_string()))
    }
}

/// How a [`FakeProvider`] answers sends.
pub enum SendBehaviour {
    Deliver,
    Fail(ProviderError),
    Stall,
}

/// Mail provider stand-in that records what it was asked to send.
pub struct FakeProvider {
    behaviour: SendBehaviour,
    sent: Mutex<Vec<(String, String)>>,
}

impl FakeProvider {
    pub fn new(behaviour: SendBehaviour) -> Arc<Self> {
        Arc::new(Self {
            behaviour,
            sent: Mutex::new(Vec::new()),
        })
    }

    /// `(access_token, raw)` pairs, in call order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailProvider for FakeProvider {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn send_raw(&self, access_token: &str, raw: &str) -> Result<SentMessage, ProviderError> {
        self.sent
            .lock()
            .unwrap()
            .push((access_token.to_string(), raw.to_string()));
        match &self.behaviour {
            SendBehaviour::Deliver => Ok(SentMessage {
                message_id: MessageId("msg-1".to_string()),
                thread_id: ThreadId("thread-1".to_string()),
            }),
            SendBehaviour::Fail(error) => Err(error.clone()),
            SendBehaviour::Stall => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}
