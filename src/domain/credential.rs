//! Delegated OAuth credential record.
//!
//! The on-disk shape matches the "authorized user" token file written by the
//! Google consent tooling, so a `token.json` produced by the external consent
//! flow can be consumed as-is.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Scope that grants permission to send mail on the user's behalf.
pub const GMAIL_SEND_SCOPE: &str = "https://www.googleapis.com/auth/gmail.send";

/// A delegated authorization grant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Bearer token presented to the provider.
    #[serde(rename = "token", alias = "access_token")]
    pub access_token: String,
    /// Long-lived token used to mint new access tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Token endpoint the grant was issued by.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    /// OAuth client the grant belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Secret of the OAuth client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Scopes granted by the user.
    #[serde(default, alias = "scope", deserialize_with = "scopes_serde::deserialize")]
    pub scopes: BTreeSet<String>,
    /// When the access token stops being accepted. `None` means unknown.
    #[serde(default, with = "expiry_serde", skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Token type, normally `Bearer`.
    #[serde(default = "default_token_type")]
    pub token_type: String,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"[REDACTED]")
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .field("token_type", &self.token_type)
            .finish()
    }
}

/// Why a loaded record cannot be used for provider calls.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialDefect {
    /// The record carries no access token.
    #[error("credential has an empty access token")]
    EmptyAccessToken,

    /// The grant does not cover every scope the dispatcher needs.
    #[error("credential is missing required scopes: {}", .0.join(", "))]
    MissingScopes(Vec<String>),
}

impl Credential {
    /// Creates a bearer credential with the given access token and scopes.
    pub fn new(
        access_token: impl Into<String>,
        scopes: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            token_uri: None,
            client_id: None,
            client_secret: None,
            scopes: scopes.into_iter().map(Into::into).collect(),
            expiry: None,
            token_type: default_token_type(),
        }
    }

    /// Sets the refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    /// Sets the access token expiry.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Sets the OAuth client the grant was issued to.
    pub fn with_client(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = Some(client_id.into());
        self.client_secret = Some(client_secret.into());
        self
    }

    /// Checks that the record is structurally usable for the required scopes.
    ///
    /// Expiry is not part of validation; see [`Credential::is_expired_at`].
    pub fn validate(&self, required_scopes: &BTreeSet<String>) -> Result<(), CredentialDefect> {
        if self.access_token.trim().is_empty() {
            return Err(CredentialDefect::EmptyAccessToken);
        }

        let missing: Vec<String> = required_scopes
            .difference(&self.scopes)
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(CredentialDefect::MissingScopes(missing));
        }

        Ok(())
    }

    /// Returns whether the access token is expired at `now`, treating tokens
    /// that expire within `skew` as already expired.
    ///
    /// A record without an expiry never counts as expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self.expiry {
            Some(expiry) => expiry.signed_duration_since(now) <= skew,
            None => false,
        }
    }

    /// Returns the refresh token if one is present and non-blank.
    pub fn usable_refresh_token(&self) -> Option<&str> {
        self.refresh_token
            .as_deref()
            .filter(|token| !token.trim().is_empty())
    }
}

mod scopes_serde {
    use std::collections::BTreeSet;

    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ScopeRepr {
        List(Vec<String>),
        Joined(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let scopes = match ScopeRepr::deserialize(deserializer)? {
            ScopeRepr::List(list) => list,
            ScopeRepr::Joined(joined) => joined.split_whitespace().map(str::to_owned).collect(),
        };
        Ok(scopes
            .into_iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect())
    }
}

mod expiry_serde {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(expiry: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match expiry {
            Some(at) => serializer.serialize_str(&at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }

        if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Some(at.with_timezone(&Utc)));
        }

        // Offset-less timestamps are written in UTC by the consent tooling.
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| Some(naive.and_utc()))
            .map_err(|e| serde::de::Error::custom(format!("invalid expiry {raw:?}: {e}")))
    }
}
