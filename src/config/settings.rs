//! Relay settings and configuration types.
//!
//! Settings are read from `settings.json` in the user's config directory (or
//! `$REMINDER_RELAY_CONFIG`) and then overridden by environment variables.
//!
//! Precedence: env vars > settings file > defaults.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::GMAIL_SEND_SCOPE;
use crate::providers::email::{GmailConfig, GMAIL_API_BASE, GOOGLE_TOKEN_URL};
use crate::services::{DEFAULT_SENDER_NAME, DEFAULT_SUBJECT};

/// Environment variable naming an explicit settings file.
pub const CONFIG_PATH_ENV: &str = "REMINDER_RELAY_CONFIG";

/// Errors raised while loading or validating settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file exists but could not be read.
    #[error("failed to read settings file {path}: {source}")]
    Read {
        /// Settings file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid JSON for [`Settings`].
    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        /// Settings file path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A setting has a value the relay cannot work with.
    #[error("invalid setting {field}: {reason}")]
    Invalid {
        /// Dotted path of the setting.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

/// Top-level relay settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Mail provider integration.
    pub provider: ProviderSettings,
    /// Where credentials and outcomes are kept.
    pub storage: StorageSettings,
    /// Message defaults.
    pub delivery: DeliverySettings,
    /// Network deadlines.
    pub timeouts: TimeoutSettings,
}

/// Gmail provider configuration.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Whether real delivery is attempted at all.
    pub enabled: bool,
    /// Gmail user API base URL.
    pub api_base: String,
    /// OAuth token endpoint.
    pub token_uri: String,
    /// OAuth client id, used when the stored grant does not carry one.
    pub client_id: Option<String>,
    /// OAuth client secret, used when the stored grant does not carry one.
    pub client_secret: Option<String>,
    /// `From` address placed on outgoing messages.
    pub sender_address: String,
    /// Scopes a stored grant must cover.
    pub required_scopes: BTreeSet<String>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: GMAIL_API_BASE.to_string(),
            token_uri: GOOGLE_TOKEN_URL.to_string(),
            client_id: None,
            client_secret: None,
            sender_address: "reminders@example.com".to_string(),
            required_scopes: BTreeSet::from([GMAIL_SEND_SCOPE.to_string()]),
        }
    }
}

impl std::fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("enabled", &self.enabled)
            .field("api_base", &self.api_base)
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("sender_address", &self.sender_address)
            .field("required_scopes", &self.required_scopes)
            .finish()
    }
}

/// Backend holding the credential record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialBackend {
    /// JSON file at `credential_path`.
    #[default]
    File,
    /// OS keychain entry under `keychain_service`.
    Keychain,
}

impl std::str::FromStr for CredentialBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keychain" => Ok(Self::Keychain),
            other => Err(format!("unknown credential backend {other:?}")),
        }
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    /// Which backend holds the credential record.
    pub credential_backend: CredentialBackend,
    /// Credential record path for the file backend.
    pub credential_path: PathBuf,
    /// Append-only outcome log path.
    pub outcome_log_path: PathBuf,
    /// Keychain service name for the keychain backend.
    pub keychain_service: String,
}

impl Default for StorageSettings {
    fn default() -> Self {
        let data_dir = Settings::data_dir();
        Self {
            credential_backend: CredentialBackend::File,
            credential_path: data_dir.join("token.json"),
            outcome_log_path: data_dir.join("email_logs.jsonl"),
            keychain_service: "io.reminder-relay".to_string(),
        }
    }
}

/// Message defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    /// Address used when a reminder names no recipient.
    pub fallback_recipient: String,
    /// Contact named in the footer when a reminder names none.
    pub sender_name: String,
    /// Subject used when a reminder has none.
    pub default_subject: String,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            fallback_recipient: "caregiver@example.com".to_string(),
            sender_name: DEFAULT_SENDER_NAME.to_string(),
            default_subject: DEFAULT_SUBJECT.to_string(),
        }
    }
}

/// Network deadlines, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    /// Deadline for a token refresh.
    pub refresh_timeout_secs: u64,
    /// Deadline for a send.
    pub send_timeout_secs: u64,
    /// Tokens expiring within this many seconds are refreshed early.
    pub expiry_skew_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            refresh_timeout_secs: 10,
            send_timeout_secs: 15,
            expiry_skew_secs: 60,
        }
    }
}

impl TimeoutSettings {
    /// Refresh deadline as a [`Duration`].
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs)
    }

    /// Send deadline as a [`Duration`].
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    /// Expiry skew as a [`Duration`].
    pub fn expiry_skew(&self) -> Duration {
        Duration::from_secs(self.expiry_skew_secs)
    }
}

impl Settings {
    /// Loads settings with precedence: env vars > settings file > defaults.
    ///
    /// A missing settings file is not an error.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Loads settings using a custom env resolver (for testing).
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let path = Self::config_path_with(&env);
        let mut settings = Self::load_from_file(&path)?;
        settings.apply_overrides(&env);
        Ok(settings)
    }

    /// Reads settings from `path`, returning defaults when it does not exist.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading settings from file");
                serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no settings file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Resolves the settings file path.
    fn config_path_with(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
        if let Some(path) = env(CONFIG_PATH_ENV).filter(|p| !p.trim().is_empty()) {
            return PathBuf::from(path);
        }
        ProjectDirs::from("io", "reminder-relay", "reminder-relay")
            .map(|dirs| dirs.config_dir().join("settings.json"))
            .unwrap_or_else(|| PathBuf::from("settings.json"))
    }

    /// Directory for the credential record and outcome log.
    fn data_dir() -> PathBuf {
        ProjectDirs::from("io", "reminder-relay", "reminder-relay")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Applies environment variable overrides.
    fn apply_overrides(&mut self, env: &impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            env: &impl Fn(&str) -> Option<String>,
            var: &'static str,
        ) -> Option<T> {
            let value = env(var)?;
            match value.trim().parse() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    tracing::warn!(var, value = %value, "ignoring invalid env override");
                    None
                }
            }
        }

        // Provider.
        if let Some(enabled) = env("REMINDER_RELAY_PROVIDER_ENABLED") {
            match enabled.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.provider.enabled = true,
                "0" | "false" | "no" | "off" => self.provider.enabled = false,
                _ => tracing::warn!(
                    var = "REMINDER_RELAY_PROVIDER_ENABLED",
                    value = %enabled,
                    "ignoring invalid env override"
                ),
            }
        }
        if let Some(v) = env("REMINDER_RELAY_API_BASE") {
            self.provider.api_base = v;
        }
        if let Some(v) = env("REMINDER_RELAY_TOKEN_URI") {
            self.provider.token_uri = v;
        }
        if let Some(v) = env("REMINDER_RELAY_CLIENT_ID") {
            self.provider.client_id = Some(v);
        }
        if let Some(v) = env("REMINDER_RELAY_CLIENT_SECRET") {
            self.provider.client_secret = Some(v);
        }
        if let Some(v) = env("REMINDER_RELAY_SENDER_ADDRESS") {
            self.provider.sender_address = v;
        }

        // Storage. The relay-specific variable wins over the legacy one.
        if let Some(backend) = parsed::<CredentialBackend>(env, "REMINDER_RELAY_CREDENTIAL_BACKEND") {
            self.storage.credential_backend = backend;
        }
        if let Some(v) = env("REMINDER_RELAY_CREDENTIAL_PATH").or_else(|| env("GMAIL_TOKEN_FILE")) {
            self.storage.credential_path = PathBuf::from(v);
        }
        if let Some(v) = env("REMINDER_RELAY_OUTCOME_LOG") {
            self.storage.outcome_log_path = PathBuf::from(v);
        }
        if let Some(v) = env("REMINDER_RELAY_KEYCHAIN_SERVICE") {
            self.storage.keychain_service = v;
        }

        // Delivery.
        if let Some(v) = env("REMINDER_RELAY_FALLBACK_RECIPIENT") {
            self.delivery.fallback_recipient = v;
        }
        if let Some(v) = env("REMINDER_RELAY_SENDER_NAME") {
            self.delivery.sender_name = v;
        }

        // Timeouts.
        if let Some(n) = parsed(env, "REMINDER_RELAY_REFRESH_TIMEOUT_SECS") {
            self.timeouts.refresh_timeout_secs = n;
        }
        if let Some(n) = parsed(env, "REMINDER_RELAY_SEND_TIMEOUT_SECS") {
            self.timeouts.send_timeout_secs = n;
        }
        if let Some(n) = parsed(env, "REMINDER_RELAY_EXPIRY_SKEW_SECS") {
            self.timeouts.expiry_skew_secs = n;
        }
    }

    /// Checks that the settings can drive a dispatcher.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery.fallback_recipient.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "delivery.fallback_recipient",
                reason: "must not be empty".to_string(),
            });
        }
        if self.timeouts.refresh_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts.refresh_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.timeouts.send_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "timeouts.send_timeout_secs",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.provider.enabled {
            validate_url("provider.api_base", &self.provider.api_base)?;
            validate_url("provider.token_uri", &self.provider.token_uri)?;
            if self.provider.sender_address.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "provider.sender_address",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Builds the Gmail client configuration.
    pub fn gmail_config(&self) -> GmailConfig {
        GmailConfig {
            api_base: self.provider.api_base.trim_end_matches('/').to_string(),
            token_uri: self.provider.token_uri.clone(),
            client_id: self.provider.client_id.clone(),
            client_secret: self.provider.client_secret.clone(),
            refresh_timeout: self.timeouts.refresh_timeout(),
            send_timeout: self.timeouts.send_timeout(),
        }
    }
}

fn validate_url(field: &'static str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| ConfigError::Invalid {
        field,
        reason: format!("{value:?} is not a valid URL: {e}"),
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(ConfigError::Invalid {
            field,
            reason: format!("unsupported URL scheme {scheme:?}"),
        }),
    }
}
