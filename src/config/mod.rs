//! Configuration and settings management.
//!
//! Settings are stored in the user's config directory as JSON and may be
//! overridden by `REMINDER_RELAY_*` environment variables.

mod settings;

pub use settings::{
    ConfigError, CredentialBackend, DeliverySettings, ProviderSettings, Settings, StorageSettings,
    TimeoutSettings, CONFIG_PATH_ENV,
};
