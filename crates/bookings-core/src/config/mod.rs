//! Replica configuration.
//!
//! Provides a single `ReplicaConfig` shared by the library and the CLI.
//! Values come from defaults, an optional JSON file, and `BOOKINGS_*`
//! environment overrides, applied in that order.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::models::{ContextId, IdStrategy};
use crate::seed::SEED_CONTEXT;
use crate::util::normalize_text_option;

pub const DEFAULT_CHANNEL_NAME: &str = "bookings";
pub const DEFAULT_SYNC_TIMEOUT_MS: u64 = 300;
pub const DEFAULT_STALE_LOG_CAPACITY: usize = 100;

pub const ENV_CHANNEL: &str = "BOOKINGS_CHANNEL";
pub const ENV_CONTEXT_ID: &str = "BOOKINGS_CONTEXT_ID";
pub const ENV_ID_STRATEGY: &str = "BOOKINGS_ID_STRATEGY";
pub const ENV_SYNC_TIMEOUT_MS: &str = "BOOKINGS_SYNC_TIMEOUT_MS";
pub const ENV_SEED_ON_EMPTY: &str = "BOOKINGS_SEED_ON_EMPTY";

/// Settings for one replica.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct ReplicaConfig {
    /// Logical channel shared by all contexts of a session
    pub channel_name: String,
    /// Fixed context id; a random one is generated when absent
    pub context_id: Option<String>,
    pub id_strategy: IdStrategy,
    /// How long a new context waits for a peer snapshot
    pub sync_timeout_ms: u64,
    /// Load seed bookings when no peer answers and the store is empty
    pub seed_on_empty: bool,
    pub stale_log_capacity: usize,
}

impl Default for ReplicaConfig {
    fn default() -> Self {
        Self {
            channel_name: DEFAULT_CHANNEL_NAME.to_string(),
            context_id: None,
            id_strategy: IdStrategy::default(),
            sync_timeout_ms: DEFAULT_SYNC_TIMEOUT_MS,
            seed_on_empty: true,
            stale_log_capacity: DEFAULT_STALE_LOG_CAPACITY,
        }
    }
}

impl ReplicaConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(payload: &str) -> Result<Self> {
        let mut config: Self = serde_json::from_str(payload)
            .map_err(|error| Error::Config(format!("invalid replica config JSON: {error}")))?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw).map_err(|error| match error {
            Error::Config(message) => Error::Config(format!("{}: {message}", path.display())),
            other => other,
        })
    }

    /// Apply `BOOKINGS_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(channel) = normalize_text_option(lookup(ENV_CHANNEL)) {
            self.channel_name = channel;
        }
        if let Some(context) = normalize_text_option(lookup(ENV_CONTEXT_ID)) {
            self.context_id = Some(context);
        }
        if let Some(strategy) = normalize_text_option(lookup(ENV_ID_STRATEGY)) {
            self.id_strategy = strategy.parse()?;
        }
        if let Some(timeout) = normalize_text_option(lookup(ENV_SYNC_TIMEOUT_MS)) {
            self.sync_timeout_ms = timeout.parse().map_err(|_| {
                Error::Config(format!("{ENV_SYNC_TIMEOUT_MS} must be a whole number of ms"))
            })?;
        }
        if let Some(flag) = normalize_text_option(lookup(ENV_SEED_ON_EMPTY)) {
            self.seed_on_empty = parse_flag(&flag).ok_or_else(|| {
                Error::Config(format!("{ENV_SEED_ON_EMPTY} must be true or false"))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.channel_name.trim().is_empty() {
            return Err(Error::Config("channel_name must not be empty".to_string()));
        }
        if self.context_id.as_deref() == Some(SEED_CONTEXT) {
            return Err(Error::Config(format!(
                "context_id '{SEED_CONTEXT}' is reserved for seed data"
            )));
        }
        Ok(())
    }

    #[must_use]
    pub const fn sync_timeout(&self) -> Duration {
        Duration::from_millis(self.sync_timeout_ms)
    }

    /// Configured context id, or a freshly generated one
    #[must_use]
    pub fn resolve_context_id(&self) -> ContextId {
        self.context_id
            .as_deref()
            .map_or_else(ContextId::generate, ContextId::new)
    }

    fn normalize(&mut self) {
        self.channel_name = self.channel_name.trim().to_string();
        self.context_id = normalize_text_option(self.context_id.take());
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
