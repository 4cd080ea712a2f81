//! Protocol configuration parsing and validation.

use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_request_timeout_seconds() -> u64 {
    60
}

fn default_initialize_timeout_seconds() -> u64 {
    30
}

fn default_message_queue_capacity() -> usize {
    256
}

fn default_max_pending_requests() -> usize {
    1024
}

fn default_client_name() -> String {
    "agent-conduit".into()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").into()
}

/// Tuning knobs for the correlation engine and session layer.
///
/// Parsed from TOML by the embedding application; every field has a default
/// so an empty document yields a usable configuration.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ProtocolConfig {
    /// Default deadline for a sent control request (seconds).
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
    /// Deadline for the session `initialize` exchange (seconds).
    #[serde(default = "default_initialize_timeout_seconds")]
    pub initialize_timeout_seconds: u64,
    /// Capacity of the bounded queue forwarding non-control messages
    /// to consumers.
    #[serde(default = "default_message_queue_capacity")]
    pub message_queue_capacity: usize,
    /// Maximum simultaneously pending sent requests; further sends are
    /// refused until responses arrive.
    #[serde(default = "default_max_pending_requests")]
    pub max_pending_requests: usize,
    /// Name advertised as `clientInfo` during the session `initialize`
    /// exchange.
    #[serde(default = "default_client_name")]
    pub client_name: String,
    /// Version advertised alongside [`client_name`](Self::client_name).
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            request_timeout_seconds: default_request_timeout_seconds(),
            initialize_timeout_seconds: default_initialize_timeout_seconds(),
            message_queue_capacity: default_message_queue_capacity(),
            max_pending_requests: default_max_pending_requests(),
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }
}

impl ProtocolConfig {
    /// Parse a configuration from a TOML document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the document is not valid TOML or a
    /// field fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field values.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if a timeout or capacity is zero.
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_seconds == 0 {
            return Err(AppError::Config(
                "request_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.initialize_timeout_seconds == 0 {
            return Err(AppError::Config(
                "initialize_timeout_seconds must be greater than zero".into(),
            ));
        }
        if self.message_queue_capacity == 0 {
            return Err(AppError::Config(
                "message_queue_capacity must be greater than zero".into(),
            ));
        }
        if self.max_pending_requests == 0 {
            return Err(AppError::Config(
                "max_pending_requests must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Default deadline for a sent control request.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Deadline for the session `initialize` exchange.
    #[must_use]
    pub fn initialize_timeout(&self) -> Duration {
        Duration::from_secs(self.initialize_timeout_seconds)
    }
}
