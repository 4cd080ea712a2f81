//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
///
/// Correlation failures (`Timeout`, `Stopped`, `Cancelled`) are distinct
/// variants so callers of
/// [`CorrelationEngine::send_request`](crate::engine::CorrelationEngine::send_request)
/// can match on the failure kind. `Clone` is required because the engine's
/// single recorded fatal error is handed to every waiter it unblocks.
#[derive(Debug, Clone)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The duplex transport failed to read or write.
    Transport(String),
    /// A sent control request received no response within its deadline.
    Timeout(String),
    /// The engine stopped before a response arrived.
    Stopped(String),
    /// The caller cancelled the request before a response arrived.
    Cancelled(String),
    /// The peer answered a control request with an error response;
    /// carries the peer's message unmodified.
    Peer(String),
    /// A registered handler or user callback failed while processing a
    /// peer-initiated request.
    Handler(String),
    /// Malformed or unroutable control traffic.
    Protocol(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Stopped(msg) => write!(f, "stopped: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::Peer(msg) | Self::Handler(msg) => write!(f, "{msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Protocol(format!("malformed json: {err}"))
    }
}
