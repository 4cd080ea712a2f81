#![forbid(unsafe_code)]

//! Bidirectional control-message correlation engine for agent sessions.
//!
//! Turns a single duplex byte stream shared between free-form data messages
//! and structured control traffic into independently awaitable
//! request/response exchanges, with peer-initiated request handling and
//! cooperative cancellation. See [`engine::CorrelationEngine`] for the
//! correlation core and [`session::Session`] for the protocol handlers
//! built on top of it.

pub mod config;
pub mod engine;
pub mod errors;
pub mod protocol;
pub mod session;
pub mod transport;

pub use config::ProtocolConfig;
pub use errors::{AppError, Result};
