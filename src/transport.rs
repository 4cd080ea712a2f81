//! Duplex transport contract consumed by the correlation engine.
//!
//! Process lifecycle, stdio wiring, and line framing live behind this trait.
//! Implementations decode inbound bytes into [`serde_json::Value`] messages
//! and report unrecoverable read failures on a separate error channel; the
//! engine is the sole reader of both channels.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Channel pair returned by [`DuplexTransport::start_reading`]: decoded
/// inbound messages, and transport read errors.
pub type InboundChannels = (
    mpsc::Receiver<serde_json::Value>,
    mpsc::Receiver<crate::AppError>,
);

/// A bidirectional byte stream shared between data and control traffic.
///
/// Implemented by the process/stream layer (e.g. an NDJSON stdio pipe to a
/// spawned peer). The engine never touches the underlying stream directly.
pub trait DuplexTransport: Send + Sync {
    /// Begin decoding inbound traffic.
    ///
    /// Returns the decoded-message stream and the error stream. Closing the
    /// message stream signals end of input; a value on the error stream
    /// signals an unrecoverable read failure. Implementations should stop
    /// decoding when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) if reading
    /// cannot be started, including when called more than once.
    fn start_reading(&self, cancel: CancellationToken) -> Result<InboundChannels>;

    /// Write one encoded message to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Transport`](crate::AppError::Transport) if the
    /// write fails (e.g. the peer has gone away).
    fn send<'a>(&'a self, bytes: &'a [u8]) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}
