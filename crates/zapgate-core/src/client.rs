use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::{
    domain::{ChatAddress, OutboundMessage, SessionData},
    Result,
};

/// Lifecycle and traffic events emitted by the automation client.
#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// A pairing code was issued. May recur (codes expire) until one is
    /// scanned; every occurrence is meaningful.
    Qr { code: String },
    /// Pairing succeeded; carries the reusable credential bundle.
    Authenticated { session: SessionData },
    /// The client is fully operational.
    Ready,
    /// The account was unlinked or the connection dropped.
    Disconnected { reason: String },
    /// Incoming chat message.
    Message { from: ChatAddress, body: String },
}

/// Port for the external chat-automation client.
///
/// The gateway never implements the messaging protocol itself; everything
/// behind this trait lives in an adapter crate (or a test fake). The handle
/// is shared: the relay drives the lifecycle, the dispatcher sends.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Start the client and stream its events into `events`, in emission
    /// order. Called exactly once, at process start.
    async fn initialize(&self, events: mpsc::Sender<ClientEvent>) -> Result<()>;

    /// Deliver one message. Failures are returned verbatim; the caller
    /// decides what to surface.
    async fn send_message(&self, message: OutboundMessage) -> Result<serde_json::Value>;
}
