//! Transport seam between the session controller and the remote service.
//!
//! A [`Connector`] opens one message-oriented, bidirectional link and
//! delivers it as a channel pair. The controller never touches sockets
//! directly, which keeps the session logic testable against an in-memory
//! connector.

pub mod messages;
pub mod ws;

pub use messages::{ClientMessage, EncodedChunk, ServerMessage, SetupPayload};
pub use ws::WsConnector;

use crate::error::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// A connected transport as seen by the session controller.
pub struct TransportLink {
    /// Outbound messages. Dropping this half (or cancelling the session
    /// token) shuts the link down; sends after that are discarded.
    pub outbound: mpsc::Sender<ClientMessage>,
    /// Inbound messages in arrival order. `None` means the transport closed.
    pub inbound: mpsc::Receiver<ServerMessage>,
}

/// Opens transports for new sessions.
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open the transport and deliver the session setup as the first message.
    ///
    /// The returned link stays alive until the peer closes or `cancel` fires.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::Transport` when the connection cannot be
    /// established.
    async fn connect(
        &self,
        setup: SetupPayload,
        outbound_capacity: usize,
        cancel: CancellationToken,
    ) -> Result<TransportLink>;
}
