//! Connection trait: the transport boundary between the bot and a chat service.

use crate::message::Message;
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Unrecoverable transport failure. The bot stops on the first one it receives.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed: {0}")]
    Closed(String),
    #[error("chat service rejected the request: {0}")]
    Api(String),
    #[error("chat service request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Sink a connection reports fatal errors on.
pub type ErrorSink = mpsc::UnboundedSender<ConnectionError>;

/// A transport (terminal, chat service socket, ...).
///
/// `start` returns the inbound stream the bot reads and the outbound sink it writes.
/// Inbound ids must be unique among the connection's open turns; the connection keeps
/// whatever context it needs per id and drops it once it sees the final message for that id.
#[async_trait]
pub trait Connection: Send {
    /// Connection id (e.g. "stdio", "slack").
    fn id(&self) -> &str;

    /// Start the reader and writer tasks.
    fn start(&mut self, errors: ErrorSink) -> (mpsc::Receiver<Message>, mpsc::Sender<Message>);

    /// Called after the bot has dropped the outbound sink; wait for pending writes to flush.
    async fn finish(&mut self) {}
}
