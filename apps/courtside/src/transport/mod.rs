use async_trait::async_trait;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::protocol::OutboundFrame;
use crate::subscription::Announcer;

pub mod memory;
pub mod websocket;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid push channel url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("push channel url must use ws:// or wss://, got {0}")]
    UnsupportedScheme(String),
    #[error("failed to open push channel: {0}")]
    Connect(String),
}

/// An open push channel. Text frames go out through `outbound`; inbound text
/// frames arrive on `inbound`, which yields `None` once the socket is closed.
pub struct Link {
    pub outbound: mpsc::UnboundedSender<String>,
    pub inbound: mpsc::UnboundedReceiver<String>,
    pub task: Option<JoinHandle<()>>,
}

impl Link {
    pub fn close(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Opens push channels. The connection manager dials through this seam so the
/// state machine can be driven without a live socket.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, uri: &str) -> Result<Link, TransportError>;
}

/// Sender half of the currently open channel, if any. Sends while nothing is
/// attached are dropped.
#[derive(Default)]
pub struct OutboundSlot {
    sender: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl OutboundSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, sender: mpsc::UnboundedSender<String>) {
        *self.sender.lock() = Some(sender);
    }

    pub fn detach(&self) {
        self.sender.lock().take();
    }

    pub fn is_attached(&self) -> bool {
        self.sender
            .lock()
            .as_ref()
            .map(|sender| !sender.is_closed())
            .unwrap_or(false)
    }

    /// Best-effort send; returns whether the frame was handed to an open channel.
    pub fn send_text(&self, text: String) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(text).is_ok(),
            None => false,
        }
    }
}

impl Announcer for OutboundSlot {
    fn announce(&self, frame: &OutboundFrame) -> bool {
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(err) => {
                debug!(target = "courtside::transport", error = %err, "failed to encode outbound frame");
                return false;
            }
        };
        let sent = self.send_text(text);
        if !sent {
            debug!(target = "courtside::transport", frame = ?frame, "channel not open; announce dropped");
        }
        sent
    }
}
