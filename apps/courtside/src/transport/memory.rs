//! In-process connector used by tests and demos. Each accepted dial hands the
//! server side of the link to whoever holds the `MemoryServer`.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;

use super::{Connector, Link, TransportError};

#[derive(Debug, Clone)]
pub struct Dial {
    pub uri: String,
    pub at: Instant,
    pub accepted: bool,
}

#[derive(Default)]
struct MemoryState {
    refusals: VecDeque<String>,
    dials: Vec<Dial>,
}

/// Server side of one accepted link.
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    /// Pushes a raw text frame to the client; false once the client is gone.
    pub fn push(&self, text: impl Into<String>) -> bool {
        self.to_client.send(text.into()).is_ok()
    }

    pub async fn next_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub fn try_next_frame(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Drops the server side, which the client observes as a close.
    pub fn close(self) {}
}

pub struct MemoryServer {
    accepted: mpsc::UnboundedReceiver<ServerEnd>,
}

impl MemoryServer {
    pub async fn accept(&mut self) -> Option<ServerEnd> {
        self.accepted.recv().await
    }
}

#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl MemoryConnector {
    pub fn new() -> (Self, MemoryServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                state: Arc::new(Mutex::new(MemoryState::default())),
                accepted: tx,
            },
            MemoryServer { accepted: rx },
        )
    }

    /// Makes the next `count` dials fail.
    pub fn refuse_next(&self, count: usize) {
        let mut state = self.state.lock();
        for _ in 0..count {
            state.refusals.push_back("connection refused".to_string());
        }
    }

    pub fn dials(&self) -> Vec<Dial> {
        self.state.lock().dials.clone()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, uri: &str) -> Result<Link, TransportError> {
        let refusal = {
            let mut state = self.state.lock();
            let refusal = state.refusals.pop_front();
            state.dials.push(Dial {
                uri: uri.to_string(),
                at: Instant::now(),
                accepted: refusal.is_none(),
            });
            refusal
        };
        if let Some(reason) = refusal {
            return Err(TransportError::Connect(reason));
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        self.accepted
            .send(ServerEnd {
                to_client,
                from_client,
            })
            .map_err(|_| TransportError::Connect("memory server dropped".to_string()))?;

        Ok(Link {
            outbound,
            inbound,
            task: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn accepted_link_carries_frames_both_ways() {
        let (connector, mut server) = MemoryConnector::new();
        let mut link = connector.connect("ws://memory/ws?token=t").await.expect("accepted");
        let mut end = server.accept().await.expect("server end");

        assert!(end.push("hello"));
        assert_eq!(link.inbound.recv().await.as_deref(), Some("hello"));
        link.outbound.send("ping".into()).expect("send");
        assert_eq!(end.next_frame().await.as_deref(), Some("ping"));

        end.close();
        assert_eq!(link.inbound.recv().await, None);
    }

    #[tokio::test]
    async fn refusals_are_recorded() {
        let (connector, _server) = MemoryConnector::new();
        connector.refuse_next(1);
        assert!(connector.connect("ws://memory/ws").await.is_err());
        assert!(connector.connect("ws://memory/ws").await.is_ok());
        let dials = connector.dials();
        assert_eq!(dials.len(), 2);
        assert!(!dials[0].accepted);
        assert!(dials[1].accepted);
    }
}
