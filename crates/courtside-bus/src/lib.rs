//! Topic bus used by the sync client to hand user-visible notices (toasts,
//! mutation errors, league activity signals) to whatever UI is listening.
//!
//! Payloads travel as JSON envelopes `{ "type": <kind>, "payload": <body> }`.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub const TOPIC_TOAST: &str = "courtside.ui.toast";
pub const TOPIC_ERROR: &str = "courtside.ui.error";
pub const TOPIC_LEAGUE_ACTIVITY: &str = "courtside.league.activity";

pub const UI_TOPICS: &[&str] = &[TOPIC_TOAST, TOPIC_ERROR, TOPIC_LEAGUE_ACTIVITY];

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    pub topic: String,
    pub payload: Bytes,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("no subscribers on topic {0}")]
    NoSubscribers(String),
    #[error("envelope encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type BusResult<T> = Result<T, BusError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: T,
}

/// Encodes `payload` as a `{ "type", "payload" }` envelope.
pub fn encode_envelope<T: Serialize>(kind: &str, payload: &T) -> BusResult<Bytes> {
    let body = serde_json::to_vec(&Envelope {
        kind: kind.to_string(),
        payload,
    })?;
    Ok(Bytes::from(body))
}

impl BusMessage {
    /// Decodes the JSON envelope carried by this message.
    pub fn decode<T: DeserializeOwned>(&self) -> BusResult<Envelope<T>> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

pub trait Bus: Send + Sync {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage>;
    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()>;

    /// Wraps `payload` in an envelope tagged with `kind` and publishes it.
    fn publish_envelope<T: Serialize>(&self, topic: &str, kind: &str, payload: &T) -> BusResult<()>
    where
        Self: Sized,
    {
        self.publish(topic, encode_envelope(kind, payload)?)
    }
}

/// Broadcast-backed bus, one channel per topic created on first use.
#[derive(Debug, Default)]
pub struct LocalBus {
    topics: parking_lot::RwLock<std::collections::HashMap<String, broadcast::Sender<BusMessage>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }

    fn sender_for(&self, topic: &str) -> broadcast::Sender<BusMessage> {
        if let Some(sender) = self.topics.read().get(topic) {
            return sender.clone();
        }
        let mut guard = self.topics.write();
        guard
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Bus for LocalBus {
    fn subscribe(&self, topic: &str) -> broadcast::Receiver<BusMessage> {
        self.sender_for(topic).subscribe()
    }

    fn publish(&self, topic: &str, payload: Bytes) -> BusResult<()> {
        self.sender_for(topic)
            .send(BusMessage {
                topic: topic.to_string(),
                payload,
            })
            .map(|_| ())
            .map_err(|_| BusError::NoSubscribers(topic.to_string()))
    }
}
