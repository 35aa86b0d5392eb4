use std::sync::Arc;

use courtside_bus::{
    encode_envelope, Bus, BusError, TOPIC_ERROR, TOPIC_LEAGUE_ACTIVITY, TOPIC_TOAST,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::cache::reconcile::Toast;

/// User-visible report of a rejected optimistic change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub mutation: String,
    pub message: String,
}

/// Side-channel signal that a league activity event arrived. Not a cache write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivitySignal {
    pub league_id: String,
    pub event_id: String,
    pub kind: String,
    pub actor_name: String,
}

/// Publishes UI notices on the session bus. Nobody listening is normal for a
/// headless session and only logged at debug level.
#[derive(Clone)]
pub struct NoticePublisher {
    bus: Arc<dyn Bus>,
}

impl NoticePublisher {
    pub fn new(bus: Arc<dyn Bus>) -> Self {
        Self { bus }
    }

    pub fn toast(&self, toast: &Toast) {
        self.publish(TOPIC_TOAST, "toast", toast);
    }

    pub fn error(&self, notice: &ErrorNotice) {
        self.publish(TOPIC_ERROR, "error", notice);
    }

    pub fn activity(&self, signal: &ActivitySignal) {
        self.publish(TOPIC_LEAGUE_ACTIVITY, "league_activity", signal);
    }

    fn publish<T: Serialize>(&self, topic: &str, kind: &str, payload: &T) {
        let result = encode_envelope(kind, payload).and_then(|body| self.bus.publish(topic, body));
        match result {
            Ok(()) => debug!(target = "courtside::notices", topic, kind, "published notice"),
            Err(BusError::NoSubscribers(_)) => {
                debug!(target = "courtside::notices", topic, kind, "no notice subscribers")
            }
            Err(err) => {
                warn!(target = "courtside::notices", topic, kind, error = %err, "failed to publish notice")
            }
        }
    }
}
