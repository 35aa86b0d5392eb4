//! Desired league subscriptions.
//!
//! The registry records what the client wants to hear about; it never tracks
//! server acknowledgements. Announces are best effort and correctness after a
//! drop comes from `replay`, which the connection manager runs on every open.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::protocol::OutboundFrame;

/// Outbound side the registry announces through.
pub trait Announcer: Send + Sync {
    /// Returns whether the frame reached an open channel.
    fn announce(&self, frame: &OutboundFrame) -> bool;
}

pub struct SubscriptionRegistry {
    desired: Mutex<BTreeSet<String>>,
    announcer: Arc<dyn Announcer>,
}

impl SubscriptionRegistry {
    pub fn new(announcer: Arc<dyn Announcer>) -> Self {
        Self {
            desired: Mutex::new(BTreeSet::new()),
            announcer,
        }
    }

    /// Adds `scope` to the desired set and announces it. Returns whether the
    /// scope was newly added.
    pub fn subscribe(&self, scope: &str) -> bool {
        let added = self.desired.lock().insert(scope.to_string());
        let sent = self.announcer.announce(&OutboundFrame::subscribe(scope));
        debug!(target = "courtside::subscription", scope, added, sent, "subscribe");
        added
    }

    /// Removes `scope` from the desired set and announces the removal. Returns
    /// whether the scope was present.
    pub fn unsubscribe(&self, scope: &str) -> bool {
        let removed = self.desired.lock().remove(scope);
        let sent = self.announcer.announce(&OutboundFrame::unsubscribe(scope));
        debug!(target = "courtside::subscription", scope, removed, sent, "unsubscribe");
        removed
    }

    /// Re-announces every desired scope. Returns how many announces reached
    /// the channel.
    pub fn replay(&self) -> usize {
        let scopes = self.scopes();
        let sent = scopes
            .iter()
            .filter(|scope| self.announcer.announce(&OutboundFrame::subscribe(scope.as_str())))
            .count();
        debug!(
            target = "courtside::subscription",
            desired = scopes.len(),
            sent,
            "replayed subscriptions"
        );
        sent
    }

    pub fn scopes(&self) -> Vec<String> {
        self.desired.lock().iter().cloned().collect()
    }

    pub fn contains(&self, scope: &str) -> bool {
        self.desired.lock().contains(scope)
    }

    pub fn clear(&self) {
        self.desired.lock().clear();
    }
}
