//! Inbound frame dispatch.

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::cache::reconcile::{
    ingest_notification, merge_activity_event, ActivityMerge, NotificationMerge, ToastGate,
};
use crate::cache::SharedCache;
use crate::metrics;
use crate::model::{ActivityEvent, CachedNotification, NotificationKind};
use crate::notices::{ActivitySignal, NoticePublisher};
use crate::protocol::{InboundFrame, EVENT_LEAGUE_ACTIVITY, EVENT_NOTIFICATION_NEW};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    Malformed,
    UnknownEvent,
    InvalidPayload,
}

impl DropReason {
    pub fn label(self) -> &'static str {
        match self {
            DropReason::Malformed => "malformed",
            DropReason::UnknownEvent => "unknown_event",
            DropReason::InvalidPayload => "invalid_payload",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Notification(NotificationMerge),
    Activity(ActivityMerge),
    Dropped(DropReason),
}

type Handler = fn(&EventRouter, Value) -> RouteOutcome;

const ROUTES: &[(&str, Handler)] = &[
    (EVENT_NOTIFICATION_NEW, EventRouter::on_notification as Handler),
    (EVENT_LEAGUE_ACTIVITY, EventRouter::on_league_activity as Handler),
];

pub struct EventRouter {
    cache: SharedCache,
    toasts: Mutex<ToastGate>,
    notices: NoticePublisher,
}

impl EventRouter {
    pub fn new(
        cache: SharedCache,
        toast_kinds: impl IntoIterator<Item = NotificationKind>,
        notices: NoticePublisher,
    ) -> Self {
        Self {
            cache,
            toasts: Mutex::new(ToastGate::new(toast_kinds)),
            notices,
        }
    }

    /// Routes one raw push frame. Frames that cannot be applied are dropped
    /// and never surfaced to the caller as errors.
    pub fn route(&self, raw: &str) -> RouteOutcome {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(target = "courtside::router", error = %err, "dropping malformed frame");
                return self.dropped(DropReason::Malformed);
            }
        };

        let Some((_, handler)) = ROUTES.iter().find(|(event, _)| *event == frame.event) else {
            debug!(target = "courtside::router", event = %frame.event, "dropping unknown event");
            return self.dropped(DropReason::UnknownEvent);
        };

        let outcome = handler(self, frame.data);
        if !matches!(outcome, RouteOutcome::Dropped(_)) {
            metrics::FRAMES_ROUTED
                .with_label_values(&[frame.event.as_str()])
                .inc();
        }
        outcome
    }

    fn on_notification(&self, data: Value) -> RouteOutcome {
        let notification: CachedNotification = match serde_json::from_value(data) {
            Ok(notification) => notification,
            Err(err) => {
                warn!(target = "courtside::router", error = %err, "notification payload did not decode");
                return self.dropped(DropReason::InvalidPayload);
            }
        };

        let toast = self.toasts.lock().admit(&notification);
        let merge = ingest_notification(&mut self.cache.lock(), notification);
        trace!(
            target = "courtside::router",
            inserted = merge.inserted,
            counter = ?merge.counter,
            "notification merged"
        );

        if let Some(toast) = toast {
            self.notices.toast(&toast);
        }
        RouteOutcome::Notification(merge)
    }

    fn on_league_activity(&self, data: Value) -> RouteOutcome {
        let event: ActivityEvent = match serde_json::from_value(data) {
            Ok(event) => event,
            Err(err) => {
                warn!(target = "courtside::router", error = %err, "activity payload did not decode");
                return self.dropped(DropReason::InvalidPayload);
            }
        };

        let merge = merge_activity_event(&mut self.cache.lock(), &event);
        if !merge.is_duplicate() {
            self.notices.activity(&ActivitySignal {
                league_id: event.scope.clone(),
                event_id: event.id.clone(),
                kind: event.kind.clone(),
                actor_name: event.actor_name.clone(),
            });
        }
        trace!(
            target = "courtside::router",
            league = %event.scope,
            matched = merge.matched,
            inserted = merge.inserted,
            "activity merged"
        );
        RouteOutcome::Activity(merge)
    }

    fn dropped(&self, reason: DropReason) -> RouteOutcome {
        metrics::FRAMES_DROPPED
            .with_label_values(&[reason.label()])
            .inc();
        RouteOutcome::Dropped(reason)
    }
}
