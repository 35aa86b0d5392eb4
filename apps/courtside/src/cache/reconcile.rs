//! Merge functions shared by every producer that writes pushed or polled
//! records into the cache. They touch nothing but the cache they are given and
//! are idempotent under redelivery.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;

use super::{CacheValue, QueryCache, QueryKey};
use crate::model::{ActivityEvent, CachedNotification, NotificationKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUpdate {
    Unchanged,
    Incremented(u64),
    /// No numeric counter is cached; the counter query must be invalidated.
    Invalidate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationMerge {
    pub inserted: bool,
    pub counter: CounterUpdate,
    /// Keys the caller has to invalidate because their value could not be
    /// derived locally.
    pub invalidate: Vec<QueryKey>,
}

impl NotificationMerge {
    pub fn is_duplicate(&self) -> bool {
        !self.inserted && self.invalidate.is_empty()
    }
}

/// Prepends `incoming` to the cached notification list unless its id is
/// already present, and bumps a cached unread counter for new unread items.
///
/// A list that is not cached stays uncached; both list and counter are then
/// reported for invalidation, since nothing local can tell whether the
/// notification was already counted.
pub fn merge_notification(cache: &mut QueryCache, incoming: CachedNotification) -> NotificationMerge {
    let unread = !incoming.read;
    let Some(list) = cache.notifications_mut() else {
        // A cached counter is not bumped on its own here: without the list
        // there is no way to tell a redelivery from a new item.
        return NotificationMerge {
            inserted: false,
            counter: CounterUpdate::Invalidate,
            invalidate: vec![QueryKey::notification_list(), QueryKey::unread_count()],
        };
    };

    if list.iter().any(|existing| existing.id == incoming.id) {
        return NotificationMerge {
            inserted: false,
            counter: CounterUpdate::Unchanged,
            invalidate: Vec::new(),
        };
    }
    list.insert(0, incoming);

    if !unread {
        return NotificationMerge {
            inserted: true,
            counter: CounterUpdate::Unchanged,
            invalidate: Vec::new(),
        };
    }

    match cache.unread_count() {
        Some(count) => {
            let next = count.saturating_add(1);
            cache.replace_unread_count(next);
            NotificationMerge {
                inserted: true,
                counter: CounterUpdate::Incremented(next),
                invalidate: Vec::new(),
            }
        }
        None => NotificationMerge {
            inserted: true,
            counter: CounterUpdate::Invalidate,
            invalidate: vec![QueryKey::unread_count()],
        },
    }
}

/// Merges and applies the invalidations the merge asked for.
pub fn ingest_notification(cache: &mut QueryCache, incoming: CachedNotification) -> NotificationMerge {
    let merge = merge_notification(cache, incoming);
    for key in &merge.invalidate {
        cache.invalidate(key);
    }
    merge
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActivityMerge {
    /// Cached feed variants under the event's scope.
    pub matched: usize,
    /// Variants that received the event on their first page.
    pub inserted: usize,
}

impl ActivityMerge {
    pub fn is_duplicate(&self) -> bool {
        self.matched > 0 && self.inserted == 0
    }
}

/// Prepends `incoming` to page 0 of every cached feed variant of its scope
/// that does not already hold the id on any page. Pages after the first are
/// left as the same allocations.
pub fn merge_activity_event(cache: &mut QueryCache, incoming: &ActivityEvent) -> ActivityMerge {
    let scope = QueryKey::league_activity_scope(&incoming.scope);
    let mut merge = ActivityMerge::default();

    for key in cache.keys_with_prefix(&scope) {
        let Some(CacheValue::ActivityFeed(feed)) = cache.get_mut(&key) else {
            continue;
        };
        merge.matched += 1;
        if feed.contains(&incoming.id) {
            continue;
        }
        let Some(first) = feed.pages.first_mut() else {
            continue;
        };
        Arc::make_mut(first).items.insert(0, incoming.clone());
        merge.inserted += 1;
    }
    merge
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    /// Idempotency key, `notification:<id>`.
    pub key: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub link: Option<String>,
}

const TOAST_MEMORY: usize = 512;

/// Decides which notifications raise a toast. Only allow-listed kinds pass and
/// each idempotency key passes once.
#[derive(Debug)]
pub struct ToastGate {
    allowed: HashSet<NotificationKind>,
    shown: HashSet<String>,
    order: VecDeque<String>,
}

impl ToastGate {
    pub fn new(allowed: impl IntoIterator<Item = NotificationKind>) -> Self {
        Self {
            allowed: allowed.into_iter().collect(),
            shown: HashSet::new(),
            order: VecDeque::new(),
        }
    }

    pub fn idempotency_key(notification: &CachedNotification) -> String {
        format!("notification:{}", notification.id)
    }

    pub fn admit(&mut self, notification: &CachedNotification) -> Option<Toast> {
        if !self.allowed.contains(&notification.kind) {
            return None;
        }
        let key = Self::idempotency_key(notification);
        if !self.shown.insert(key.clone()) {
            return None;
        }
        self.order.push_back(key.clone());
        if self.order.len() > TOAST_MEMORY {
            if let Some(oldest) = self.order.pop_front() {
                self.shown.remove(&oldest);
            }
        }
        Some(Toast {
            key,
            kind: notification.kind,
            title: notification.title.clone(),
            message: notification.message.clone(),
            link: notification.link.clone(),
        })
    }
}
