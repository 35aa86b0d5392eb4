//! Client-side query cache.
//!
//! One `QueryCache` is owned by a sync session and handed by reference to every
//! reconciler and mutation. Keys are ordered segment lists so that a scope
//! prefix (for example `["league-activity", "L1"]`) addresses every cached
//! variant of that scope regardless of trailing parameters such as page size.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::model::{ActivityPage, CachedNotification, FavoriteTarget, LeagueInvite};

pub mod reconcile;

pub const NOTIFICATIONS: &str = "notifications";
pub const LEAGUE_ACTIVITY: &str = "league-activity";
pub const INVITES: &str = "invites";
pub const FAVORITES: &str = "favorites";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Prefix covering the notification list and the unread counter.
    pub fn notifications_root() -> Self {
        Self::new([NOTIFICATIONS])
    }

    pub fn notification_list() -> Self {
        Self::new([NOTIFICATIONS, "list"])
    }

    pub fn unread_count() -> Self {
        Self::new([NOTIFICATIONS, "unread-count"])
    }

    /// Prefix covering every cached feed variant of one league.
    pub fn league_activity_scope(league_id: &str) -> Self {
        Self::new([LEAGUE_ACTIVITY, league_id])
    }

    pub fn league_activity(league_id: &str, page_size: u32) -> Self {
        Self::new([LEAGUE_ACTIVITY.to_string(), league_id.to_string(), page_size.to_string()])
    }

    pub fn invites() -> Self {
        Self::new([INVITES])
    }

    pub fn favorites() -> Self {
        Self::new([FAVORITES])
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

impl std::fmt::Display for QueryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.0.join(", "))
    }
}

/// Paginated feed. Pages are shared so an untouched page stays the same
/// allocation across merges and snapshots.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActivityFeed {
    pub pages: Vec<Arc<ActivityPage>>,
}

impl ActivityFeed {
    pub fn from_pages(pages: impl IntoIterator<Item = ActivityPage>) -> Self {
        Self {
            pages: pages.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.pages.iter().any(|page| page.contains(id))
    }

    pub fn len(&self) -> usize {
        self.pages.iter().map(|page| page.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Notifications(Vec<CachedNotification>),
    UnreadCount(u64),
    ActivityFeed(ActivityFeed),
    Invites(Vec<LeagueInvite>),
    Favorites(BTreeSet<FavoriteTarget>),
}

impl CacheValue {
    pub fn kind(&self) -> &'static str {
        match self {
            CacheValue::Notifications(_) => "notifications",
            CacheValue::UnreadCount(_) => "unread_count",
            CacheValue::ActivityFeed(_) => "activity_feed",
            CacheValue::Invites(_) => "invites",
            CacheValue::Favorites(_) => "favorites",
        }
    }
}

/// Saved state of a set of keys. `None` records that the key was absent, so a
/// restore removes anything written to it since.
#[derive(Debug, Clone)]
pub struct CacheSnapshot {
    entries: Vec<(QueryKey, Option<CacheValue>)>,
}

impl CacheSnapshot {
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        self.entries.iter().map(|(key, _)| key)
    }
}

#[derive(Debug, Default)]
pub struct QueryCache {
    entries: HashMap<QueryKey, CacheValue>,
    stale: BTreeSet<QueryKey>,
}

pub type SharedCache = Arc<parking_lot::Mutex<QueryCache>>;

impl QueryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedCache {
        Arc::new(parking_lot::Mutex::new(Self::new()))
    }

    pub fn get(&self, key: &QueryKey) -> Option<&CacheValue> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &QueryKey) -> Option<&mut CacheValue> {
        self.entries.get_mut(key)
    }

    /// Stores a fetched query result. The result replaces whatever was cached
    /// and clears the key's stale mark.
    pub fn set(&mut self, key: QueryKey, value: CacheValue) {
        self.stale.remove(&key);
        self.entries.insert(key, value);
    }

    pub fn remove(&mut self, key: &QueryKey) -> Option<CacheValue> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &QueryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys_with_prefix(&self, prefix: &QueryKey) -> Vec<QueryKey> {
        let mut keys: Vec<QueryKey> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        keys
    }

    /// Marks every cached key under `prefix` stale. The prefix itself is
    /// recorded too, so a query that is not cached yet still gets fetched.
    /// Returns how many cached keys were affected.
    pub fn invalidate(&mut self, prefix: &QueryKey) -> usize {
        let matched = self.keys_with_prefix(prefix);
        let count = matched.len();
        self.stale.extend(matched);
        self.stale.insert(prefix.clone());
        count
    }

    pub fn is_stale(&self, key: &QueryKey) -> bool {
        self.stale.contains(key)
    }

    pub fn stale_keys(&self) -> Vec<QueryKey> {
        self.stale.iter().cloned().collect()
    }

    pub fn take_stale(&mut self) -> Vec<QueryKey> {
        std::mem::take(&mut self.stale).into_iter().collect()
    }

    pub fn snapshot(&self, keys: &[QueryKey]) -> CacheSnapshot {
        CacheSnapshot {
            entries: keys
                .iter()
                .map(|key| (key.clone(), self.entries.get(key).cloned()))
                .collect(),
        }
    }

    pub fn restore(&mut self, snapshot: CacheSnapshot) {
        for (key, value) in snapshot.entries {
            match value {
                Some(value) => {
                    self.entries.insert(key, value);
                }
                None => {
                    self.entries.remove(&key);
                }
            }
        }
    }

    pub fn notifications(&self) -> Option<&Vec<CachedNotification>> {
        match self.entries.get(&QueryKey::notification_list()) {
            Some(CacheValue::Notifications(list)) => Some(list),
            _ => None,
        }
    }

    pub fn notifications_mut(&mut self) -> Option<&mut Vec<CachedNotification>> {
        match self.entries.get_mut(&QueryKey::notification_list()) {
            Some(CacheValue::Notifications(list)) => Some(list),
            _ => None,
        }
    }

    pub fn unread_count(&self) -> Option<u64> {
        match self.entries.get(&QueryKey::unread_count()) {
            Some(CacheValue::UnreadCount(count)) => Some(*count),
            _ => None,
        }
    }

    /// Overwrites a counter that is already cached. An absent counter stays
    /// absent; returns whether a value was written.
    pub fn replace_unread_count(&mut self, count: u64) -> bool {
        match self.entries.get_mut(&QueryKey::unread_count()) {
            Some(CacheValue::UnreadCount(current)) => {
                *current = count;
                true
            }
            _ => false,
        }
    }

    pub fn activity_feed(&self, key: &QueryKey) -> Option<&ActivityFeed> {
        match self.entries.get(key) {
            Some(CacheValue::ActivityFeed(feed)) => Some(feed),
            _ => None,
        }
    }

    pub fn invites_mut(&mut self) -> Option<&mut Vec<LeagueInvite>> {
        match self.entries.get_mut(&QueryKey::invites()) {
            Some(CacheValue::Invites(invites)) => Some(invites),
            _ => None,
        }
    }

    pub fn invites(&self) -> Option<&Vec<LeagueInvite>> {
        match self.entries.get(&QueryKey::invites()) {
            Some(CacheValue::Invites(invites)) => Some(invites),
            _ => None,
        }
    }

    pub fn favorites(&self) -> Option<&BTreeSet<FavoriteTarget>> {
        match self.entries.get(&QueryKey::favorites()) {
            Some(CacheValue::Favorites(favorites)) => Some(favorites),
            _ => None,
        }
    }

    pub fn favorites_mut(&mut self) -> Option<&mut BTreeSet<FavoriteTarget>> {
        match self.entries.get_mut(&QueryKey::favorites()) {
            Some(CacheValue::Favorites(favorites)) => Some(favorites),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_matching_ignores_trailing_parameters() {
        let scope = QueryKey::league_activity_scope("L1");
        assert!(QueryKey::league_activity("L1", 20).starts_with(&scope));
        assert!(QueryKey::league_activity("L1", 50).starts_with(&scope));
        assert!(!QueryKey::league_activity("L10", 20).starts_with(&scope));
        assert!(!QueryKey::notification_list().starts_with(&scope));
    }

    #[test]
    fn invalidate_marks_cached_children_and_prefix() {
        let mut cache = QueryCache::new();
        cache.set(QueryKey::notification_list(), CacheValue::Notifications(vec![]));
        cache.set(QueryKey::unread_count(), CacheValue::UnreadCount(2));
        cache.set(QueryKey::invites(), CacheValue::Invites(vec![]));

        let touched = cache.invalidate(&QueryKey::notifications_root());
        assert_eq!(touched, 2);
        assert!(cache.is_stale(&QueryKey::notification_list()));
        assert!(cache.is_stale(&QueryKey::unread_count()));
        assert!(!cache.is_stale(&QueryKey::invites()));

        cache.set(QueryKey::unread_count(), CacheValue::UnreadCount(0));
        assert!(!cache.is_stale(&QueryKey::unread_count()));
    }

    #[test]
    fn invalidating_an_uncached_key_still_records_it() {
        let mut cache = QueryCache::new();
        assert_eq!(cache.invalidate(&QueryKey::unread_count()), 0);
        assert_eq!(cache.take_stale(), vec![QueryKey::unread_count()]);
        assert!(cache.stale_keys().is_empty());
    }

    #[test]
    fn restore_brings_back_absence() {
        let mut cache = QueryCache::new();
        cache.set(QueryKey::unread_count(), CacheValue::UnreadCount(5));
        let snapshot = cache.snapshot(&[QueryKey::unread_count(), QueryKey::favorites()]);

        cache.replace_unread_count(1);
        cache.set(QueryKey::favorites(), CacheValue::Favorites(BTreeSet::new()));
        cache.restore(snapshot);

        assert_eq!(cache.unread_count(), Some(5));
        assert!(!cache.contains(&QueryKey::favorites()));
    }

    #[test]
    fn replace_unread_count_never_creates_a_counter() {
        let mut cache = QueryCache::new();
        assert!(!cache.replace_unread_count(3));
        assert_eq!(cache.unread_count(), None);
    }
}
