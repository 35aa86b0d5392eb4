#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courtside_bus::LocalBus;
use parking_lot::Mutex;
use tokio::sync::Notify;
use time::macros::datetime;
use time::OffsetDateTime;

use courtside_sync::api::{ApiError, CourtsideApi};
use courtside_sync::connection::BackoffPolicy;
use courtside_sync::model::{
    ActivityEvent, ActivityPage, CachedNotification, FavoriteTarget, InviteResponse, LeagueInvite,
    NotificationKind, Priority,
};
use courtside_sync::transport::memory::{MemoryConnector, MemoryServer};
use courtside_sync::{SessionOptions, SyncSession};

pub const PUSH_URI: &str = "ws://memory.test/ws?token=secret";

pub fn notification(id: &str, read: bool) -> CachedNotification {
    CachedNotification {
        id: id.to_string(),
        kind: NotificationKind::ChallengeReceived,
        title: format!("Challenge {id}"),
        message: "You have a new challenge".into(),
        priority: Priority::Normal,
        read,
        link: Some(format!("/challenges/{id}")),
        created_at: datetime!(2026-05-10 18:00 UTC),
        action_meta: None,
    }
}

pub fn activity(id: &str, league: &str, at: OffsetDateTime) -> ActivityEvent {
    ActivityEvent {
        id: id.to_string(),
        scope: league.to_string(),
        kind: "match_reported".into(),
        actor_id: "u-3".into(),
        actor_name: "Jordan".into(),
        payload: serde_json::json!({ "score": "6-2 6-4" }),
        created_at: at,
    }
}

pub fn notification_frame(notification: &CachedNotification) -> String {
    serde_json::json!({ "event": "notification:new", "data": notification }).to_string()
}

pub fn activity_frame(event: &ActivityEvent) -> String {
    serde_json::json!({ "event": "league:activity", "data": event }).to_string()
}

/// Server state behind `FakeApi`.
#[derive(Default)]
pub struct FakeServer {
    pub notifications: Vec<CachedNotification>,
    pub unread: u64,
    pub invites: Vec<LeagueInvite>,
    pub favorites: BTreeSet<FavoriteTarget>,
    pub activity: HashMap<String, Vec<ActivityPage>>,
    /// Operation names that answer with a 500.
    pub failing: HashSet<&'static str>,
    pub calls: Vec<String>,
}

#[derive(Clone, Default)]
pub struct FakeApi {
    pub server: Arc<Mutex<FakeServer>>,
    gate: Arc<Mutex<Option<Arc<Notify>>>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, operation: &'static str) {
        self.server.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.server.lock().failing.remove(operation);
    }

    /// Holds every mutation request until the returned handle is notified
    /// once per request.
    pub fn hold(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock() = Some(gate.clone());
        gate
    }

    async fn gate(&self) {
        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.server.lock().calls.clone()
    }

    fn enter(&self, operation: &'static str, detail: String) -> Result<(), ApiError> {
        let mut server = self.server.lock();
        server.calls.push(if detail.is_empty() {
            operation.to_string()
        } else {
            format!("{operation} {detail}")
        });
        if server.failing.contains(operation) {
            return Err(ApiError::UnexpectedStatus {
                status: reqwest::StatusCode::INTERNAL_SERVER_ERROR,
                body: format!("{operation} unavailable"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CourtsideApi for FakeApi {
    async fn list_notifications(&self) -> Result<Vec<CachedNotification>, ApiError> {
        self.enter("list_notifications", String::new())?;
        Ok(self.server.lock().notifications.clone())
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        self.enter("unread_count", String::new())?;
        Ok(self.server.lock().unread)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), ApiError> {
        self.gate().await;
        self.enter("mark_read", notification_id.to_string())?;
        let mut server = self.server.lock();
        if let Some(item) = server.notifications.iter_mut().find(|n| n.id == notification_id) {
            if !item.read {
                item.read = true;
                server.unread = server.unread.saturating_sub(1);
            }
        }
        Ok(())
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.gate().await;
        self.enter("mark_all_read", String::new())?;
        let mut server = self.server.lock();
        server.notifications.iter_mut().for_each(|n| n.read = true);
        server.unread = 0;
        Ok(())
    }

    async fn list_invites(&self) -> Result<Vec<LeagueInvite>, ApiError> {
        self.enter("list_invites", String::new())?;
        Ok(self.server.lock().invites.clone())
    }

    async fn respond_invite(&self, invite_id: &str, response: InviteResponse) -> Result<(), ApiError> {
        self.gate().await;
        self.enter("respond_invite", invite_id.to_string())?;
        let mut server = self.server.lock();
        if let Some(invite) = server.invites.iter_mut().find(|i| i.id == invite_id) {
            invite.status = response.resulting_status();
        }
        Ok(())
    }

    async fn set_favorite(&self, target: &FavoriteTarget, favorited: bool) -> Result<(), ApiError> {
        self.gate().await;
        self.enter("set_favorite", format!("{}:{}", target.id, favorited))?;
        let mut server = self.server.lock();
        if favorited {
            server.favorites.insert(target.clone());
        } else {
            server.favorites.remove(target);
        }
        Ok(())
    }

    async fn list_favorites(&self) -> Result<Vec<FavoriteTarget>, ApiError> {
        self.enter("list_favorites", String::new())?;
        Ok(self.server.lock().favorites.iter().cloned().collect())
    }

    async fn league_activity(
        &self,
        league_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, ApiError> {
        self.enter(
            "league_activity",
            format!("{league_id} limit={limit} cursor={}", cursor.unwrap_or("-")),
        )?;
        let server = self.server.lock();
        let pages = server.activity.get(league_id).cloned().unwrap_or_default();
        let index = cursor.and_then(|c| c.parse::<usize>().ok()).unwrap_or(0);
        Ok(pages.get(index).cloned().unwrap_or_default())
    }
}

pub struct Harness {
    pub session: SyncSession,
    pub api: FakeApi,
    pub connector: MemoryConnector,
    pub server: MemoryServer,
    pub bus: Arc<LocalBus>,
}

pub fn backoff() -> BackoffPolicy {
    BackoffPolicy::new(Duration::from_secs(1), Duration::from_secs(30))
}

pub fn harness() -> Harness {
    let api = FakeApi::new();
    let (connector, server) = MemoryConnector::new();
    let bus = Arc::new(LocalBus::new());
    let session = SyncSession::new(
        SessionOptions {
            push_uri: PUSH_URI.to_string(),
            backoff: backoff(),
            toast_kinds: vec![NotificationKind::ChallengeReceived],
            activity_page_size: 20,
        },
        Arc::new(connector.clone()),
        Arc::new(api.clone()),
        bus.clone(),
    );
    Harness {
        session,
        api,
        connector,
        server,
        bus,
    }
}
