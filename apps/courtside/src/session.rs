//! One signed-in client: cache, push channel, subscriptions, mutations and the
//! pull fallback, wired around a single shared cache.

use std::sync::Arc;
use std::time::Duration;

use courtside_bus::{Bus, LocalBus};
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{fetch_query, ApiError, CourtsideApi, HttpApi};
use crate::cache::{ActivityFeed, CacheValue, QueryCache, QueryKey, SharedCache};
use crate::config::{ClientConfig, ConfigError};
use crate::connection::{BackoffPolicy, ConnectionManager};
use crate::model::{FavoriteTarget, InviteResponse, NotificationKind};
use crate::notices::NoticePublisher;
use crate::optimistic::{MarkAllRead, MarkRead, MutationCoordinator, MutationError, RespondInvite, SetFavorite};
use crate::poller::{PollReport, Poller};
use crate::router::EventRouter;
use crate::status::StatusObserver;
use crate::subscription::SubscriptionRegistry;
use crate::transport::websocket::{build_push_uri, WebSocketConnector};
use crate::transport::{Connector, OutboundSlot, TransportError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Push URI with the token already attached.
    pub push_uri: String,
    pub backoff: BackoffPolicy,
    pub toast_kinds: Vec<NotificationKind>,
    pub activity_page_size: u32,
}

pub struct SyncSession {
    cache: SharedCache,
    bus: Arc<dyn Bus>,
    api: Arc<dyn CourtsideApi>,
    registry: Arc<SubscriptionRegistry>,
    connection: Arc<ConnectionManager>,
    router: Arc<EventRouter>,
    mutations: MutationCoordinator,
    poller: Arc<Poller>,
    poll_shutdown: watch::Sender<bool>,
    poll_task: Mutex<Option<JoinHandle<()>>>,
    page_size: u32,
}

impl SyncSession {
    pub fn new(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        api: Arc<dyn CourtsideApi>,
        bus: Arc<dyn Bus>,
    ) -> Self {
        let cache = QueryCache::shared();
        let notices = NoticePublisher::new(bus.clone());
        let outbound = Arc::new(OutboundSlot::new());
        let registry = Arc::new(SubscriptionRegistry::new(outbound.clone()));
        let router = Arc::new(EventRouter::new(
            cache.clone(),
            options.toast_kinds,
            notices.clone(),
        ));
        let connection = ConnectionManager::new(
            options.push_uri,
            options.backoff,
            connector,
            registry.clone(),
            outbound,
            router.clone(),
        );
        let poller = Arc::new(Poller::new(
            api.clone(),
            cache.clone(),
            registry.clone(),
            connection.status(),
            options.activity_page_size,
        ));
        let (poll_shutdown, _) = watch::channel(false);
        Self {
            mutations: MutationCoordinator::new(cache.clone(), notices),
            cache,
            bus,
            api,
            registry,
            connection,
            router,
            poller,
            poll_shutdown,
            poll_task: Mutex::new(None),
            page_size: options.activity_page_size,
        }
    }

    /// Production wiring: websocket push channel, REST over reqwest and a
    /// local notice bus.
    pub fn from_config(config: &ClientConfig) -> Result<Self, SessionError> {
        let token = config.require_token()?;
        let options = SessionOptions {
            push_uri: build_push_uri(&config.ws_url, token)?,
            backoff: config.backoff(),
            toast_kinds: config.toast_kinds.clone(),
            activity_page_size: config.activity_page_size,
        };
        let api = HttpApi::new(config.api_url.clone(), token)?;
        Ok(Self::new(
            options,
            Arc::new(WebSocketConnector::new()),
            Arc::new(api),
            Arc::new(LocalBus::new()),
        ))
    }

    pub fn cache(&self) -> SharedCache {
        self.cache.clone()
    }

    pub fn bus(&self) -> Arc<dyn Bus> {
        self.bus.clone()
    }

    pub fn status(&self) -> StatusObserver {
        self.connection.status()
    }

    pub fn router(&self) -> Arc<EventRouter> {
        self.router.clone()
    }

    pub fn registry(&self) -> Arc<SubscriptionRegistry> {
        self.registry.clone()
    }

    pub fn connect(&self) -> bool {
        self.connection.connect()
    }

    /// Tears the session down. Mutations already in flight still commit or
    /// roll back against the cache.
    pub async fn dispose(&self) {
        self.poll_shutdown.send_replace(true);
        let poll_task = self.poll_task.lock().take();
        if let Some(task) = poll_task {
            let _ = task.await;
        }
        self.connection.dispose().await;
        self.registry.clear();
        info!(target = "courtside::session", "session disposed");
    }

    /// Adds `league_id` to the desired subscriptions. No-op once disposed.
    pub fn subscribe_league(&self, league_id: &str) -> bool {
        if self.connection.is_disposed() {
            return false;
        }
        self.registry.subscribe(league_id)
    }

    pub fn unsubscribe_league(&self, league_id: &str) -> bool {
        if self.connection.is_disposed() {
            return false;
        }
        self.registry.unsubscribe(league_id)
    }

    pub async fn mark_read(&self, notification_id: &str) -> Result<(), MutationError> {
        let mutation = MarkRead {
            notification_id: notification_id.to_string(),
        };
        self.mutations
            .run(&mutation, self.api.mark_read(notification_id))
            .await
    }

    pub async fn mark_all_read(&self) -> Result<(), MutationError> {
        self.mutations
            .run(&MarkAllRead, self.api.mark_all_read())
            .await
    }

    pub async fn respond_invite(&self, invite_id: &str, response: InviteResponse) -> Result<(), MutationError> {
        let mutation = RespondInvite {
            invite_id: invite_id.to_string(),
            response,
        };
        self.mutations
            .run(&mutation, self.api.respond_invite(invite_id, response))
            .await
    }

    pub async fn set_favorite(&self, target: FavoriteTarget, favorited: bool) -> Result<(), MutationError> {
        let mutation = SetFavorite { target, favorited };
        self.mutations
            .run(&mutation, self.api.set_favorite(&mutation.target, favorited))
            .await
    }

    /// Flips cached membership of `target`. Returns the membership requested.
    pub async fn toggle_favorite(&self, target: FavoriteTarget) -> Result<bool, MutationError> {
        let favorited = !self
            .cache
            .lock()
            .favorites()
            .map(|set| set.contains(&target))
            .unwrap_or(false);
        self.set_favorite(target, favorited).await?;
        Ok(favorited)
    }

    /// Refetches one query into the cache. Returns false for prefix keys that
    /// have no query of their own.
    pub async fn refresh(&self, key: &QueryKey) -> Result<bool, ApiError> {
        match fetch_query(self.api.as_ref(), key).await? {
            Some(value) => {
                self.cache.lock().set(key.clone(), value);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Loads the queries a signed-in shell shows on first paint.
    pub async fn prime(&self) -> Result<(), ApiError> {
        for key in [
            QueryKey::notification_list(),
            QueryKey::unread_count(),
            QueryKey::invites(),
            QueryKey::favorites(),
        ] {
            self.refresh(&key).await?;
        }
        debug!(target = "courtside::session", "primed cache");
        Ok(())
    }

    /// Loads the first activity page of `league_id` at the session page size.
    pub async fn load_league_activity(&self, league_id: &str) -> Result<(), ApiError> {
        let key = QueryKey::league_activity(league_id, self.page_size);
        self.refresh(&key).await.map(|_| ())
    }

    /// Appends the next activity page. Returns false when the feed is not
    /// cached or has no further pages.
    pub async fn load_more_activity(&self, league_id: &str) -> Result<bool, ApiError> {
        let key = QueryKey::league_activity(league_id, self.page_size);
        let cursor = {
            let cache = self.cache.lock();
            cache
                .activity_feed(&key)
                .and_then(|feed| feed.pages.last())
                .and_then(|page| page.next_cursor.clone())
        };
        let Some(cursor) = cursor else {
            return Ok(false);
        };

        let page = self
            .api
            .league_activity(league_id, self.page_size, Some(&cursor))
            .await?;
        let mut cache = self.cache.lock();
        let Some(CacheValue::ActivityFeed(feed)) = cache.get_mut(&key) else {
            return Ok(false);
        };
        let mut page = page;
        page.items.retain(|event| !feed.contains(&event.id));
        feed.pages.push(Arc::new(page));
        Ok(true)
    }

    pub fn activity_feed(&self, league_id: &str) -> Option<ActivityFeed> {
        let key = QueryKey::league_activity(league_id, self.page_size);
        self.cache.lock().activity_feed(&key).cloned()
    }

    /// Starts the pull fallback. Returns false when already running or
    /// disposed.
    pub fn start_polling(&self, interval: Duration) -> bool {
        if self.connection.is_disposed() {
            return false;
        }
        let mut task = self.poll_task.lock();
        if task.is_some() {
            return false;
        }
        *task = Some(
            self.poller
                .clone()
                .spawn(interval, self.poll_shutdown.subscribe()),
        );
        true
    }

    pub async fn poll_once(&self) -> PollReport {
        self.poller.tick().await
    }
}
