//! Pull-side producer. Runs beside the push channel and feeds fetched records
//! through the same merge functions, so the two producers converge.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::api::{fetch_query, CourtsideApi};
use crate::cache::reconcile::{ingest_notification, merge_activity_event};
use crate::cache::SharedCache;
use crate::metrics;
use crate::status::StatusObserver;
use crate::subscription::SubscriptionRegistry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Latest records were pulled because the push channel was down.
    pub pulled: bool,
    pub merged: usize,
    pub refreshed: usize,
    pub failed: usize,
}

pub struct Poller {
    api: Arc<dyn CourtsideApi>,
    cache: SharedCache,
    registry: Arc<SubscriptionRegistry>,
    status: StatusObserver,
    page_size: u32,
}

impl Poller {
    pub fn new(
        api: Arc<dyn CourtsideApi>,
        cache: SharedCache,
        registry: Arc<SubscriptionRegistry>,
        status: StatusObserver,
        page_size: u32,
    ) -> Self {
        Self {
            api,
            cache,
            registry,
            status,
            page_size,
        }
    }

    /// One poll cycle. Fetch failures are logged and left for the next cycle.
    pub async fn tick(&self) -> PollReport {
        let mut report = PollReport::default();
        if !self.status.connected() {
            report.pulled = true;
            self.pull_latest(&mut report).await;
        }
        self.refresh_stale(&mut report).await;

        let result = if report.failed == 0 { "ok" } else { "partial" };
        metrics::POLL_CYCLES.with_label_values(&[result]).inc();
        debug!(
            target = "courtside::poller",
            pulled = report.pulled,
            merged = report.merged,
            refreshed = report.refreshed,
            failed = report.failed,
            "poll cycle finished"
        );
        report
    }

    async fn pull_latest(&self, report: &mut PollReport) {
        match self.api.list_notifications().await {
            Ok(items) => {
                let mut cache = self.cache.lock();
                for item in items.into_iter().rev() {
                    if ingest_notification(&mut cache, item).inserted {
                        report.merged += 1;
                    }
                }
            }
            Err(err) => {
                warn!(target = "courtside::poller", error = %err, "notification pull failed");
                report.failed += 1;
            }
        }

        for league in self.registry.scopes() {
            match self.api.league_activity(&league, self.page_size, None).await {
                Ok(page) => {
                    let mut cache = self.cache.lock();
                    for event in page.items.iter().rev() {
                        report.merged += merge_activity_event(&mut cache, event).inserted;
                    }
                }
                Err(err) => {
                    warn!(target = "courtside::poller", league = %league, error = %err, "activity pull failed");
                    report.failed += 1;
                }
            }
        }
    }

    async fn refresh_stale(&self, report: &mut PollReport) {
        let keys = self.cache.lock().take_stale();
        for key in keys {
            match fetch_query(self.api.as_ref(), &key).await {
                Ok(Some(value)) => {
                    self.cache.lock().set(key, value);
                    report.refreshed += 1;
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(target = "courtside::poller", key = %key, error = %err, "refetch failed");
                    self.cache.lock().invalidate(&key);
                    report.failed += 1;
                }
            }
        }
    }

    pub fn spawn(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            while !*shutdown.borrow() {
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {
                        self.tick().await;
                    }
                }
            }
            debug!(target = "courtside::poller", "poller stopped");
        })
    }
}
