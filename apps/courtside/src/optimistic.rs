//! Optimistic local changes with exact rollback.
//!
//! Every mutation snapshots the keys it touches, writes its predicted end
//! state, then awaits the request. A rejection restores the snapshot and
//! publishes one error notice. Either outcome invalidates the affected scopes
//! so the next fetch reconciles with the server.

use std::future::Future;

use thiserror::Error;
use tracing::{debug, warn};

use crate::api::ApiError;
use crate::cache::{QueryCache, QueryKey, SharedCache};
use crate::metrics;
use crate::model::{FavoriteTarget, InviteResponse};
use crate::notices::{ErrorNotice, NoticePublisher};

#[derive(Debug, Error)]
pub enum MutationError {
    #[error("{mutation} was rejected: {source}")]
    Rejected {
        mutation: &'static str,
        #[source]
        source: ApiError,
    },
}

pub trait OptimisticMutation: Send + Sync {
    fn label(&self) -> &'static str;

    /// Keys whose prior state must be restorable.
    fn touches(&self) -> Vec<QueryKey>;

    /// Writes the predicted end state. Only keys listed by `touches` may change.
    fn apply(&self, cache: &mut QueryCache);

    /// Scopes to refetch once the server accepted the change.
    fn invalidates(&self) -> Vec<QueryKey>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkRead {
    pub notification_id: String,
}

impl OptimisticMutation for MarkRead {
    fn label(&self) -> &'static str {
        "mark_read"
    }

    fn touches(&self) -> Vec<QueryKey> {
        vec![QueryKey::notification_list(), QueryKey::unread_count()]
    }

    fn apply(&self, cache: &mut QueryCache) {
        let was_unread = cache
            .notifications_mut()
            .and_then(|list| list.iter_mut().find(|item| item.id == self.notification_id))
            .map(|item| !std::mem::replace(&mut item.read, true))
            .unwrap_or(false);
        if !was_unread {
            return;
        }
        if let Some(count) = cache.unread_count() {
            cache.replace_unread_count(count.saturating_sub(1));
        }
    }

    fn invalidates(&self) -> Vec<QueryKey> {
        vec![QueryKey::notifications_root()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MarkAllRead;

impl OptimisticMutation for MarkAllRead {
    fn label(&self) -> &'static str {
        "mark_all_read"
    }

    fn touches(&self) -> Vec<QueryKey> {
        vec![QueryKey::notification_list(), QueryKey::unread_count()]
    }

    fn apply(&self, cache: &mut QueryCache) {
        if let Some(list) = cache.notifications_mut() {
            for item in list.iter_mut() {
                item.read = true;
            }
        }
        cache.replace_unread_count(0);
    }

    fn invalidates(&self) -> Vec<QueryKey> {
        vec![QueryKey::notifications_root()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondInvite {
    pub invite_id: String,
    pub response: InviteResponse,
}

impl OptimisticMutation for RespondInvite {
    fn label(&self) -> &'static str {
        match self.response {
            InviteResponse::Accept => "accept_invite",
            InviteResponse::Decline => "decline_invite",
        }
    }

    fn touches(&self) -> Vec<QueryKey> {
        vec![QueryKey::invites()]
    }

    fn apply(&self, cache: &mut QueryCache) {
        let status = self.response.resulting_status();
        if let Some(invite) = cache
            .invites_mut()
            .and_then(|invites| invites.iter_mut().find(|invite| invite.id == self.invite_id))
        {
            invite.status = status;
        }
    }

    fn invalidates(&self) -> Vec<QueryKey> {
        vec![QueryKey::invites()]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetFavorite {
    pub target: FavoriteTarget,
    pub favorited: bool,
}

impl OptimisticMutation for SetFavorite {
    fn label(&self) -> &'static str {
        if self.favorited {
            "add_favorite"
        } else {
            "remove_favorite"
        }
    }

    fn touches(&self) -> Vec<QueryKey> {
        vec![QueryKey::favorites()]
    }

    fn apply(&self, cache: &mut QueryCache) {
        let Some(favorites) = cache.favorites_mut() else {
            return;
        };
        if self.favorited {
            favorites.insert(self.target.clone());
        } else {
            favorites.remove(&self.target);
        }
    }

    fn invalidates(&self) -> Vec<QueryKey> {
        vec![QueryKey::favorites()]
    }
}

#[derive(Clone)]
pub struct MutationCoordinator {
    cache: SharedCache,
    notices: NoticePublisher,
}

impl MutationCoordinator {
    pub fn new(cache: SharedCache, notices: NoticePublisher) -> Self {
        Self { cache, notices }
    }

    /// Applies `mutation` locally, then awaits `request`. The cache lock is
    /// never held across the await.
    pub async fn run<M, F, T>(&self, mutation: &M, request: F) -> Result<T, MutationError>
    where
        M: OptimisticMutation + ?Sized,
        F: Future<Output = Result<T, ApiError>>,
    {
        let label = mutation.label();
        let snapshot = {
            let mut cache = self.cache.lock();
            let snapshot = cache.snapshot(&mutation.touches());
            mutation.apply(&mut cache);
            snapshot
        };
        debug!(target = "courtside::optimistic", mutation = label, "applied optimistic change");

        match request.await {
            Ok(value) => {
                let mut cache = self.cache.lock();
                for key in mutation.invalidates() {
                    cache.invalidate(&key);
                }
                metrics::MUTATIONS.with_label_values(&[label, "ok"]).inc();
                Ok(value)
            }
            Err(err) => {
                {
                    // Pushes merged mid-flight are lost by the restore; refetch them.
                    let mut cache = self.cache.lock();
                    cache.restore(snapshot);
                    for key in mutation.invalidates() {
                        cache.invalidate(&key);
                    }
                }
                warn!(target = "courtside::optimistic", mutation = label, error = %err, "mutation rejected; rolled back");
                self.notices.error(&ErrorNotice {
                    mutation: label.to_string(),
                    message: err.to_string(),
                });
                metrics::MUTATIONS.with_label_values(&[label, "rolled_back"]).inc();
                Err(MutationError::Rejected {
                    mutation: label,
                    source: err,
                })
            }
        }
    }
}
