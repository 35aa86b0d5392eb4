//! REST collaborator for pull-side queries and mutation requests.

use std::collections::BTreeSet;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::cache::{ActivityFeed, CacheValue, QueryKey, FAVORITES, INVITES, LEAGUE_ACTIVITY, NOTIFICATIONS};
use crate::model::{
    ActivityPage, CachedNotification, FavoriteTarget, InviteResponse, LeagueInvite,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status: {status} body={body}")]
    UnexpectedStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("invalid base url: {0}")]
    InvalidBase(String),
}

#[async_trait]
pub trait CourtsideApi: Send + Sync {
    async fn list_notifications(&self) -> Result<Vec<CachedNotification>, ApiError>;
    async fn unread_count(&self) -> Result<u64, ApiError>;
    async fn mark_read(&self, notification_id: &str) -> Result<(), ApiError>;
    async fn mark_all_read(&self) -> Result<(), ApiError>;
    async fn list_invites(&self) -> Result<Vec<LeagueInvite>, ApiError>;
    async fn respond_invite(&self, invite_id: &str, response: InviteResponse) -> Result<(), ApiError>;
    async fn set_favorite(&self, target: &FavoriteTarget, favorited: bool) -> Result<(), ApiError>;
    async fn list_favorites(&self) -> Result<Vec<FavoriteTarget>, ApiError>;
    async fn league_activity(
        &self,
        league_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, ApiError>;
}

#[derive(Debug, Deserialize)]
struct UnreadCount {
    count: u64,
}

#[derive(Clone)]
pub struct HttpApi {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, ApiError> {
        let base_url: String = base_url.into();
        let base_url = Url::parse(&base_url).map_err(|err| ApiError::InvalidBase(err.to_string()))?;
        if !matches!(base_url.scheme(), "http" | "https") || base_url.cannot_be_a_base() {
            return Err(ApiError::InvalidBase(format!("unsupported scheme {}", base_url.scheme())));
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            token: token.into(),
        })
    }

    /// Appends `segments` to the base path, percent-encoding each one so ids
    /// cannot escape their path segment.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.http
            .request(method, self.endpoint(segments))
            .bearer_auth(&self.token)
    }

    async fn get_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let res = checked(request.send().await?).await?;
        Ok(res.json::<T>().await?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ApiError> {
        checked(request.send().await?).await?;
        Ok(())
    }
}

async fn checked(res: Response) -> Result<Response, ApiError> {
    if res.status().is_success() {
        Ok(res)
    } else {
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        Err(ApiError::UnexpectedStatus { status, body })
    }
}

#[async_trait]
impl CourtsideApi for HttpApi {
    async fn list_notifications(&self) -> Result<Vec<CachedNotification>, ApiError> {
        self.get_json(self.request(Method::GET, &["notifications"])).await
    }

    async fn unread_count(&self) -> Result<u64, ApiError> {
        let body: UnreadCount = self
            .get_json(self.request(Method::GET, &["notifications", "unread-count"]))
            .await?;
        Ok(body.count)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), ApiError> {
        let request = self.request(Method::POST, &["notifications", notification_id, "read"]);
        self.send_empty(request).await
    }

    async fn mark_all_read(&self) -> Result<(), ApiError> {
        self.send_empty(self.request(Method::POST, &["notifications", "read-all"]))
            .await
    }

    async fn list_invites(&self) -> Result<Vec<LeagueInvite>, ApiError> {
        self.get_json(self.request(Method::GET, &["invites"])).await
    }

    async fn respond_invite(&self, invite_id: &str, response: InviteResponse) -> Result<(), ApiError> {
        let request = self.request(Method::POST, &["invites", invite_id, response.path_segment()]);
        self.send_empty(request).await
    }

    async fn set_favorite(&self, target: &FavoriteTarget, favorited: bool) -> Result<(), ApiError> {
        let method = if favorited { Method::PUT } else { Method::DELETE };
        let request = self.request(method, &["favorites", target.kind.path_segment(), target.id.as_str()]);
        self.send_empty(request).await
    }

    async fn list_favorites(&self) -> Result<Vec<FavoriteTarget>, ApiError> {
        self.get_json(self.request(Method::GET, &["favorites"])).await
    }

    async fn league_activity(
        &self,
        league_id: &str,
        limit: u32,
        cursor: Option<&str>,
    ) -> Result<ActivityPage, ApiError> {
        let mut request = self
            .request(Method::GET, &["leagues", league_id, "activity"])
            .query(&[("limit", limit.to_string())]);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }
        self.get_json(request).await
    }
}

/// Runs the query behind `key` and returns its value in cache form. Keys that
/// only name a prefix have no query of their own and yield `None`.
pub async fn fetch_query(api: &dyn CourtsideApi, key: &QueryKey) -> Result<Option<CacheValue>, ApiError> {
    let segments: Vec<&str> = key.segments().iter().map(String::as_str).collect();
    let value = match segments.as_slice() {
        [NOTIFICATIONS, "list"] => CacheValue::Notifications(api.list_notifications().await?),
        [NOTIFICATIONS, "unread-count"] => CacheValue::UnreadCount(api.unread_count().await?),
        [INVITES] => CacheValue::Invites(api.list_invites().await?),
        [FAVORITES] => {
            let favorites: BTreeSet<FavoriteTarget> = api.list_favorites().await?.into_iter().collect();
            CacheValue::Favorites(favorites)
        }
        [LEAGUE_ACTIVITY, league_id, page_size] => {
            let Ok(limit) = page_size.parse::<u32>() else {
                return Ok(None);
            };
            let page = api.league_activity(league_id, limit, None).await?;
            CacheValue::ActivityFeed(ActivityFeed::from_pages([page]))
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            HttpApi::new("ws://127.0.0.1:4000/api", "t"),
            Err(ApiError::InvalidBase(_))
        ));
        assert!(matches!(HttpApi::new("not a url", "t"), Err(ApiError::InvalidBase(_))));
    }

    #[test]
    fn endpoint_joins_and_escapes_segments() {
        for base in ["http://127.0.0.1:4000/api/", "http://127.0.0.1:4000/api"] {
            let api = HttpApi::new(base, "t").expect("valid base");
            assert_eq!(
                api.endpoint(&["notifications", "read-all"]).as_str(),
                "http://127.0.0.1:4000/api/notifications/read-all"
            );
        }
        let api = HttpApi::new("https://courtside.test", "t").expect("valid base");
        assert_eq!(
            api.endpoint(&["notifications", "a/b?c#d", "read"]).as_str(),
            "https://courtside.test/notifications/a%2Fb%3Fc%23d/read"
        );
        assert_eq!(
            api.endpoint(&["leagues", "spring league", "activity"]).path(),
            "/leagues/spring%20league/activity"
        );
    }
}
