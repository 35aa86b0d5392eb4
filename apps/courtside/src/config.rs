use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::connection::BackoffPolicy;
use crate::model::NotificationKind;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("COURTSIDE_TOKEN is not set")]
    MissingToken,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub ws_url: String,
    pub api_url: String,
    pub token: Option<String>,
    pub log_filter: String,
    pub reconnect_base_ms: u64,
    pub reconnect_cap_ms: u64,
    pub poll_interval_ms: u64,
    pub toast_kinds: Vec<NotificationKind>,
    pub activity_page_size: u32,
}

impl ClientConfig {
    pub fn from_env() -> Self {
        let ws_url =
            std::env::var("COURTSIDE_WS_URL").unwrap_or_else(|_| "ws://127.0.0.1:4000/ws".into());
        let api_url =
            std::env::var("COURTSIDE_API_URL").unwrap_or_else(|_| "http://127.0.0.1:4000/api".into());
        let token = std::env::var("COURTSIDE_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let log_filter =
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,courtside_sync=debug".into());
        let reconnect_base_ms = std::env::var("COURTSIDE_RECONNECT_BASE_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1_000);
        let reconnect_cap_ms = std::env::var("COURTSIDE_RECONNECT_CAP_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(30_000);
        let poll_interval_ms = std::env::var("COURTSIDE_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15_000);
        let toast_kinds = std::env::var("COURTSIDE_TOAST_KINDS")
            .map(|v| parse_toast_kinds(&v))
            .unwrap_or_else(|_| default_toast_kinds());
        let activity_page_size = std::env::var("COURTSIDE_ACTIVITY_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|size: &u32| *size > 0)
            .unwrap_or(20);
        Self {
            ws_url,
            api_url,
            token,
            log_filter,
            reconnect_base_ms,
            reconnect_cap_ms,
            poll_interval_ms,
            toast_kinds,
            activity_page_size,
        }
    }

    pub fn require_token(&self) -> Result<&str, ConfigError> {
        self.token.as_deref().ok_or(ConfigError::MissingToken)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        let base = Duration::from_millis(self.reconnect_base_ms);
        let cap = Duration::from_millis(self.reconnect_cap_ms.max(self.reconnect_base_ms));
        BackoffPolicy::new(base, cap)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

pub fn default_toast_kinds() -> Vec<NotificationKind> {
    vec![
        NotificationKind::ChallengeReceived,
        NotificationKind::MatchReported,
        NotificationKind::LeagueInviteReceived,
        NotificationKind::EloUpdated,
    ]
}

fn parse_toast_kinds(raw: &str) -> Vec<NotificationKind> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .filter_map(|name| {
            let kind = NotificationKind::from_wire(name);
            if kind.is_none() {
                warn!(target = "courtside::config", kind = name, "ignoring unknown toast kind");
            }
            kind
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const VARS: [&str; 8] = [
        "COURTSIDE_WS_URL",
        "COURTSIDE_API_URL",
        "COURTSIDE_TOKEN",
        "COURTSIDE_RECONNECT_BASE_MS",
        "COURTSIDE_RECONNECT_CAP_MS",
        "COURTSIDE_POLL_INTERVAL_MS",
        "COURTSIDE_TOAST_KINDS",
        "COURTSIDE_ACTIVITY_PAGE_SIZE",
    ];

    fn clear() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn defaults_apply_without_env() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear();
        let config = ClientConfig::from_env();
        assert_eq!(config.ws_url, "ws://127.0.0.1:4000/ws");
        assert_eq!(config.backoff(), BackoffPolicy::default());
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        assert_eq!(config.activity_page_size, 20);
        assert_eq!(config.toast_kinds, default_toast_kinds());
        assert!(matches!(config.require_token(), Err(ConfigError::MissingToken)));
    }

    #[test]
    fn env_overrides_are_parsed() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        clear();
        std::env::set_var("COURTSIDE_TOKEN", "tok");
        std::env::set_var("COURTSIDE_RECONNECT_BASE_MS", "250");
        std::env::set_var("COURTSIDE_RECONNECT_CAP_MS", "100");
        std::env::set_var("COURTSIDE_TOAST_KINDS", "match_confirmed, nope ,ELO_UPDATED");
        std::env::set_var("COURTSIDE_ACTIVITY_PAGE_SIZE", "0");

        let config = ClientConfig::from_env();
        clear();

        assert_eq!(config.require_token().ok(), Some("tok"));
        let backoff = config.backoff();
        assert_eq!(backoff.base, Duration::from_millis(250));
        assert_eq!(backoff.cap, Duration::from_millis(250));
        assert_eq!(
            config.toast_kinds,
            vec![NotificationKind::MatchConfirmed, NotificationKind::EloUpdated]
        );
        assert_eq!(config.activity_page_size, 20);
    }
}
