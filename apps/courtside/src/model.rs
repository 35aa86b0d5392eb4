//! Domain records held in the client cache.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Closed set of notification kinds the server emits. Wire names are kept
/// verbatim, including the one upper-case legacy name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NotificationKind {
    #[serde(rename = "challenge_received")]
    ChallengeReceived,
    #[serde(rename = "challenge_accepted")]
    ChallengeAccepted,
    #[serde(rename = "challenge_declined")]
    ChallengeDeclined,
    #[serde(rename = "match_reported")]
    MatchReported,
    #[serde(rename = "match_confirmed")]
    MatchConfirmed,
    #[serde(rename = "match_disputed")]
    MatchDisputed,
    #[serde(rename = "ELO_UPDATED")]
    EloUpdated,
    #[serde(rename = "league_invite_received")]
    LeagueInviteReceived,
    #[serde(rename = "league_invite_accepted")]
    LeagueInviteAccepted,
    #[serde(rename = "booking_confirmed")]
    BookingConfirmed,
    #[serde(rename = "booking_cancelled")]
    BookingCancelled,
    #[serde(rename = "system_announcement")]
    SystemAnnouncement,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 12] = [
        NotificationKind::ChallengeReceived,
        NotificationKind::ChallengeAccepted,
        NotificationKind::ChallengeDeclined,
        NotificationKind::MatchReported,
        NotificationKind::MatchConfirmed,
        NotificationKind::MatchDisputed,
        NotificationKind::EloUpdated,
        NotificationKind::LeagueInviteReceived,
        NotificationKind::LeagueInviteAccepted,
        NotificationKind::BookingConfirmed,
        NotificationKind::BookingCancelled,
        NotificationKind::SystemAnnouncement,
    ];

    pub fn wire_name(self) -> &'static str {
        match self {
            NotificationKind::ChallengeReceived => "challenge_received",
            NotificationKind::ChallengeAccepted => "challenge_accepted",
            NotificationKind::ChallengeDeclined => "challenge_declined",
            NotificationKind::MatchReported => "match_reported",
            NotificationKind::MatchConfirmed => "match_confirmed",
            NotificationKind::MatchDisputed => "match_disputed",
            NotificationKind::EloUpdated => "ELO_UPDATED",
            NotificationKind::LeagueInviteReceived => "league_invite_received",
            NotificationKind::LeagueInviteAccepted => "league_invite_accepted",
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::SystemAnnouncement => "system_announcement",
        }
    }

    pub fn from_wire(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.wire_name() == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedNotification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub read: bool,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_meta: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub id: String,
    #[serde(rename = "leagueId")]
    pub scope: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub actor_id: String,
    pub actor_name: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One page of a league activity feed, newest first.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityPage {
    pub items: Vec<ActivityEvent>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl ActivityPage {
    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|event| event.id == id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InviteResponse {
    Accept,
    Decline,
}

impl InviteResponse {
    pub fn resulting_status(self) -> InviteStatus {
        match self {
            InviteResponse::Accept => InviteStatus::Accepted,
            InviteResponse::Decline => InviteStatus::Declined,
        }
    }

    pub fn path_segment(self) -> &'static str {
        match self {
            InviteResponse::Accept => "accept",
            InviteResponse::Decline => "decline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeagueInvite {
    pub id: String,
    pub league_id: String,
    pub league_name: String,
    pub inviter_name: String,
    pub status: InviteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FavoriteKind {
    Venue,
    Court,
    Player,
}

impl FavoriteKind {
    pub fn path_segment(self) -> &'static str {
        match self {
            FavoriteKind::Venue => "venue",
            FavoriteKind::Court => "court",
            FavoriteKind::Player => "player",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FavoriteTarget {
    pub kind: FavoriteKind,
    pub id: String,
}

impl FavoriteTarget {
    pub fn new(kind: FavoriteKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notification_decodes_wire_shape() {
        let raw = serde_json::json!({
            "id": "n-1",
            "type": "ELO_UPDATED",
            "title": "Rating changed",
            "message": "You gained 12 points",
            "priority": "normal",
            "read": false,
            "link": null,
            "createdAt": "2026-03-01T10:00:00Z"
        });
        let notification: CachedNotification = serde_json::from_value(raw).expect("decodes");
        assert_eq!(notification.kind, NotificationKind::EloUpdated);
        assert_eq!(notification.link, None);
        assert_eq!(notification.action_meta, None);
    }

    #[test]
    fn unknown_notification_kind_is_rejected() {
        let raw = serde_json::json!({
            "id": "n-1",
            "type": "brand_new_kind",
            "title": "t",
            "message": "m",
            "priority": "low",
            "read": false,
            "createdAt": "2026-03-01T10:00:00Z"
        });
        assert!(serde_json::from_value::<CachedNotification>(raw).is_err());
    }

    #[test]
    fn wire_names_match_serde() {
        for kind in NotificationKind::ALL {
            let encoded = serde_json::to_value(kind).expect("encodes");
            assert_eq!(encoded, kind.wire_name());
            assert_eq!(NotificationKind::from_wire(kind.wire_name()), Some(kind));
        }
    }

    #[test]
    fn activity_event_maps_league_id_to_scope() {
        let raw = serde_json::json!({
            "id": "a-1",
            "leagueId": "league-9",
            "type": "match_reported",
            "actorId": "u-1",
            "actorName": "Sam",
            "payload": {"score": "6-4 6-3"},
            "createdAt": "2026-03-01T10:00:00Z"
        });
        let event: ActivityEvent = serde_json::from_value(raw).expect("decodes");
        assert_eq!(event.scope, "league-9");
        assert_eq!(event.payload["score"], "6-4 6-3");
    }
}
