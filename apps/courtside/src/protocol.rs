//! Push-channel frames.
//!
//! Inbound frames are `{ "event": <name>, "data": <payload> }`; the payload is
//! decoded only after the event name has been routed, so unknown events never
//! need a schema. Outbound frames are the two league subscription commands.

use serde::{Deserialize, Serialize};

pub const EVENT_NOTIFICATION_NEW: &str = "notification:new";
pub const EVENT_LEAGUE_ACTIVITY: &str = "league:activity";

#[derive(Debug, Clone, Deserialize)]
pub struct InboundFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl InboundFrame {
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum OutboundFrame {
    #[serde(rename = "league:subscribe")]
    LeagueSubscribe {
        #[serde(rename = "leagueId")]
        league_id: String,
    },
    #[serde(rename = "league:unsubscribe")]
    LeagueUnsubscribe {
        #[serde(rename = "leagueId")]
        league_id: String,
    },
}

impl OutboundFrame {
    pub fn subscribe(league_id: impl Into<String>) -> Self {
        OutboundFrame::LeagueSubscribe {
            league_id: league_id.into(),
        }
    }

    pub fn unsubscribe(league_id: impl Into<String>) -> Self {
        OutboundFrame::LeagueUnsubscribe {
            league_id: league_id.into(),
        }
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
