/// Notification Dispatcher
///
/// Persists one notification per qualifying interaction and fans it out to
/// realtime subscribers. Callers treat dispatch as best effort.

pub mod dispatcher;

pub use dispatcher::NotificationDispatcher;

use crate::error::{EngineError, EngineResult};
use crate::identity::ActorSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Like,
    SuperLike,
    Match,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Like => "like",
            NotificationKind::SuperLike => "super_like",
            NotificationKind::Match => "match",
        }
    }

    pub fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "like" => Ok(NotificationKind::Like),
            "super_like" => Ok(NotificationKind::SuperLike),
            "match" => Ok(NotificationKind::Match),
            _ => Err(EngineError::Internal(format!("Invalid notification kind: {}", s))),
        }
    }
}

/// What the recipient needs to render the notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub actor: ActorSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Stored notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: String,
    pub recipient_id: String,
    pub kind: NotificationKind,
    pub payload: NotificationPayload,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}
