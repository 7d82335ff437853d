/// Conversations and messages
///
/// A conversation is created only by the match detector, in the same
/// transaction as its match. This module reads conversations and carries the
/// messaging that a match unlocks.

pub mod store;

pub use store::ConversationStore;

use crate::{
    db::parse_timestamp,
    error::EngineResult,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;

/// Maximum message body length, in characters
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// Messaging channel bound 1:1 to a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub match_id: String,
    pub user_low: String,
    pub user_high: String,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Conversation {
    pub fn has_participant(&self, user_id: &str) -> bool {
        self.user_low == user_id || self.user_high == user_id
    }

    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if user_id == self.user_low {
            Some(&self.user_high)
        } else if user_id == self.user_high {
            Some(&self.user_low)
        } else {
            None
        }
    }

    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> EngineResult<Self> {
        let created_at: String = row.try_get("created_at")?;
        let last_activity_at: String = row.try_get("last_activity_at")?;

        Ok(Conversation {
            id: row.try_get("id")?,
            match_id: row.try_get("match_id")?,
            user_low: row.try_get("user_low")?,
            user_high: row.try_get("user_high")?,
            created_at: parse_timestamp(&created_at)?,
            last_activity_at: parse_timestamp(&last_activity_at)?,
        })
    }
}

/// Chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub(crate) fn from_row(row: &sqlx::sqlite::SqliteRow) -> EngineResult<Self> {
        let created_at: String = row.try_get("created_at")?;

        Ok(Message {
            id: row.try_get("id")?,
            conversation_id: row.try_get("conversation_id")?,
            sender_id: row.try_get("sender_id")?,
            body: row.try_get("body")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

/// Conversation as listed for one participant
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub counterpart_id: String,
    pub last_message: Option<Message>,
}

/// New message published to realtime subscribers, with both recipients resolved
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub message: Message,
    pub participants: [String; 2],
}
