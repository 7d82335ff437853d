/// Interaction Engine
///
/// Records like / super-like / pass decisions, detects mutual likes and turns
/// them into exactly one match plus conversation per pair, and hands every
/// state transition to the notification dispatcher.
///
/// Concurrency control relies solely on the storage layer's uniqueness
/// constraints; every step after the ledger write is idempotent and can be
/// re-derived from the ledger.

pub mod engine;
pub mod ledger;
pub mod matcher;

pub use engine::{InteractionEngine, LikeOutcome, MatchSummary};
pub use ledger::{AcceptedLike, LikeLedger};
pub use matcher::MatchDetector;

use crate::conversations::Conversation;
use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LikeKind {
    Like,
    SuperLike,
}

impl LikeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LikeKind::Like => "like",
            LikeKind::SuperLike => "super_like",
        }
    }

    pub fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "like" => Ok(LikeKind::Like),
            "super_like" => Ok(LikeKind::SuperLike),
            _ => Err(EngineError::Validation(format!("Invalid like kind: {}", s))),
        }
    }
}

/// Directional like, immutable once stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRecord {
    pub id: String,
    pub actor_id: String,
    pub target_id: String,
    pub kind: LikeKind,
    pub created_at: DateTime<Utc>,
}

/// Directional "not interested" marker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassRecord {
    pub id: String,
    pub actor_id: String,
    pub target_id: String,
    pub created_at: DateTime<Utc>,
}

/// Match status. Absence of a match row is the only other state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Mutual,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Mutual => "mutual",
        }
    }

    pub fn from_str(s: &str) -> EngineResult<Self> {
        match s {
            "mutual" => Ok(MatchStatus::Mutual),
            _ => Err(EngineError::Internal(format!("Invalid match status: {}", s))),
        }
    }
}

/// Mutual match, one row per unordered pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub id: String,
    pub user_low: String,
    pub user_high: String,
    pub status: MatchStatus,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn pair(&self) -> CanonicalPair {
        CanonicalPair {
            low: self.user_low.clone(),
            high: self.user_high.clone(),
        }
    }
}

/// Unordered user pair, stored with the lexicographically smaller id first
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalPair {
    low: String,
    high: String,
}

impl CanonicalPair {
    pub fn new(a: &str, b: &str) -> EngineResult<Self> {
        if a == b {
            return Err(EngineError::InvalidActor(
                "A user cannot be paired with themselves".to_string(),
            ));
        }

        let (low, high) = if a < b { (a, b) } else { (b, a) };
        Ok(Self {
            low: low.to_string(),
            high: high.to_string(),
        })
    }

    pub fn low(&self) -> &str {
        &self.low
    }

    pub fn high(&self) -> &str {
        &self.high
    }

    /// The other member of the pair, if `user_id` belongs to it
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if user_id == self.low {
            Some(&self.high)
        } else if user_id == self.high {
            Some(&self.low)
        } else {
            None
        }
    }
}

/// Result of a match check
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    /// No reverse like yet
    NoMatch,
    /// The pair is mutual. `first_time` is true only for the call that inserted the rows.
    MatchCreated {
        record: MatchRecord,
        conversation: Conversation,
        first_time: bool,
    },
}

impl MatchOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, MatchOutcome::MatchCreated { .. })
    }
}

/// A UTC calendar day, `[start, end)`. Super-like quotas reset at `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtcDay {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl UtcDay {
    pub fn containing(ts: DateTime<Utc>) -> Self {
        let start = ts.date_naive().and_time(NaiveTime::MIN).and_utc();
        Self {
            start,
            end: start + Duration::days(1),
        }
    }
}

/// Derived super-like allowance for the current UTC day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuperLikeQuota {
    pub allowance: u32,
    pub used: u32,
    pub remaining: u32,
    pub resets_at: DateTime<Utc>,
}

impl SuperLikeQuota {
    pub fn new(allowance: u32, used: u32, day: UtcDay) -> Self {
        Self {
            allowance,
            used,
            remaining: allowance.saturating_sub(used),
            resets_at: day.end,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.remaining == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_canonical_pair_is_order_independent() {
        let ab = CanonicalPair::new("alice", "bob").unwrap();
        let ba = CanonicalPair::new("bob", "alice").unwrap();
        assert_eq!(ab, ba);
        assert_eq!(ab.low(), "alice");
        assert_eq!(ab.high(), "bob");
        assert_eq!(ab.counterpart("bob"), Some("alice"));
        assert_eq!(ab.counterpart("carol"), None);
    }

    #[test]
    fn test_canonical_pair_rejects_self() {
        assert!(matches!(
            CanonicalPair::new("alice", "alice"),
            Err(EngineError::InvalidActor(_))
        ));
    }

    #[test]
    fn test_utc_day_bounds() {
        let ts = Utc.with_ymd_and_hms(2026, 10, 19, 23, 59, 59).unwrap();
        let day = UtcDay::containing(ts);
        assert_eq!(day.start, Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap());
        assert_eq!(day.end, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
        assert_eq!(UtcDay::containing(day.end).start, day.end);
    }

    #[test]
    fn test_quota_saturates() {
        let day = UtcDay::containing(Utc::now());
        let quota = SuperLikeQuota::new(1, 3, day);
        assert_eq!(quota.remaining, 0);
        assert!(quota.exhausted());
    }

    #[test]
    fn test_like_kind_parsing() {
        assert_eq!(LikeKind::from_str("super_like").unwrap(), LikeKind::SuperLike);
        assert_eq!(LikeKind::Like.as_str(), "like");
        assert!(LikeKind::from_str("love").is_err());
    }
}
