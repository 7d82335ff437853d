/// Identity collaborator
///
/// Users are owned by the external identity provider. The engine only needs
/// to look them up (active flag, premium tier, display data), so it reads a
/// mirror table through the `IdentityProvider` trait.

pub mod directory;

pub use directory::UserDirectory;

use crate::error::EngineResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User as seen by the interaction engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
    pub premium: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Display data copied into notification payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorSummary {
    pub id: String,
    pub display_name: String,
    pub photo_url: Option<String>,
}

impl From<&User> for ActorSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            display_name: user.display_name.clone(),
            photo_url: user.photo_url.clone(),
        }
    }
}

/// Lookup interface onto the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Fetch a user by id
    async fn get_user(&self, user_id: &str) -> EngineResult<Option<User>>;

    /// Active users that are candidates for `viewer_id`'s discovery feed:
    /// everyone except the viewer and anyone the viewer already liked or passed.
    async fn discovery_candidates(&self, viewer_id: &str) -> EngineResult<Vec<User>>;
}
