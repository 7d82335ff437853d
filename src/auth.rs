/// Authentication extractors and utilities
///
/// Access tokens are HS256 JWTs issued by the identity provider; the `sub`
/// claim is the user id. The engine only verifies them.
use crate::{
    context::AppContext,
    error::{EngineError, EngineResult},
    identity::{IdentityProvider, User},
};
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Access token claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    #[serde(default)]
    pub iat: i64,
}

/// Issue an access token for `user_id`. Used by tooling and tests.
pub fn issue_access_token(user_id: &str, jwt_secret: &str, ttl: Duration) -> EngineResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(jwt_secret.as_bytes()),
    )
    .map_err(|e| EngineError::Internal(format!("Failed to sign token: {}", e)))
}

/// Verify signature and expiry of an access token
pub fn verify_access_token(token: &str, jwt_secret: &str) -> EngineResult<Claims> {
    let decoding_key = DecodingKey::from_secret(jwt_secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    // Allow some clock skew (1 minute)
    validation.leeway = 60;

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            tracing::debug!("JWT verification failed: {}", e);
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    EngineError::Authentication("Token has expired".to_string())
                }
                jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                    EngineError::Authentication("Invalid token signature".to_string())
                }
                _ => EngineError::Authentication(format!("Invalid token: {}", e)),
            }
        })
}

/// Extract bearer token from the Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
}

/// Resolve a token to an active user
pub async fn authenticate_token(ctx: &AppContext, token: &str) -> EngineResult<User> {
    let claims = verify_access_token(token, &ctx.config.authentication.jwt_secret)?;

    match ctx.users.get_user(&claims.sub).await? {
        Some(user) if user.active => Ok(user),
        Some(_) => Err(EngineError::Forbidden("Account is deactivated".to_string())),
        None => Err(EngineError::Authentication(format!("Unknown user {}", claims.sub))),
    }
}

/// Authenticated caller
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
}

impl AuthContext {
    pub fn user_id(&self) -> &str {
        &self.user.id
    }
}

#[async_trait]
impl FromRequestParts<AppContext> for AuthContext {
    type Rejection = EngineError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| EngineError::Authentication("Missing authorization header".to_string()))?;

        let user = authenticate_token(state, &token).await?;
        Ok(AuthContext { user })
    }
}
