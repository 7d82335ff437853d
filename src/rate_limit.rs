/// Rate limiting
///
/// Like/pass writes are limited per user; every request without a valid
/// bearer token shares one unauthenticated bucket.
use crate::{
    auth::{extract_bearer_token, verify_access_token},
    config::RateLimitConfig,
    context::AppContext,
    error::{EngineError, EngineResult},
};
use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::Response,
};
use governor::{DefaultDirectRateLimiter, DefaultKeyedRateLimiter, Quota};
use std::num::NonZeroU32;

/// Paths whose POSTs count as decisions
const DECISION_PATHS: [&str; 2] = ["/api/likes", "/api/passes"];

/// Rate limiter manager
pub struct RateLimiter {
    enabled: bool,
    decisions: DefaultKeyedRateLimiter<String>,
    unauthenticated: DefaultDirectRateLimiter,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        let per_minute = NonZeroU32::new(config.decisions_per_minute).unwrap_or(NonZeroU32::MIN);
        let per_second = NonZeroU32::new(config.unauthenticated_rps).unwrap_or(NonZeroU32::MIN);

        Self {
            enabled: config.enabled,
            decisions: DefaultKeyedRateLimiter::keyed(Quota::per_minute(per_minute)),
            unauthenticated: DefaultDirectRateLimiter::direct(Quota::per_second(per_second)),
        }
    }

    /// Check the decision budget of one user
    pub fn check_decision(&self, user_id: &str) -> EngineResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.decisions
            .check_key(&user_id.to_string())
            .map_err(|_| EngineError::RateLimitExceeded)
    }

    /// Check the shared unauthenticated budget
    pub fn check_unauthenticated(&self) -> EngineResult<()> {
        if !self.enabled {
            return Ok(());
        }

        self.unauthenticated
            .check()
            .map_err(|_| EngineError::RateLimitExceeded)
    }

    /// Drop per-user state that has fully replenished
    pub fn retain_recent(&self) {
        self.decisions.retain_recent();
    }
}

/// Rate limiting middleware
pub async fn rate_limit_middleware(
    State(ctx): State<AppContext>,
    request: Request,
    next: Next,
) -> Result<Response, EngineError> {
    let user_id = extract_bearer_token(request.headers())
        .and_then(|token| verify_access_token(&token, &ctx.config.authentication.jwt_secret).ok())
        .map(|claims| claims.sub);

    match user_id {
        Some(user_id) => {
            let is_decision = request.method() == Method::POST
                && DECISION_PATHS.contains(&request.uri().path());
            if is_decision {
                ctx.rate_limiter.check_decision(&user_id)?;
            }
        }
        None => ctx.rate_limiter.check_unauthenticated()?,
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(decisions_per_minute: u32) -> RateLimitConfig {
        RateLimitConfig {
            enabled: true,
            decisions_per_minute,
            unauthenticated_rps: 2,
        }
    }

    #[test]
    fn test_decisions_are_limited_per_user() {
        let limiter = RateLimiter::new(&config(3));

        for _ in 0..3 {
            assert!(limiter.check_decision("alice").is_ok());
        }
        assert!(matches!(
            limiter.check_decision("alice"),
            Err(EngineError::RateLimitExceeded)
        ));

        // Separate bucket per user
        assert!(limiter.check_decision("bob").is_ok());
    }

    #[test]
    fn test_unauthenticated_burst() {
        let limiter = RateLimiter::new(&config(3));

        assert!(limiter.check_unauthenticated().is_ok());
        assert!(limiter.check_unauthenticated().is_ok());
        assert!(limiter.check_unauthenticated().is_err());
    }

    #[test]
    fn test_disabled_limiter_allows_everything() {
        let mut cfg = config(1);
        cfg.enabled = false;
        let limiter = RateLimiter::new(&cfg);

        for _ in 0..10 {
            assert!(limiter.check_decision("alice").is_ok());
            assert!(limiter.check_unauthenticated().is_ok());
        }
    }
}
