/// API routes and handlers
pub mod conversations;
pub mod discovery;
pub mod interactions;
pub mod me;
pub mod notifications;
pub mod realtime;

use crate::{
    context::AppContext,
    error::{EngineError, EngineResult},
};
use axum::Router;
use validator::Validate;

/// Build API routes
pub fn routes() -> Router<AppContext> {
    Router::new()
        .merge(me::routes())
        .merge(discovery::routes())
        .merge(interactions::routes())
        .merge(conversations::routes())
        .merge(notifications::routes())
        .merge(realtime::routes())
}

/// Run `validator` rules on a request body
pub(crate) fn validate_request<T: Validate>(request: &T) -> EngineResult<()> {
    request
        .validate()
        .map_err(|e| EngineError::Validation(e.to_string()))
}
