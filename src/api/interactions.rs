/// Like, pass and match endpoints
///
/// Duplicate decisions and exhausted quotas are declines, not failures: they
/// answer 200 with `outcome: "declined"` and a reason the client can show.
use crate::{
    auth::AuthContext,
    context::AppContext,
    error::{DeclineReason, EngineResult},
    interactions::{LikeKind, LikeOutcome, MatchRecord, PassRecord},
};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

/// Like request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRequest {
    pub target_id: String,
    #[serde(default = "default_kind")]
    pub kind: LikeKind,
}

fn default_kind() -> LikeKind {
    LikeKind::Like
}

/// Pass request body
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassRequest {
    pub target_id: String,
}

#[derive(Debug, Serialize)]
pub struct PassAccepted {
    pub pass: PassRecord,
}

/// Outcome of a like or pass
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum DecisionResponse<T> {
    Accepted(T),
    Declined {
        reason: DeclineReason,
        message: String,
    },
}

#[derive(Debug, Serialize)]
pub struct MatchesResponse {
    pub matches: Vec<MatchRecord>,
}

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/likes", post(record_like))
        .route("/api/passes", post(record_pass))
        .route("/api/matches", get(list_matches))
}

fn decide<T>(result: EngineResult<T>) -> EngineResult<Json<DecisionResponse<T>>> {
    match result {
        Ok(value) => Ok(Json(DecisionResponse::Accepted(value))),
        Err(e) => match e.decline_reason() {
            Some(reason) => Ok(Json(DecisionResponse::Declined {
                reason,
                message: e.to_string(),
            })),
            None => Err(e),
        },
    }
}

async fn record_like(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<LikeRequest>,
) -> EngineResult<Json<DecisionResponse<LikeOutcome>>> {
    decide(
        ctx.engine
            .record_like(auth.user_id(), &req.target_id, req.kind)
            .await,
    )
}

async fn record_pass(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<PassRequest>,
) -> EngineResult<Json<DecisionResponse<PassAccepted>>> {
    decide(
        ctx.engine
            .record_pass(auth.user_id(), &req.target_id)
            .await
            .map(|pass| PassAccepted { pass }),
    )
}

async fn list_matches(
    State(ctx): State<AppContext>,
    auth: AuthContext,
) -> EngineResult<Json<MatchesResponse>> {
    let matches = ctx.engine.list_matches_for(auth.user_id()).await?;
    Ok(Json(MatchesResponse { matches }))
}
