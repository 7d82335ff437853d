/// Discovery feed
use crate::{auth::AuthContext, context::AppContext, error::EngineResult, identity::ActorSummary};
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct DiscoveryParams {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub candidates: Vec<ActorSummary>,
}

pub fn routes() -> Router<AppContext> {
    Router::new().route("/api/discovery", get(discover))
}

async fn discover(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Query(params): Query<DiscoveryParams>,
) -> EngineResult<Json<DiscoveryResponse>> {
    let candidates = ctx.engine.discover(auth.user_id(), params.limit).await?;
    Ok(Json(DiscoveryResponse { candidates }))
}
