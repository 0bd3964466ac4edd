use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use stratum_authz::model::User;
use stratum_authz::{AuthorizedRequest, RouteHandler};

use crate::{state::AppState, HealthResponse};

/// Liveness endpoint; runs no pipeline
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: state.version.clone(),
        uptime_seconds: state.uptime_seconds(),
        started_at: state.started_at,
    })
}

/// Echo the authorized chain, root first
///
/// Stands in for the resource handlers, which live outside this server.
pub struct ResolvedChain;

#[async_trait]
impl RouteHandler for ResolvedChain {
    async fn handle(&self, request: &AuthorizedRequest) -> stratum_authz::Result<Value> {
        let chain: Vec<_> = request.context.iter().collect();

        Ok(json!({
            "request_id": request.request_id,
            "route": request.route.name(),
            "user_id": request.principal.user_id,
            "tenant": request.tenant,
            "chain": chain,
        }))
    }
}

/// The authenticated user
pub struct CurrentUser;

#[async_trait]
impl RouteHandler for CurrentUser {
    async fn handle(&self, request: &AuthorizedRequest) -> stratum_authz::Result<Value> {
        let user = request.get::<User>()?;
        Ok(json!({ "id": user.id, "email": user.email }))
    }
}
