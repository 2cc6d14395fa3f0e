//! REST route handlers for the control-plane surface.

use crate::state::SharedControlState;
use axum::{
    extract::{Path, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stormstack_cluster::{NodeHeartbeat, NodeSummary, PlacementRequest, RoutedMatch};
use stormstack_core::{MatchId, NodeId, PlayerId};
use stormstack_net::{ApiError, ApiResponse, BearerToken};

/// Cluster status summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    /// Known nodes.
    pub nodes: usize,
    /// Healthy nodes.
    pub healthy_nodes: usize,
    /// Routed matches.
    pub matches: usize,
    /// Modules supported somewhere in the cluster.
    pub supported_modules: Vec<String>,
}

/// Node registration response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    /// The id assigned to (or confirmed for) the node.
    pub node_id: NodeId,
}

/// Player admission request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMatchRequest {
    /// The joining player.
    pub player_id: PlayerId,
    /// Display name.
    pub player_name: String,
    /// Requested token validity in seconds (default 1 h, capped at 24 h).
    pub valid_for_secs: Option<u64>,
}

/// Player admission response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinMatchResponse {
    /// Signed match token.
    pub token: String,
    /// Token id (for revocation).
    pub token_id: stormstack_core::TokenId,
    /// Where the match lives.
    pub node_id: NodeId,
    /// Hosting container.
    pub container_id: stormstack_core::ContainerId,
    /// Token expiry.
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

/// Create the control-plane router.
pub fn create_router(state: SharedControlState) -> Router {
    Router::new()
        .route("/api/cluster/status", get(cluster_status))
        .route("/api/nodes", get(list_nodes))
        .route("/api/nodes/register", post(register_node))
        .route("/api/matches", get(list_matches))
        .route("/api/matches/route", post(route_match))
        .route("/api/matches/{id}/join", post(join_match))
        .route("/api/modules", get(list_modules))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_layer,
        ))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Generic per-principal limit, keyed by bearer.
async fn rate_limit_layer(
    State(state): State<SharedControlState>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let verdict = state.limiter.check(&key);
    if !verdict.allowed {
        let mut response =
            ApiError::new("BACKPRESSURE", "request rate limit exceeded").into_response();
        response.headers_mut().extend(verdict.headers());
        return response;
    }

    let mut response = next.run(request).await;
    response.headers_mut().extend(verdict.headers());
    response
}

async fn health_handler() -> ApiResponse<serde_json::Value> {
    ApiResponse::ok(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// Non-management endpoints still demand a bearer; its verification is
// the external IdP's job at the edge, so only presence is enforced here.
async fn cluster_status(
    State(state): State<SharedControlState>,
    BearerToken(_token): BearerToken,
) -> Result<Response, ApiError> {
    let nodes = state.registry.list();
    let healthy = nodes
        .iter()
        .filter(|node| node.status == stormstack_cluster::NodeStatus::Healthy)
        .count();
    Ok(ApiResponse::ok(ClusterStatus {
        nodes: nodes.len(),
        healthy_nodes: healthy,
        matches: state.router.count(),
        supported_modules: state.registry.supported_modules(),
    })
    .into_response())
}

async fn list_nodes(
    State(state): State<SharedControlState>,
    BearerToken(_token): BearerToken,
) -> Result<Response, ApiError> {
    let nodes: Vec<NodeSummary> = state.registry.list();
    Ok(ApiResponse::ok(nodes).into_response())
}

async fn register_node(
    State(state): State<SharedControlState>,
    BearerToken(token): BearerToken,
    Json(heartbeat): Json<NodeHeartbeat>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;
    let node_id = state.registry.heartbeat(heartbeat);
    Ok(ApiResponse::ok(RegisterResponse { node_id }).into_response())
}

async fn list_matches(
    State(state): State<SharedControlState>,
    BearerToken(_token): BearerToken,
) -> Result<Response, ApiError> {
    let matches: Vec<RoutedMatch> = state.router.list();
    Ok(ApiResponse::ok(matches).into_response())
}

async fn route_match(
    State(state): State<SharedControlState>,
    BearerToken(token): BearerToken,
    Json(request): Json<PlacementRequest>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;
    let routed = state.router.route(request).await?;
    Ok(ApiResponse::ok(routed).into_response())
}

async fn join_match(
    State(state): State<SharedControlState>,
    Path(match_id): Path<MatchId>,
    BearerToken(_token): BearerToken,
    Json(request): Json<JoinMatchRequest>,
) -> Result<Response, ApiError> {
    let outcome = state
        .router
        .join(
            match_id,
            request.player_id,
            &request.player_name,
            request.valid_for_secs.map(Duration::from_secs),
        )
        .await?;

    Ok(ApiResponse::ok(JoinMatchResponse {
        token: outcome.token,
        token_id: outcome.record.id,
        node_id: outcome.routed.node_id,
        container_id: outcome.routed.container_id,
        expires_at: outcome.record.expires_at,
    })
    .into_response())
}

async fn list_modules(
    State(state): State<SharedControlState>,
    BearerToken(_token): BearerToken,
) -> Result<Response, ApiError> {
    Ok(ApiResponse::ok(state.registry.supported_modules()).into_response())
}
