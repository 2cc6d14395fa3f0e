//! REST route handlers for the node HTTP surface.
//!
//! All endpoints except `/health` require a bearer token: either a
//! match-scoped token minted by the control plane (player paths) or the
//! management credential (container/match lifecycle paths). The generic
//! per-principal rate limit is applied as middleware and stamps the
//! `X-RateLimit-*` headers on every response.

use crate::state::SharedAppState;
use crate::ws;
use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stormstack_core::{ContainerId, MatchId, PlayerId, Scope, StormError};
use stormstack_engine::{Container, ContainerStatus, MatchInfo, SchedulerHandle, SnapshotSink};
use stormstack_net::{ApiError, ApiResponse, BearerToken};
use tracing::debug;

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Container summary for list responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSummary {
    /// Container id.
    pub id: ContainerId,
    /// Lifecycle status.
    pub status: ContainerStatus,
    /// Enabled module names, in system order.
    pub modules: Vec<String>,
    /// Hosted match count.
    pub matches: usize,
    /// Tick interval in milliseconds.
    pub tick_interval_ms: u64,
    /// Queue saturation in [0, 1].
    pub saturation: f64,
}

impl From<&Arc<Container>> for ContainerSummary {
    fn from(container: &Arc<Container>) -> Self {
        Self {
            id: container.id(),
            status: container.status(),
            modules: container.runtime().module_names(),
            matches: container.match_count(),
            tick_interval_ms: container.tick_interval().as_millis() as u64,
            saturation: container.saturation(),
        }
    }
}

/// Request to create a container.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateContainerRequest {
    /// Modules to enable.
    #[serde(default)]
    pub modules: Vec<String>,
    /// Tick interval override.
    pub tick_interval_ms: Option<u64>,
    /// Start the periodic scheduler immediately (default true).
    pub play: Option<bool>,
}

/// Request to create a match in a container.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMatchRequest {
    /// Cluster-assigned id; allocated locally when absent.
    pub match_id: Option<MatchId>,
    /// Admission cap (default 16).
    pub player_limit: Option<u32>,
}

/// Request to admit a player (control-plane path).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// The player to admit.
    pub player_id: PlayerId,
}

/// Command submission body.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRequest {
    /// Target match.
    pub match_id: MatchId,
    /// Command name.
    pub name: String,
    /// Raw payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Scheduler drive request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TickRequest {
    /// Run this many manual ticks.
    pub count: Option<u64>,
    /// Start periodic play.
    pub play: Option<bool>,
    /// Stop periodic play (level-triggered; the current tick finishes).
    pub stop: Option<bool>,
}

/// Module reconfiguration request.
#[derive(Debug, Clone, Deserialize)]
pub struct ModulesRequest {
    /// The replacement module set.
    pub modules: Vec<String>,
}

/// Snapshot pull query parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SnapshotQuery {
    /// Player scope override (management callers only).
    pub player: Option<u64>,
    /// `legacy` selects the nested-map wire form.
    pub format: Option<String>,
}

/// Create the node router.
pub fn create_router(state: SharedAppState) -> Router {
    Router::new()
        .route("/api/containers", get(list_containers).post(create_container))
        .route("/api/containers/{id}/matches", post(create_match))
        .route(
            "/api/containers/{id}/matches/{match_id}/players",
            post(join_player),
        )
        .route("/api/containers/{id}/commands", post(submit_command))
        .route("/api/containers/{id}/ticks", post(drive_ticks))
        .route("/api/containers/{id}/modules", post(reconfigure_modules))
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            rate_limit_layer,
        ))
        // Snapshot pulls are unbounded (streaming preferred); health is open.
        .route(
            "/api/containers/{id}/snapshots/{match_id}",
            get(pull_snapshot),
        )
        .route("/health", get(health_handler))
        .route(
            "/ws/containers/{id}/matches/{match_id}/snapshot",
            get(ws::snapshot_stream),
        )
        .route(
            "/ws/containers/{id}/matches/{match_id}/delta",
            get(ws::delta_stream),
        )
        .route("/ws/containers/{id}/commands", get(ws::command_stream))
        .with_state(state)
}

/// Generic per-principal limit (1000 req/min), keyed by bearer.
async fn rate_limit_layer(
    State(state): State<SharedAppState>,
    request: Request,
    next: Next,
) -> Response {
    let key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    let verdict = state.generic_limiter.check(&key);
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

async fn health_handler() -> ApiResponse<HealthResponse> {
    ApiResponse::ok(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn list_containers(
    State(state): State<SharedAppState>,
    BearerToken(token): BearerToken,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;
    let summaries: Vec<ContainerSummary> =
        state.containers.list().iter().map(Into::into).collect();
    Ok(ApiResponse::ok(summaries).into_response())
}

async fn create_container(
    State(state): State<SharedAppState>,
    BearerToken(token): BearerToken,
    Json(request): Json<CreateContainerRequest>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;

    let interval = request.tick_interval_ms.map(Duration::from_millis);
    let container = state.containers.create_container(&request.modules, interval)?;
    container.start()?;

    if request.play.unwrap_or(true) {
        spawn_scheduler(&state, &container);
    }

    debug!(container = %container.id(), "created container via API");
    Ok(ApiResponse::ok(ContainerSummary::from(&container)).into_response())
}

async fn create_match(
    State(state): State<SharedAppState>,
    Path(id): Path<ContainerId>,
    BearerToken(token): BearerToken,
    Json(request): Json<CreateMatchRequest>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;

    let container = state.containers.get(id)?;
    let match_id = container.create_match(request.match_id, request.player_limit.unwrap_or(16))?;
    container.start_match(match_id)?;

    let info = container.match_info(match_id)?;
    Ok(ApiResponse::ok(info).into_response())
}

async fn join_player(
    State(state): State<SharedAppState>,
    Path((id, match_id)): Path<(ContainerId, MatchId)>,
    BearerToken(token): BearerToken,
    Json(request): Json<JoinRequest>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;

    let container = state.containers.get(id)?;
    container.join_match(match_id, request.player_id)?;
    let info = container.match_info(match_id)?;
    Ok(ApiResponse::ok(info).into_response())
}

async fn submit_command(
    State(state): State<SharedAppState>,
    Path(id): Path<ContainerId>,
    BearerToken(token): BearerToken,
    Json(request): Json<CommandRequest>,
) -> Result<Response, ApiError> {
    let claims = state.gate.validate(&token)?;
    state.gate.require_scope(&claims, Scope::SubmitCommands)?;
    state
        .gate
        .authorize_target(&claims, request.match_id, Some(id))?;

    // Command limit: 100/s per container, on top of the generic limit.
    let verdict = state.command_limiter.check(&id.to_string());
    if !verdict.allowed {
        let mut response: Response =
            ApiError::from(StormError::Backpressure(request.match_id)).into_response();
        response.headers_mut().extend(verdict.headers());
        return Ok(response);
    }

    let container = state.containers.get(id)?;
    container.submit_command(
        request.match_id,
        claims.player_id,
        &request.name,
        &request.payload,
    )?;

    Ok(ApiResponse::ok(serde_json::json!({ "accepted": request.name })).into_response())
}

async fn drive_ticks(
    State(state): State<SharedAppState>,
    Path(id): Path<ContainerId>,
    BearerToken(token): BearerToken,
    Json(request): Json<TickRequest>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;
    let container = state.containers.get(id)?;

    if request.stop.unwrap_or(false) {
        if let Some((_, handle)) = state.schedulers.remove(&id) {
            handle.stop();
        }
        return Ok(ApiResponse::ok(serde_json::json!({ "playing": false })).into_response());
    }

    if request.play.unwrap_or(false) {
        spawn_scheduler(&state, &container);
        return Ok(ApiResponse::ok(serde_json::json!({ "playing": true })).into_response());
    }

    let count = request.count.unwrap_or(1);
    for _ in 0..count {
        for frame in container.tick()? {
            state.fanout.publish(frame);
        }
    }

    let matches: Vec<MatchInfo> = container.list_matches();
    Ok(
        ApiResponse::ok(serde_json::json!({ "ticked": count, "matches": matches }))
            .into_response(),
    )
}

async fn reconfigure_modules(
    State(state): State<SharedAppState>,
    Path(id): Path<ContainerId>,
    BearerToken(token): BearerToken,
    Json(request): Json<ModulesRequest>,
) -> Result<Response, ApiError> {
    state.verify_management(&token)?;

    if let Some((_, handle)) = state.schedulers.remove(&id) {
        handle.stop();
    }
    let container = state.containers.reconfigure(id, &request.modules, None)?;
    container.start()?;
    spawn_scheduler(&state, &container);

    Ok(ApiResponse::ok(ContainerSummary::from(&container)).into_response())
}

async fn pull_snapshot(
    State(state): State<SharedAppState>,
    Path((id, match_id)): Path<(ContainerId, MatchId)>,
    Query(query): Query<SnapshotQuery>,
    BearerToken(token): BearerToken,
) -> Result<Response, ApiError> {
    // Players pull with their match token (scoped to their own view);
    // management may pull unscoped or impersonate via ?player=.
    let player = if state.verify_management(&token).is_ok() {
        query.player.map(PlayerId)
    } else {
        let claims = state.gate.validate(&token)?;
        state.gate.require_scope(&claims, Scope::ViewSnapshots)?;
        state.gate.authorize_target(&claims, match_id, Some(id))?;
        Some(claims.player_id)
    };

    let container = state.containers.get(id)?;
    let snapshot = container.snapshot_now(match_id, player)?;

    if query.format.as_deref() == Some("legacy") {
        return Ok(ApiResponse::ok(snapshot.to_legacy()).into_response());
    }
    Ok(ApiResponse::ok(snapshot).into_response())
}

fn spawn_scheduler(state: &SharedAppState, container: &Arc<Container>) {
    let id = container.id();
    if let Some(existing) = state.schedulers.get(&id) {
        if !existing.is_finished() {
            return;
        }
    }
    let handle = SchedulerHandle::spawn(
        Arc::clone(container),
        state.fanout.clone(),
        state.config.tick_budget_multiplier,
        state.config.max_consecutive_overruns,
        None,
    );
    state.schedulers.insert(id, handle);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use stormstack_core::EngineConfig;
    use tower::ServiceExt;

    fn state() -> SharedAppState {
        AppState::new(EngineConfig::default())
    }

    fn secret(state: &SharedAppState) -> String {
        state.config.token_secret.clone()
    }

    async fn send(
        router: Router,
        method: &str,
        uri: &str,
        bearer: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(bearer) = bearer {
            builder = builder.header("Authorization", format!("Bearer {bearer}"));
        }
        let request = match body {
            Some(body) => builder
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request");

        let response = router.oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        let json = if bytes.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, json)
    }

    #[tokio::test]
    async fn health_needs_no_token() {
        let (status, body) = send(create_router(state()), "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "healthy");
        assert!(body["meta"]["requestId"].is_string());
    }

    #[tokio::test]
    async fn containers_require_bearer() {
        let (status, body) =
            send(create_router(state()), "GET", "/api/containers", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn rate_limit_headers_are_stamped() {
        let state = state();
        let secret = secret(&state);
        let router = create_router(Arc::clone(&state));

        let request = Request::builder()
            .method("GET")
            .uri("/api/containers")
            .header("Authorization", format!("Bearer {secret}"))
            .body(Body::empty())
            .expect("request");
        let response = router.oneshot(request).await.expect("response");
        assert!(response.headers().get("x-ratelimit-limit").is_some());
        assert!(response.headers().get("x-ratelimit-remaining").is_some());
        assert!(response.headers().get("x-ratelimit-reset").is_some());
    }

    #[tokio::test]
    async fn container_match_tick_snapshot_flow() {
        let state = state();
        let secret = secret(&state);
        let router = create_router(Arc::clone(&state));

        // Create a container without the periodic scheduler.
        let (status, body) = send(
            router.clone(),
            "POST",
            "/api/containers",
            Some(&secret),
            Some(serde_json::json!({
                "modules": ["entity", "grid_map"],
                "play": false
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let container_id = body["data"]["id"].as_u64().expect("container id");

        // Create and start a match.
        let (status, body) = send(
            router.clone(),
            "POST",
            &format!("/api/containers/{container_id}/matches"),
            Some(&secret),
            Some(serde_json::json!({"playerLimit": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let match_id = body["data"]["id"].as_u64().expect("match id");
        assert_eq!(body["data"]["status"], "RUNNING");

        // Manual tick.
        let (status, body) = send(
            router.clone(),
            "POST",
            &format!("/api/containers/{container_id}/ticks"),
            Some(&secret),
            Some(serde_json::json!({"count": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["ticked"], 1);
        assert_eq!(body["data"]["matches"][0]["currentTick"], 1);

        // Pull the snapshot (management, modern form).
        let (status, body) = send(
            router.clone(),
            "GET",
            &format!("/api/containers/{container_id}/snapshots/{match_id}"),
            Some(&secret),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["tick"], 1);
        assert!(body["data"]["modules"].is_array());

        // Legacy form.
        let (status, body) = send(
            router.clone(),
            "GET",
            &format!("/api/containers/{container_id}/snapshots/{match_id}?format=legacy"),
            Some(&secret),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"]["data"].is_object());

        state.release_all();
    }

    #[tokio::test]
    async fn join_rejects_when_match_full() {
        let state = state();
        let secret = secret(&state);
        let router = create_router(Arc::clone(&state));

        let (_, body) = send(
            router.clone(),
            "POST",
            "/api/containers",
            Some(&secret),
            Some(serde_json::json!({"modules": [], "play": false})),
        )
        .await;
        let container_id = body["data"]["id"].as_u64().expect("container id");

        let (_, body) = send(
            router.clone(),
            "POST",
            &format!("/api/containers/{container_id}/matches"),
            Some(&secret),
            Some(serde_json::json!({"playerLimit": 1})),
        )
        .await;
        let match_id = body["data"]["id"].as_u64().expect("match id");

        let (status, _) = send(
            router.clone(),
            "POST",
            &format!("/api/containers/{container_id}/matches/{match_id}/players"),
            Some(&secret),
            Some(serde_json::json!({"playerId": 1})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(
            router.clone(),
            "POST",
            &format!("/api/containers/{container_id}/matches/{match_id}/players"),
            Some(&secret),
            Some(serde_json::json!({"playerId": 2})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "MATCH_FULL");
        assert_eq!(body["error"]["details"]["playerLimit"], 1);
        assert_eq!(body["error"]["details"]["currentPlayers"], 1);

        state.release_all();
    }

    #[tokio::test]
    async fn commands_require_match_token() {
        let state = state();
        let router = create_router(Arc::clone(&state));

        let (status, body) = send(
            router,
            "POST",
            "/api/containers/1/commands",
            Some("not-a-valid-token"),
            Some(serde_json::json!({"matchId": 1, "name": "spawn", "payload": {}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "INVALID_TOKEN");
    }

    #[tokio::test]
    async fn unknown_module_in_container_request() {
        let state = state();
        let secret = secret(&state);
        let router = create_router(Arc::clone(&state));

        let (status, body) = send(
            router,
            "POST",
            "/api/containers",
            Some(&secret),
            Some(serde_json::json!({"modules": ["checkers"], "play": false})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NOT_FOUND");
    }
}
