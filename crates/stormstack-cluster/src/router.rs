//! Match router: placement and player admission.
//!
//! Placement filters healthy nodes by module support, orders candidates
//! by saturation (registration order, then node id, break ties), honors a
//! preferred-node hint within 0.1 of the leader, and retries transient
//! node failures up to the attempt budget. Admission asks the owning node
//! and mints a match-scoped token on success.

use crate::registry::{NodeRegistry, NodeStatus, NodeSummary};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stormstack_auth::{MatchToken, TokenIssuer};
use stormstack_core::{
    ContainerId, MatchId, NodeId, PlayerId, Result, ScopeSet, StormError,
};
use tracing::{info, warn};

/// A placement request for a new match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementRequest {
    /// Modules the match requires.
    pub modules: Vec<String>,
    /// Admission cap for the match.
    pub player_limit: u32,
    /// Optional placement hint.
    pub preferred_node: Option<NodeId>,
    /// Optional container tick interval override.
    pub tick_interval_ms: Option<u64>,
}

/// A successfully routed match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutedMatch {
    /// The match.
    pub match_id: MatchId,
    /// The node hosting it.
    pub node_id: NodeId,
    /// The container hosting it on that node.
    pub container_id: ContainerId,
    /// Modules enabled for the match.
    pub modules: Vec<String>,
    /// Admission cap.
    pub player_limit: u32,
    /// Placement time.
    pub created_at: DateTime<Utc>,
}

/// Result of admitting a player.
#[derive(Debug, Clone)]
pub struct JoinOutcome {
    /// Signed bearer token for the player.
    pub token: String,
    /// The issued-token record.
    pub record: MatchToken,
    /// Where the match lives.
    pub routed: RoutedMatch,
}

/// The control interface a node exposes to the control plane.
#[async_trait]
pub trait NodeControl: Send + Sync {
    /// Create (and start) a match on the node; returns the hosting container.
    async fn create_match(
        &self,
        node: &NodeSummary,
        match_id: MatchId,
        modules: &[String],
        player_limit: u32,
        tick_interval_ms: Option<u64>,
    ) -> Result<ContainerId>;

    /// Admit a player to a hosted match.
    async fn join_match(
        &self,
        node: &NodeSummary,
        container_id: ContainerId,
        match_id: MatchId,
        player_id: PlayerId,
    ) -> Result<()>;
}

/// Places matches and admits players.
pub struct MatchRouter {
    registry: Arc<NodeRegistry>,
    control: Arc<dyn NodeControl>,
    issuer: Arc<TokenIssuer>,
    matches: DashMap<MatchId, RoutedMatch>,
    max_placement_attempts: u32,
}

impl MatchRouter {
    /// Create a router.
    #[must_use]
    pub fn new(
        registry: Arc<NodeRegistry>,
        control: Arc<dyn NodeControl>,
        issuer: Arc<TokenIssuer>,
        max_placement_attempts: u32,
    ) -> Self {
        Self {
            registry,
            control,
            issuer,
            matches: DashMap::new(),
            max_placement_attempts: max_placement_attempts.max(1),
        }
    }

    /// Place a new match.
    ///
    /// # Errors
    ///
    /// - `UnroutableModules` when no healthy node supports the request.
    /// - `ResourceUnavailable` when the cluster has no healthy nodes.
    /// - `PlacementFailed` after the attempt budget is spent.
    pub async fn route(&self, request: PlacementRequest) -> Result<RoutedMatch> {
        let candidates = self.ordered_candidates(&request)?;
        let match_id = MatchId(rand::random());

        let budget = candidates
            .len()
            .min(self.max_placement_attempts as usize);
        let mut attempts = 0u32;

        for node in candidates.into_iter().take(budget) {
            attempts += 1;
            match self
                .control
                .create_match(
                    &node,
                    match_id,
                    &request.modules,
                    request.player_limit,
                    request.tick_interval_ms,
                )
                .await
            {
                Ok(container_id) => {
                    let routed = RoutedMatch {
                        match_id,
                        node_id: node.id,
                        container_id,
                        modules: request.modules.clone(),
                        player_limit: request.player_limit,
                        created_at: Utc::now(),
                    };
                    info!(
                        %match_id,
                        node = %node.id,
                        container = %container_id,
                        attempts,
                        "placed match"
                    );
                    self.matches.insert(match_id, routed.clone());
                    return Ok(routed);
                }
                Err(error) => {
                    // Transient candidate skip; try the next node.
                    warn!(node = %node.id, %error, "placement attempt failed");
                }
            }
        }

        Err(StormError::PlacementFailed { attempts })
    }

    /// Admit a player to a routed match, minting a scoped token.
    ///
    /// # Errors
    ///
    /// - `MatchNotFound` for an unrouted match.
    /// - `ResourceUnavailable` when the hosting node is offline.
    /// - `MatchFull` / `InvalidState` as reported by the node.
    pub async fn join(
        &self,
        match_id: MatchId,
        player_id: PlayerId,
        player_name: &str,
        valid_for: Option<Duration>,
    ) -> Result<JoinOutcome> {
        let routed = self
            .matches
            .get(&match_id)
            .map(|entry| entry.clone())
            .ok_or(StormError::MatchNotFound(match_id))?;

        let node = self
            .registry
            .get(routed.node_id)
            .filter(|node| node.status != NodeStatus::Offline)
            .ok_or_else(|| {
                StormError::ResourceUnavailable(format!(
                    "node {} hosting match {match_id} is unreachable",
                    routed.node_id
                ))
            })?;

        self.control
            .join_match(&node, routed.container_id, match_id, player_id)
            .await?;

        let (token, record) = self.issuer.issue(
            match_id,
            Some(routed.container_id),
            player_id,
            player_name,
            ScopeSet::player_defaults(),
            valid_for,
        )?;

        Ok(JoinOutcome {
            token,
            record,
            routed,
        })
    }

    /// A routed match, if known.
    #[must_use]
    pub fn get(&self, match_id: MatchId) -> Option<RoutedMatch> {
        self.matches.get(&match_id).map(|entry| entry.clone())
    }

    /// All routed matches, ordered by placement time.
    #[must_use]
    pub fn list(&self) -> Vec<RoutedMatch> {
        let mut matches: Vec<RoutedMatch> =
            self.matches.iter().map(|entry| entry.clone()).collect();
        matches.sort_by_key(|m| (m.created_at, m.match_id));
        matches
    }

    /// Number of routed matches.
    #[must_use]
    pub fn count(&self) -> usize {
        self.matches.len()
    }

    /// Forget every match routed to a node (its reattach window elapsed).
    pub fn purge_node(&self, node_id: NodeId) {
        self.matches.retain(|_, routed| routed.node_id != node_id);
    }

    fn ordered_candidates(&self, request: &PlacementRequest) -> Result<Vec<NodeSummary>> {
        let healthy: Vec<NodeSummary> = self
            .registry
            .list()
            .into_iter()
            .filter(|node| node.status == NodeStatus::Healthy)
            .collect();
        if healthy.is_empty() {
            return Err(StormError::ResourceUnavailable(
                "no healthy nodes registered".to_string(),
            ));
        }

        let unsupported: Vec<String> = request
            .modules
            .iter()
            .filter(|module| {
                !healthy
                    .iter()
                    .any(|node| node.supported_modules.contains(module))
            })
            .cloned()
            .collect();
        if !unsupported.is_empty() {
            return Err(StormError::UnroutableModules(unsupported));
        }

        let mut candidates = self.registry.candidates(&request.modules);
        if candidates.is_empty() {
            return Err(StormError::UnroutableModules(request.modules.clone()));
        }

        candidates.sort_by(|a, b| {
            a.saturation
                .total_cmp(&b.saturation)
                .then(a.registration_seq.cmp(&b.registration_seq))
                .then(a.id.cmp(&b.id))
        });

        if let Some(preferred) = request.preferred_node {
            let leader_saturation = candidates[0].saturation;
            if let Some(position) = candidates.iter().position(|node| node.id == preferred) {
                if candidates[position].saturation <= leader_saturation + 0.1 {
                    let hinted = candidates.remove(position);
                    candidates.insert(0, hinted);
                }
            }
        }

        Ok(candidates)
    }
}

/// HTTP implementation of [`NodeControl`] used by the control-plane daemon.
pub struct HttpNodeControl {
    client: reqwest::Client,
    bearer: String,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<EnvelopeError>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeError {
    code: String,
    message: String,
    details: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct CreatedContainer {
    id: ContainerId,
}

impl HttpNodeControl {
    /// Create a control client presenting `bearer` on node calls.
    #[must_use]
    pub fn new(bearer: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            bearer,
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T> {
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.bearer)
            .json(body)
            .send()
            .await
            .map_err(|e| StormError::ResourceUnavailable(format!("node unreachable: {e}")))?;

        let envelope: Envelope<T> = response
            .json()
            .await
            .map_err(|e| StormError::Serialization(e.to_string()))?;

        match (envelope.data, envelope.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(map_node_error(&error)),
            (None, None) => Err(StormError::Serialization(
                "node response carried neither data nor error".to_string(),
            )),
        }
    }
}

fn map_node_error(error: &EnvelopeError) -> StormError {
    match error.code.as_str() {
        "MATCH_FULL" => {
            let details = error.details.as_ref();
            StormError::MatchFull {
                player_limit: details
                    .and_then(|d| d.get("playerLimit"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0) as u32,
                current_players: details
                    .and_then(|d| d.get("currentPlayers"))
                    .and_then(serde_json::Value::as_u64)
                    .unwrap_or(0) as u32,
            }
        }
        "NOT_FOUND" => StormError::BadRequest(error.message.clone()),
        "INVALID_STATE" => StormError::InvalidState(error.message.clone()),
        _ => StormError::ResourceUnavailable(format!("{}: {}", error.code, error.message)),
    }
}

#[async_trait]
impl NodeControl for HttpNodeControl {
    async fn create_match(
        &self,
        node: &NodeSummary,
        match_id: MatchId,
        modules: &[String],
        player_limit: u32,
        tick_interval_ms: Option<u64>,
    ) -> Result<ContainerId> {
        let container: CreatedContainer = self
            .post(
                &format!("http://{}/api/containers", node.address),
                &serde_json::json!({
                    "modules": modules,
                    "tickIntervalMs": tick_interval_ms,
                }),
            )
            .await?;

        let _: serde_json::Value = self
            .post(
                &format!(
                    "http://{}/api/containers/{}/matches",
                    node.address, container.id
                ),
                &serde_json::json!({
                    "matchId": match_id,
                    "playerLimit": player_limit,
                }),
            )
            .await?;

        Ok(container.id)
    }

    async fn join_match(
        &self,
        node: &NodeSummary,
        container_id: ContainerId,
        match_id: MatchId,
        player_id: PlayerId,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .post(
                &format!(
                    "http://{}/api/containers/{container_id}/matches/{match_id}/players",
                    node.address
                ),
                &serde_json::json!({ "playerId": player_id }),
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{NodeHeartbeat, NodeMetrics};
    use parking_lot::Mutex;
    use stormstack_auth::shared_revocations;

    struct FakeControl {
        attempts: Mutex<Vec<NodeId>>,
        fail_nodes: Mutex<Vec<NodeId>>,
        join_result: Mutex<Option<StormError>>,
    }

    impl FakeControl {
        fn new() -> Self {
            Self {
                attempts: Mutex::new(Vec::new()),
                fail_nodes: Mutex::new(Vec::new()),
                join_result: Mutex::new(None),
            }
        }

        fn fail_once_on(&self, node: NodeId) {
            self.fail_nodes.lock().push(node);
        }

        fn attempts(&self) -> Vec<NodeId> {
            self.attempts.lock().clone()
        }
    }

    #[async_trait]
    impl NodeControl for FakeControl {
        async fn create_match(
            &self,
            node: &NodeSummary,
            _match_id: MatchId,
            _modules: &[String],
            _player_limit: u32,
            _tick_interval_ms: Option<u64>,
        ) -> Result<ContainerId> {
            self.attempts.lock().push(node.id);
            let mut failures = self.fail_nodes.lock();
            if let Some(position) = failures.iter().position(|id| *id == node.id) {
                failures.remove(position);
                return Err(StormError::ResourceUnavailable("node refused".to_string()));
            }
            Ok(ContainerId(node.id.0 + 100))
        }

        async fn join_match(
            &self,
            _node: &NodeSummary,
            _container_id: ContainerId,
            _match_id: MatchId,
            _player_id: PlayerId,
        ) -> Result<()> {
            match self.join_result.lock().take() {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }
    }

    fn issuer() -> Arc<TokenIssuer> {
        Arc::new(TokenIssuer::new(
            "router-test-secret",
            shared_revocations(),
            Duration::from_secs(3_600),
            Duration::from_secs(86_400),
        ))
    }

    fn registry() -> Arc<NodeRegistry> {
        Arc::new(NodeRegistry::new(
            Duration::from_secs(15),
            Duration::from_secs(300),
            100,
        ))
    }

    fn add_node(registry: &NodeRegistry, address: &str, matches: u32) -> NodeId {
        registry.heartbeat(NodeHeartbeat {
            node_id: None,
            address: address.to_string(),
            supported_modules: vec!["entity".to_string(), "grid_map".to_string()],
            metrics: NodeMetrics {
                matches,
                ..NodeMetrics::default()
            },
        })
    }

    fn request(modules: &[&str]) -> PlacementRequest {
        PlacementRequest {
            modules: modules.iter().map(ToString::to_string).collect(),
            player_limit: 8,
            preferred_node: None,
            tick_interval_ms: None,
        }
    }

    #[tokio::test]
    async fn routes_to_least_saturated_node() {
        let registry = registry();
        let _busy = add_node(&registry, "busy:8080", 90);
        let idle = add_node(&registry, "idle:8080", 0);

        let control = Arc::new(FakeControl::new());
        let router = MatchRouter::new(Arc::clone(&registry), control, issuer(), 3);

        let routed = router.route(request(&["entity"])).await.expect("route");
        assert_eq!(routed.node_id, idle);

        // Router invariant: chosen saturation ≤ min(candidates) + 0.1.
        let chosen = registry.get(routed.node_id).expect("node").saturation;
        let min = registry
            .candidates(&["entity".to_string()])
            .iter()
            .map(|n| n.saturation)
            .fold(f64::INFINITY, f64::min);
        assert!(chosen <= min + 0.1);
    }

    #[tokio::test]
    async fn failover_retries_next_candidate() {
        let registry = registry();
        let a = add_node(&registry, "a:8080", 0);
        let b = add_node(&registry, "b:8080", 10);

        let control = Arc::new(FakeControl::new());
        control.fail_once_on(a);
        let router = MatchRouter::new(
            Arc::clone(&registry),
            Arc::clone(&control) as Arc<dyn NodeControl>,
            issuer(),
            3,
        );

        let routed = router.route(request(&["entity"])).await.expect("route");
        assert_eq!(routed.node_id, b);
        let attempts = control.attempts();
        assert_eq!(attempts, vec![a, b]);
        assert!(attempts.len() <= 3);
    }

    #[tokio::test]
    async fn placement_fails_after_attempt_budget() {
        let registry = registry();
        for (i, address) in ["a:8080", "b:8080", "c:8080", "d:8080"].iter().enumerate() {
            let id = add_node(&registry, address, i as u32);
            // Every node refuses.
            let _ = id;
        }

        let control = Arc::new(FakeControl::new());
        for node in registry.list() {
            control.fail_once_on(node.id);
        }
        let router = MatchRouter::new(
            registry,
            Arc::clone(&control) as Arc<dyn NodeControl>,
            issuer(),
            3,
        );

        let result = router.route(request(&["entity"])).await;
        assert!(matches!(
            result,
            Err(StormError::PlacementFailed { attempts: 3 })
        ));
        assert_eq!(control.attempts().len(), 3);
    }

    #[tokio::test]
    async fn unsupported_modules_are_unroutable() {
        let registry = registry();
        add_node(&registry, "a:8080", 0);

        let router = MatchRouter::new(registry, Arc::new(FakeControl::new()), issuer(), 3);
        let result = router.route(request(&["entity", "checkers"])).await;
        match result {
            Err(StormError::UnroutableModules(modules)) => {
                assert_eq!(modules, vec!["checkers".to_string()]);
            }
            other => panic!("expected UnroutableModules, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_cluster_is_resource_unavailable() {
        let router = MatchRouter::new(registry(), Arc::new(FakeControl::new()), issuer(), 3);
        let result = router.route(request(&["entity"])).await;
        assert!(matches!(result, Err(StormError::ResourceUnavailable(_))));
    }

    #[tokio::test]
    async fn preferred_hint_honored_within_margin() {
        let registry = registry();
        // Saturations: 0.5*(m/100): a=0.00, b=0.05.
        let _a = add_node(&registry, "a:8080", 0);
        let b = add_node(&registry, "b:8080", 10);

        let control = Arc::new(FakeControl::new());
        let router = MatchRouter::new(Arc::clone(&registry), control, issuer(), 3);

        let mut req = request(&["entity"]);
        req.preferred_node = Some(b);
        let routed = router.route(req).await.expect("route");
        assert_eq!(routed.node_id, b);
    }

    #[tokio::test]
    async fn preferred_hint_ignored_outside_margin() {
        let registry = registry();
        // b's saturation is 0.25 above the leader's; the hint loses.
        let a = add_node(&registry, "a:8080", 0);
        let b = add_node(&registry, "b:8080", 50);

        let control = Arc::new(FakeControl::new());
        let router = MatchRouter::new(Arc::clone(&registry), control, issuer(), 3);

        let mut req = request(&["entity"]);
        req.preferred_node = Some(b);
        let routed = router.route(req).await.expect("route");
        assert_eq!(routed.node_id, a);
    }

    #[tokio::test]
    async fn join_issues_scoped_token() {
        let registry = registry();
        add_node(&registry, "a:8080", 0);

        let control = Arc::new(FakeControl::new());
        let router = MatchRouter::new(Arc::clone(&registry), control, issuer(), 3);

        let routed = router.route(request(&["entity"])).await.expect("route");
        let outcome = router
            .join(routed.match_id, PlayerId(7), "ada", None)
            .await
            .expect("join");

        assert_eq!(outcome.record.match_id, routed.match_id);
        assert_eq!(outcome.record.container_id, Some(routed.container_id));
        assert_eq!(outcome.record.player_id, PlayerId(7));
        assert!(!outcome.token.is_empty());
    }

    #[tokio::test]
    async fn join_propagates_match_full() {
        let registry = registry();
        add_node(&registry, "a:8080", 0);

        let control = Arc::new(FakeControl::new());
        *control.join_result.lock() = Some(StormError::MatchFull {
            player_limit: 1,
            current_players: 1,
        });
        let router = MatchRouter::new(
            Arc::clone(&registry),
            Arc::clone(&control) as Arc<dyn NodeControl>,
            issuer(),
            3,
        );

        let routed = router.route(request(&["entity"])).await.expect("route");
        let result = router.join(routed.match_id, PlayerId(2), "bob", None).await;
        assert!(matches!(
            result,
            Err(StormError::MatchFull {
                player_limit: 1,
                current_players: 1
            })
        ));
    }

    #[tokio::test]
    async fn join_unknown_match_not_found() {
        let router = MatchRouter::new(registry(), Arc::new(FakeControl::new()), issuer(), 3);
        let result = router.join(MatchId(404), PlayerId(1), "x", None).await;
        assert!(matches!(result, Err(StormError::MatchNotFound(_))));
    }

    #[tokio::test]
    async fn purge_node_forgets_its_matches() {
        let registry = registry();
        let node = add_node(&registry, "a:8080", 0);
        let router = MatchRouter::new(
            Arc::clone(&registry),
            Arc::new(FakeControl::new()),
            issuer(),
            3,
        );

        let routed = router.route(request(&["entity"])).await.expect("route");
        assert_eq!(router.count(), 1);
        router.purge_node(node);
        assert!(router.get(routed.match_id).is_none());
    }
}
