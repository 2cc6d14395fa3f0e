//! Application state for axum handlers.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use stormstack_auth::{shared_revocations, TokenGate};
use stormstack_core::{ContainerId, EngineConfig, NodeId, Result, StormError};
use stormstack_engine::{
    shared_container_service, SchedulerHandle, SharedContainerService,
};
use stormstack_game_modules::{EntityModule, GridMapModule};
use stormstack_net::RateLimiter;
use stormstack_ws::{shared_fanout, SharedFanoutHub};

/// Shared application state type alias.
pub type SharedAppState = Arc<AppState>;

/// Engine-node state shared across handlers and background tasks.
pub struct AppState {
    /// Engine configuration.
    pub config: EngineConfig,
    /// Node id, assigned by the control plane on first heartbeat.
    pub node_id: Mutex<Option<NodeId>>,
    /// Container service with the node's module catalog.
    pub containers: SharedContainerService,
    /// Snapshot fanout hub fed by every container's scheduler.
    pub fanout: SharedFanoutHub,
    /// Match-token gate.
    pub gate: TokenGate,
    /// Scheduler seats, one per playing container.
    pub schedulers: DashMap<ContainerId, SchedulerHandle>,
    /// Generic per-principal limiter (1000 req/min).
    pub generic_limiter: RateLimiter,
    /// Command limiter (100 commands/s per container).
    pub command_limiter: RateLimiter,
}

impl AppState {
    /// Build node state with the built-in modules registered.
    #[must_use]
    pub fn new(config: EngineConfig) -> SharedAppState {
        let containers = shared_container_service(config.clone());
        containers.catalog().register(Arc::new(EntityModule::new()));
        containers.catalog().register(Arc::new(GridMapModule::new()));

        // Revocation sync with the control plane is delegated to token
        // expiry: nodes only learn revocations through reissue.
        let gate = TokenGate::new(&config.token_secret, shared_revocations());

        Arc::new(Self {
            config,
            node_id: Mutex::new(None),
            containers,
            fanout: shared_fanout(),
            gate,
            schedulers: DashMap::new(),
            generic_limiter: RateLimiter::generic(),
            command_limiter: RateLimiter::commands(),
        })
    }

    /// Verify a management bearer (the control plane's shared secret,
    /// standing in for the external IdP's operator tokens).
    ///
    /// # Errors
    ///
    /// Returns `InvalidToken` on mismatch.
    pub fn verify_management(&self, token: &str) -> Result<()> {
        if token == self.config.token_secret {
            Ok(())
        } else {
            Err(StormError::InvalidToken(
                "management credential rejected".to_string(),
            ))
        }
    }

    /// Stop every scheduler and container; used on shutdown and tests.
    pub fn release_all(&self) {
        for entry in &self.schedulers {
            entry.value().stop();
        }
        self.containers.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_modules_are_registered() {
        let state = AppState::new(EngineConfig::default());
        let names = state.containers.catalog().names();
        assert!(names.contains(&"entity".to_string()));
        assert!(names.contains(&"grid_map".to_string()));
    }

    #[test]
    fn management_bearer_is_the_shared_secret() {
        let state = AppState::new(EngineConfig::default());
        state
            .verify_management(&state.config.token_secret.clone())
            .expect("accept");
        assert!(state.verify_management("wrong").is_err());
    }
}
