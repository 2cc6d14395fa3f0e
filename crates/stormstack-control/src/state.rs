//! Control-plane state.

use std::sync::Arc;
use std::time::Duration;
use stormstack_auth::{shared_revocations, TokenIssuer};
use stormstack_cluster::{HttpNodeControl, MatchRouter, NodeControl, NodeRegistry};
use stormstack_core::{ControlConfig, Result, StormError};
use stormstack_net::RateLimiter;

/// Shared control-plane state type alias.
pub type SharedControlState = Arc<ControlState>;

/// Control-plane state shared across handlers and the sweeper.
pub struct ControlState {
    /// Control configuration.
    pub config: ControlConfig,
    /// Node registry.
    pub registry: Arc<NodeRegistry>,
    /// Match router.
    pub router: MatchRouter,
    /// Token issuer (revocation authority).
    pub issuer: Arc<TokenIssuer>,
    /// Generic per-principal limiter (1000 req/min).
    pub limiter: RateLimiter,
}

impl ControlState {
    /// Build control state with the HTTP node-control client.
    #[must_use]
    pub fn new(config: ControlConfig) -> SharedControlState {
        let control = Arc::new(HttpNodeControl::new(config.token_secret.clone()));
        Self::with_control(config, control)
    }

    /// Build control state with an explicit node-control implementation
    /// (tests use an in-process fake).
    #[must_use]
    pub fn with_control(
        config: ControlConfig,
        control: Arc<dyn NodeControl>,
    ) -> SharedControlState {
        let registry = Arc::new(NodeRegistry::new(
            config.offline_after(),
            config.reattach_window(),
            config.max_matches_per_node,
        ));
        let issuer = Arc::new(TokenIssuer::new(
            &config.token_secret,
            shared_revocations(),
            Duration::from_secs(config.default_token_validity_secs),
            Duration::from_secs(config.max_token_validity_secs),
        ));
        let router = MatchRouter::new(
            Arc::clone(&registry),
            control,
            Arc::clone(&issuer),
            config.max_placement_attempts,
        );

        Arc::new(Self {
            config,
            registry,
            router,
            issuer,
            limiter: RateLimiter::generic(),
        })
    }

    /// Verify the management bearer shared with engine nodes.
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
}
