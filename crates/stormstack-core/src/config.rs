//! Process configuration.
//!
//! Both daemons read their configuration from `STORMSTACK_*` environment
//! variables with spec defaults. Durations are carried in milliseconds in
//! the environment and exposed as `Duration` where consumed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Engine-node configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// HTTP/WebSocket port. Port 8080 by convention.
    pub http_port: u16,
    /// Address this node advertises to the control plane.
    pub advertised_address: String,
    /// Control plane base URL, when clustered.
    pub control_plane_url: Option<String>,
    /// Default tick interval for new containers, in milliseconds.
    pub tick_interval_ms: u64,
    /// Commands drained per match per tick.
    pub max_commands_per_tick: usize,
    /// Bounded per-match command queue capacity.
    pub queue_capacity: usize,
    /// Tick budget as a multiple of the tick interval.
    pub tick_budget_multiplier: u32,
    /// Consecutive budget overruns before the container is paused.
    pub max_consecutive_overruns: u32,
    /// Entity slots per container.
    pub entity_capacity: usize,
    /// Query-cache bound for the store.
    pub query_cache_capacity: usize,
    /// Heartbeat cadence to the control plane, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Shared secret for match-token validation.
    pub token_secret: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            http_port: 8080,
            advertised_address: "127.0.0.1:8080".to_string(),
            control_plane_url: None,
            tick_interval_ms: 50,
            max_commands_per_tick: 256,
            queue_capacity: 1024,
            tick_budget_multiplier: 5,
            max_consecutive_overruns: 3,
            entity_capacity: 100_000,
            query_cache_capacity: 1024,
            heartbeat_interval_ms: 5_000,
            token_secret: "stormstack-dev-secret".to_string(),
        }
    }
}

impl EngineConfig {
    /// Load from `STORMSTACK_*` environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_port: env_or("STORMSTACK_HTTP_PORT", defaults.http_port),
            advertised_address: std::env::var("STORMSTACK_ADVERTISED_ADDRESS")
                .unwrap_or(defaults.advertised_address),
            control_plane_url: std::env::var("STORMSTACK_CONTROL_PLANE_URL").ok(),
            tick_interval_ms: env_or("STORMSTACK_TICK_INTERVAL_MS", defaults.tick_interval_ms),
            max_commands_per_tick: env_or(
                "STORMSTACK_MAX_COMMANDS_PER_TICK",
                defaults.max_commands_per_tick,
            ),
            queue_capacity: env_or("STORMSTACK_QUEUE_CAPACITY", defaults.queue_capacity),
            tick_budget_multiplier: env_or(
                "STORMSTACK_TICK_BUDGET_MULTIPLIER",
                defaults.tick_budget_multiplier,
            ),
            max_consecutive_overruns: env_or(
                "STORMSTACK_MAX_CONSECUTIVE_OVERRUNS",
                defaults.max_consecutive_overruns,
            ),
            entity_capacity: env_or("STORMSTACK_ENTITY_CAPACITY", defaults.entity_capacity),
            query_cache_capacity: env_or(
                "STORMSTACK_QUERY_CACHE_CAPACITY",
                defaults.query_cache_capacity,
            ),
            heartbeat_interval_ms: env_or(
                "STORMSTACK_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval_ms,
            ),
            token_secret: std::env::var("STORMSTACK_TOKEN_SECRET").unwrap_or(defaults.token_secret),
        }
    }

    /// Default tick interval as a `Duration`.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Heartbeat cadence as a `Duration`.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

/// Control-plane configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlConfig {
    /// HTTP port. Port 8081 by convention.
    pub http_port: u16,
    /// Expected node heartbeat cadence, in milliseconds.
    pub heartbeat_interval_ms: u64,
    /// Heartbeats that may be missed before a node goes offline.
    pub offline_multiplier: u32,
    /// Window during which an offline node may reattach, in milliseconds.
    pub reattach_window_ms: u64,
    /// Placement attempts before giving up.
    pub max_placement_attempts: u32,
    /// Matches per node used by the saturation score denominator.
    pub max_matches_per_node: u32,
    /// Default match-token validity, in seconds.
    pub default_token_validity_secs: u64,
    /// Hard cap on caller-provided token validity, in seconds.
    pub max_token_validity_secs: u64,
    /// Shared secret for match-token signing.
    pub token_secret: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            http_port: 8081,
            heartbeat_interval_ms: 5_000,
            offline_multiplier: 3,
            reattach_window_ms: 300_000,
            max_placement_attempts: 3,
            max_matches_per_node: 256,
            default_token_validity_secs: 3_600,
            max_token_validity_secs: 86_400,
            token_secret: "stormstack-dev-secret".to_string(),
        }
    }
}

impl ControlConfig {
    /// Load from `STORMSTACK_*` environment variables, falling back to defaults.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            http_port: env_or("STORMSTACK_CONTROL_PORT", defaults.http_port),
            heartbeat_interval_ms: env_or(
                "STORMSTACK_HEARTBEAT_INTERVAL_MS",
                defaults.heartbeat_interval_ms,
            ),
            offline_multiplier: env_or("STORMSTACK_OFFLINE_MULTIPLIER", defaults.offline_multiplier),
            reattach_window_ms: env_or(
                "STORMSTACK_REATTACH_WINDOW_MS",
                defaults.reattach_window_ms,
            ),
            max_placement_attempts: env_or(
                "STORMSTACK_MAX_PLACEMENT_ATTEMPTS",
                defaults.max_placement_attempts,
            ),
            max_matches_per_node: env_or(
                "STORMSTACK_MAX_MATCHES_PER_NODE",
                defaults.max_matches_per_node,
            ),
            default_token_validity_secs: env_or(
                "STORMSTACK_DEFAULT_TOKEN_VALIDITY_SECS",
                defaults.default_token_validity_secs,
            ),
            max_token_validity_secs: env_or(
                "STORMSTACK_MAX_TOKEN_VALIDITY_SECS",
                defaults.max_token_validity_secs,
            ),
            token_secret: std::env::var("STORMSTACK_TOKEN_SECRET").unwrap_or(defaults.token_secret),
        }
    }

    /// Heartbeat cadence as a `Duration`.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// How long a node may stay silent before it is marked offline.
    #[must_use]
    pub const fn offline_after(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms * self.offline_multiplier as u64)
    }

    /// Reattach window as a `Duration`.
    #[must_use]
    pub const fn reattach_window(&self) -> Duration {
        Duration::from_millis(self.reattach_window_ms)
    }
}

/// Process exit codes shared by the daemons and CLIs.
pub mod exit {
    /// Clean shutdown.
    pub const SUCCESS: i32 = 0;
    /// User error (bad arguments, malformed request).
    pub const USER_ERROR: i32 = 1;
    /// Authentication failure.
    pub const AUTH_FAILURE: i32 = 2;
    /// Control plane unreachable.
    pub const CONTROL_PLANE_UNREACHABLE: i32 = 3;
    /// Match placement failed.
    pub const PLACEMENT_FAILED: i32 = 4;
    /// Unexpected failure.
    pub const UNEXPECTED: i32 = 64;
}
