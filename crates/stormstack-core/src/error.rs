//! Error types for StormStack.
//!
//! A single taxonomy covers both process roles. Every variant carries a
//! stable `UPPER_SNAKE_CASE` code used verbatim in HTTP error envelopes;
//! the HTTP status mapping lives in `stormstack-net`.

use crate::id::{ConnectionId, ContainerId, EntityId, MatchId, NodeId, TokenId};
use crate::principal::Scope;
use thiserror::Error;

/// Top-level error type for StormStack operations.
#[derive(Debug, Error)]
pub enum StormError {
    /// Login credentials were rejected by the auth collaborator.
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The presented token has expired.
    #[error("Token expired")]
    ExpiredToken,

    /// The presented token is malformed, mis-signed, or revoked.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// The principal may not perform the operation.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The token lacks the scope the operation requires.
    #[error("Scope denied: {required} required")]
    ScopeDenied {
        /// The missing scope.
        required: Scope,
    },

    /// The principal's account is disabled.
    #[error("User disabled")]
    UserDisabled,

    /// Entity was not found in the store.
    #[error("Entity not found: {0}")]
    EntityNotFound(EntityId),

    /// Match was not found.
    #[error("Match not found: {0}")]
    MatchNotFound(MatchId),

    /// Container was not found.
    #[error("Container not found: {0}")]
    ContainerNotFound(ContainerId),

    /// Node was not found in the cluster registry.
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Token record was not found.
    #[error("Token not found: {0}")]
    TokenNotFound(TokenId),

    /// Module was not found.
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// WebSocket connection was not found.
    #[error("Connection not found: {0}")]
    ConnectionNotFound(ConnectionId),

    /// WebSocket connection was closed.
    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The request failed validation.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// A command payload field failed type coercion.
    #[error("Type error: field '{field}' expected {expected}")]
    TypeError {
        /// The offending field name.
        field: String,
        /// The declared type tag.
        expected: &'static str,
    },

    /// No command with the given name is registered for the container.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// The match has reached its player limit.
    #[error("Match full: {current_players}/{player_limit} players")]
    MatchFull {
        /// Configured player limit.
        player_limit: u32,
        /// Players currently in the match.
        current_players: u32,
    },

    /// Requested modules are not universally supported by any node.
    #[error("Unroutable modules: {0:?}")]
    UnroutableModules(Vec<String>),

    /// Module export binding detected a dependency cycle.
    #[error("Unresolvable modules: {0}")]
    UnresolvableModules(String),

    /// All placement attempts failed.
    #[error("Placement failed after {attempts} attempts")]
    PlacementFailed {
        /// Number of nodes tried.
        attempts: u32,
    },

    /// A module dependency is missing or version-incompatible.
    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// A per-match command queue is full; retry with jittered backoff.
    #[error("Backpressure: command queue full for match {0}")]
    Backpressure(MatchId),

    /// A streaming subscriber could not keep up with the tick rate.
    #[error("Slow consumer: {0}")]
    SlowConsumer(ConnectionId),

    /// Entity slots (or another fixed capacity) are exhausted.
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),

    /// A required resource is temporarily unavailable.
    #[error("Resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// Invalid state transition or operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error (catch-all).
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl StormError {
    /// The stable wire code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::ExpiredToken => "EXPIRED_TOKEN",
            Self::InvalidToken(_) => "INVALID_TOKEN",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::ScopeDenied { .. } => "SCOPE_DENIED",
            Self::UserDisabled => "USER_DISABLED",
            Self::EntityNotFound(_)
            | Self::MatchNotFound(_)
            | Self::ContainerNotFound(_)
            | Self::NodeNotFound(_)
            | Self::TokenNotFound(_)
            | Self::ModuleNotFound(_)
            | Self::ConnectionNotFound(_) => "NOT_FOUND",
            Self::ConnectionClosed(_) => "CONNECTION_CLOSED",
            Self::Conflict(_) => "CONFLICT",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::TypeError { .. } => "TYPE_ERROR",
            Self::UnknownCommand(_) => "UNKNOWN_COMMAND",
            Self::MatchFull { .. } => "MATCH_FULL",
            Self::UnroutableModules(_) => "UNROUTABLE_MODULES",
            Self::UnresolvableModules(_) => "UNRESOLVABLE_MODULES",
            Self::PlacementFailed { .. } => "PLACEMENT_FAILED",
            Self::PreconditionFailed(_) => "PRECONDITION_FAILED",
            Self::Backpressure(_) => "BACKPRESSURE",
            Self::SlowConsumer(_) => "SLOW_CONSUMER",
            Self::CapacityExhausted(_) => "CAPACITY_EXHAUSTED",
            Self::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether the submitter should retry with jittered backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Backpressure(_) | Self::ResourceUnavailable(_) | Self::PlacementFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_upper_snake_case() {
        let errors = [
            StormError::ExpiredToken,
            StormError::MatchFull {
                player_limit: 1,
                current_players: 1,
            },
            StormError::Backpressure(MatchId(1)),
            StormError::UnroutableModules(vec!["grid_map".to_string()]),
        ];
        for err in errors {
            let code = err.code();
            assert!(
                code.chars().all(|c| c.is_ascii_uppercase() || c == '_'),
                "bad code {code}"
            );
        }
    }

    #[test]
    fn not_found_variants_share_a_code() {
        assert_eq!(StormError::MatchNotFound(MatchId(1)).code(), "NOT_FOUND");
        assert_eq!(
            StormError::ContainerNotFound(ContainerId(2)).code(),
            "NOT_FOUND"
        );
        assert_eq!(StormError::NodeNotFound(NodeId(3)).code(), "NOT_FOUND");
    }

    #[test]
    fn backpressure_is_retryable() {
        assert!(StormError::Backpressure(MatchId(1)).is_retryable());
        assert!(!StormError::ExpiredToken.is_retryable());
    }

    #[test]
    fn internal_wraps_anyhow() {
        let err: StormError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, StormError::Internal(_)));
        assert_eq!(err.code(), "INTERNAL");
    }

    #[test]
    fn type_error_names_the_field() {
        let err = StormError::TypeError {
            field: "x".to_string(),
            expected: "Float",
        };
        assert!(err.to_string().contains("'x'"));
        assert!(err.to_string().contains("Float"));
    }
}
