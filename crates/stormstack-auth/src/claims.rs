//! Match-token claims.

use serde::{Deserialize, Serialize};
use stormstack_core::{ContainerId, MatchId, PlayerId, Scope, ScopeSet, TokenId};

/// Claims carried by a signed match token.
///
/// Scopes the bearer to one `(match, container, player)` tuple; checked on
/// every operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchClaims {
    /// Token id (JWT `jti`), keying the issuer's record and revocation set.
    pub jti: TokenId,

    /// The match the token grants access to.
    pub match_id: MatchId,

    /// The container hosting the match, when known at issuance.
    pub container_id: Option<ContainerId>,

    /// The player the token acts for.
    pub player_id: PlayerId,

    /// Display name of the player.
    pub player_name: String,

    /// Granted scopes.
    pub scopes: ScopeSet,

    /// Issued at (Unix timestamp).
    pub iat: i64,

    /// Expiration time (Unix timestamp).
    pub exp: i64,
}

impl MatchClaims {
    /// Whether the claims carry a scope.
    #[must_use]
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(scope)
    }

    /// Seconds of validity remaining relative to `now` (may be negative).
    #[must_use]
    pub const fn remaining_secs(&self, now: i64) -> i64 {
        self.exp - now
    }
}
