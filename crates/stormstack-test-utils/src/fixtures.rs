//! Token fixtures and builders.

use std::sync::Arc;
use std::time::Duration;
use stormstack_auth::{shared_revocations, TokenGate, TokenIssuer};
use stormstack_core::{ContainerId, MatchId, PlayerId, ScopeSet};

/// Shared secret used by test issuers and gates.
pub const TEST_SECRET: &str = "stormstack-test-secret";

/// An issuer/gate pair sharing a secret and revocation list.
#[must_use]
pub fn issuer_and_gate() -> (Arc<TokenIssuer>, TokenGate) {
    let revocations = shared_revocations();
    let issuer = Arc::new(TokenIssuer::new(
        TEST_SECRET,
        Arc::clone(&revocations),
        Duration::from_secs(3_600),
        Duration::from_secs(86_400),
    ));
    let gate = TokenGate::new(TEST_SECRET, revocations);
    (issuer, gate)
}

/// A default-scoped player token for `(match, container, player)`.
///
/// # Panics
///
/// Panics on issuance failure; fixture construction is test-only.
#[must_use]
#[allow(clippy::expect_used)]
pub fn player_token(
    issuer: &TokenIssuer,
    match_id: MatchId,
    container_id: ContainerId,
    player_id: PlayerId,
) -> String {
    issuer
        .issue(
            match_id,
            Some(container_id),
            player_id,
            "fixture-player",
            ScopeSet::player_defaults(),
            None,
        )
        .expect("issue fixture token")
        .0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_token_validates_through_gate() {
        let (issuer, gate) = issuer_and_gate();
        let token = player_token(&issuer, MatchId(1), ContainerId(2), PlayerId(7));
        let claims = gate.validate(&token).expect("validate");
        assert_eq!(claims.match_id, MatchId(1));
        assert_eq!(claims.player_id, PlayerId(7));
    }
}
