//! Token/principal gate.
//!
//! Validates bearer tokens on every inbound HTTP and streaming
//! connection. Signature and shape come from the JWT; expiry uses the
//! monotonic clock via a process-scoped first-seen cache whose TTL never
//! exceeds the token lifetime; revocation consults the shared list.

use crate::claims::MatchClaims;
use crate::token::RevocationList;
use chrono::Utc;
use dashmap::DashMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::time::{Duration, Instant};
use stormstack_core::{ContainerId, MatchId, Principal, Result, Scope, StormError, TokenId};
use tracing::trace;

struct CachedEntry {
    first_seen: Instant,
    ttl: Duration,
}

/// Validates match tokens and derives principals from them.
pub struct TokenGate {
    decoding: DecodingKey,
    validation: Validation,
    revocations: RevocationList,
    cache: DashMap<TokenId, CachedEntry>,
}

impl TokenGate {
    /// Create a gate verifying with `secret`.
    #[must_use]
    pub fn new(secret: &str, revocations: RevocationList) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is enforced below against the monotonic clock.
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            revocations,
            cache: DashMap::new(),
        }
    }

    /// Validate a bearer token and return its claims.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` on malformed input, a bad signature, or a revoked id.
    /// - `ExpiredToken` once the monotonic lifetime has elapsed.
    pub fn validate(&self, token: &str) -> Result<MatchClaims> {
        let data = decode::<MatchClaims>(token, &self.decoding, &self.validation)
            .map_err(|e| StormError::InvalidToken(e.to_string()))?;
        let claims = data.claims;

        if self.revocations.contains(&claims.jti) {
            return Err(StormError::InvalidToken("token revoked".to_string()));
        }

        // First sight pins the remaining lifetime to the monotonic clock;
        // later validations never consult wall time again.
        match self.cache.get(&claims.jti) {
            Some(entry) => {
                if entry.first_seen.elapsed() > entry.ttl {
                    return Err(StormError::ExpiredToken);
                }
            }
            None => {
                let remaining = claims.remaining_secs(Utc::now().timestamp());
                if remaining <= 0 {
                    return Err(StormError::ExpiredToken);
                }
                self.cache.insert(
                    claims.jti,
                    CachedEntry {
                        first_seen: Instant::now(),
                        ttl: Duration::from_secs(remaining as u64),
                    },
                );
            }
        }

        trace!(token = %claims.jti, match_id = %claims.match_id, "token validated");
        Ok(claims)
    }

    /// Require a scope on validated claims.
    ///
    /// # Errors
    ///
    /// Returns `ScopeDenied` naming the missing scope.
    pub fn require_scope(&self, claims: &MatchClaims, scope: Scope) -> Result<()> {
        if claims.has_scope(scope) {
            Ok(())
        } else {
            Err(StormError::ScopeDenied { required: scope })
        }
    }

    /// Verify the token's match (and container, when the token pins one)
    /// agree with the operation's target.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenied` on any mismatch.
    pub fn authorize_target(
        &self,
        claims: &MatchClaims,
        match_id: MatchId,
        container_id: Option<ContainerId>,
    ) -> Result<()> {
        if claims.match_id != match_id {
            return Err(StormError::PermissionDenied(format!(
                "token is scoped to match {}, not {match_id}",
                claims.match_id
            )));
        }
        if let (Some(bound), Some(target)) = (claims.container_id, container_id) {
            if bound != target {
                return Err(StormError::PermissionDenied(format!(
                    "token is scoped to container {bound}, not {target}"
                )));
            }
        }
        Ok(())
    }

    /// Derive the ECS principal for validated claims.
    #[must_use]
    pub fn principal(claims: &MatchClaims) -> Principal {
        Principal::player(claims.player_id)
    }

    /// Drop cache entries whose monotonic TTL elapsed.
    pub fn sweep_cache(&self) {
        self.cache
            .retain(|_, entry| entry.first_seen.elapsed() <= entry.ttl);
    }
}
