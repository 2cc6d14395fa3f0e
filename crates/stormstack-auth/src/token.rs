//! Match-token issuance and revocation.

use crate::claims::MatchClaims;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::{DashMap, DashSet};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use stormstack_core::{
    ContainerId, IdAllocator, MatchId, PlayerId, Result, ScopeSet, StormError, TokenId,
};
use tracing::{debug, info};

/// Issued-token record kept by the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchToken {
    /// Token id.
    pub id: TokenId,
    /// Scoped match.
    pub match_id: MatchId,
    /// Scoped container, when known at issuance.
    pub container_id: Option<ContainerId>,
    /// Scoped player.
    pub player_id: PlayerId,
    /// Player display name.
    pub player_name: String,
    /// Granted scopes.
    pub scopes: ScopeSet,
    /// Issuance time.
    pub created_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
    /// Revocation time, once revoked.
    pub revoked_at: Option<DateTime<Utc>>,
}

/// Shared set of revoked token ids, consulted by every gate in-process.
pub type RevocationList = Arc<DashSet<TokenId>>;

/// Create an empty revocation list.
#[must_use]
pub fn shared_revocations() -> RevocationList {
    Arc::new(DashSet::new())
}

/// Mints signed match tokens and keeps their records.
pub struct TokenIssuer {
    encoding: EncodingKey,
    records: DashMap<TokenId, MatchToken>,
    revocations: RevocationList,
    allocator: IdAllocator,
    default_validity: Duration,
    max_validity: Duration,
}

impl TokenIssuer {
    /// Create an issuer signing with `secret`.
    #[must_use]
    pub fn new(
        secret: &str,
        revocations: RevocationList,
        default_validity: Duration,
        max_validity: Duration,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            records: DashMap::new(),
            revocations,
            allocator: IdAllocator::default(),
            default_validity,
            max_validity,
        }
    }

    /// Issue a token scoped to `(match, container, player)`.
    ///
    /// `valid_for` defaults to the configured validity and is hard-capped
    /// at the configured maximum.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if signing fails.
    pub fn issue(
        &self,
        match_id: MatchId,
        container_id: Option<ContainerId>,
        player_id: PlayerId,
        player_name: &str,
        scopes: ScopeSet,
        valid_for: Option<Duration>,
    ) -> Result<(String, MatchToken)> {
        let validity = valid_for
            .unwrap_or(self.default_validity)
            .min(self.max_validity);
        let now = Utc::now();
        let expires_at = now
            + ChronoDuration::from_std(validity)
                .unwrap_or_else(|_| ChronoDuration::seconds(i64::MAX / 2));

        let id = TokenId(self.allocator.allocate());
        let claims = MatchClaims {
            jti: id,
            match_id,
            container_id,
            player_id,
            player_name: player_name.to_string(),
            scopes: scopes.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| StormError::Internal(anyhow_error(e)))?;

        let record = MatchToken {
            id,
            match_id,
            container_id,
            player_id,
            player_name: player_name.to_string(),
            scopes,
            created_at: now,
            expires_at,
            revoked_at: None,
        };
        self.records.insert(id, record.clone());
        debug!(token = %id, %match_id, player = %player_id, "issued match token");
        Ok((token, record))
    }

    /// Revoke a token. Every subsequent validation of it fails.
    ///
    /// # Errors
    ///
    /// Returns `TokenNotFound` for an unknown id.
    pub fn revoke(&self, id: TokenId) -> Result<()> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(StormError::TokenNotFound(id))?;
        if record.revoked_at.is_none() {
            record.revoked_at = Some(Utc::now());
            self.revocations.insert(id);
            info!(token = %id, "revoked match token");
        }
        Ok(())
    }

    /// Look up an issued-token record.
    #[must_use]
    pub fn get(&self, id: TokenId) -> Option<MatchToken> {
        self.records.get(&id).map(|r| r.clone())
    }

    /// Number of issued tokens.
    #[must_use]
    pub fn count(&self) -> usize {
        self.records.len()
    }

    /// The revocation list gates share.
    #[must_use]
    pub fn revocations(&self) -> RevocationList {
        Arc::clone(&self.revocations)
    }
}

fn anyhow_error(e: jsonwebtoken::errors::Error) -> anyhow::Error {
    anyhow::anyhow!("jwt: {e}")
}
