//! Principals and token scopes.
//!
//! Every permissioned operation receives a [`Principal`]. The superuser
//! principal is minted in-process by the module runtime for the built-in
//! spawn/flag-attachment path and is never exposed externally.

use crate::id::PlayerId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Capability scope carried by a match token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    /// Submit commands to the token's match.
    SubmitCommands,
    /// Receive snapshot and delta streams.
    ViewSnapshots,
    /// Receive per-command error events.
    ReceiveErrors,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::SubmitCommands => "submit_commands",
            Self::ViewSnapshots => "view_snapshots",
            Self::ReceiveErrors => "receive_errors",
        };
        f.write_str(s)
    }
}

/// An ordered set of scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeSet(BTreeSet<Scope>);

impl ScopeSet {
    /// Empty scope set.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeSet::new())
    }

    /// The default scopes granted on player admission.
    #[must_use]
    pub fn player_defaults() -> Self {
        Self::from_iter([Scope::SubmitCommands, Scope::ViewSnapshots, Scope::ReceiveErrors])
    }

    /// Check membership.
    #[must_use]
    pub fn contains(&self, scope: Scope) -> bool {
        self.0.contains(&scope)
    }

    /// Insert a scope.
    pub fn insert(&mut self, scope: Scope) {
        self.0.insert(scope);
    }

    /// Iterate over the scopes in order.
    pub fn iter(&self) -> impl Iterator<Item = Scope> + '_ {
        self.0.iter().copied()
    }

    /// Number of scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no scopes are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Scope> for ScopeSet {
    fn from_iter<I: IntoIterator<Item = Scope>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// The identity on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    /// The player this principal acts for, if any.
    pub player_id: Option<PlayerId>,
    /// Whether the principal may attach Private components.
    superuser: bool,
}

impl Principal {
    /// A player-scoped principal derived from a validated match token.
    #[must_use]
    pub const fn player(player_id: PlayerId) -> Self {
        Self {
            player_id: Some(player_id),
            superuser: false,
        }
    }

    /// The in-process superuser used by the built-in entity-creation and
    /// flag-attachment path. Never derived from an external token.
    #[must_use]
    pub const fn superuser() -> Self {
        Self {
            player_id: None,
            superuser: true,
        }
    }

    /// An anonymous, unprivileged principal (system paths that only read).
    #[must_use]
    pub const fn anonymous() -> Self {
        Self {
            player_id: None,
            superuser: false,
        }
    }

    /// Whether this principal may bypass Private enforcement.
    #[must_use]
    pub const fn is_superuser(&self) -> bool {
        self.superuser
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_serializes_snake_case() {
        let json = serde_json::to_string(&Scope::SubmitCommands).expect("serialize");
        assert_eq!(json, "\"submit_commands\"");
    }

    #[test]
    fn player_defaults_hold_all_three() {
        let scopes = ScopeSet::player_defaults();
        assert!(scopes.contains(Scope::SubmitCommands));
        assert!(scopes.contains(Scope::ViewSnapshots));
        assert!(scopes.contains(Scope::ReceiveErrors));
        assert_eq!(scopes.len(), 3);
    }

    #[test]
    fn scope_set_roundtrip() {
        let scopes = ScopeSet::from_iter([Scope::ViewSnapshots]);
        let json = serde_json::to_string(&scopes).expect("serialize");
        assert_eq!(json, "[\"view_snapshots\"]");
        let parsed: ScopeSet = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, scopes);
    }

    #[test]
    fn superuser_has_no_player() {
        let p = Principal::superuser();
        assert!(p.is_superuser());
        assert!(p.player_id.is_none());
    }

    #[test]
    fn player_principal_is_not_superuser() {
        let p = Principal::player(PlayerId(7));
        assert!(!p.is_superuser());
        assert_eq!(p.player_id, Some(PlayerId(7)));
    }
}
