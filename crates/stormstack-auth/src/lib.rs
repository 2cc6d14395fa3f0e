//! # StormStack Auth
//!
//! Match-token issuance (control plane) and the token/principal gate
//! validated on every inbound HTTP and streaming connection (engine
//! nodes). User/role management and login live in the external auth
//! collaborator; only match-scoped capability tokens are minted here.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod claims;
pub mod gate;
pub mod token;

pub use claims::MatchClaims;
pub use gate::TokenGate;
pub use token::{shared_revocations, MatchToken, RevocationList, TokenIssuer};
