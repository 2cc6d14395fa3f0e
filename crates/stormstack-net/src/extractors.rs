//! Common request extractors.
//!
//! The bearer token is extracted raw here; validation happens in the
//! handler against the daemon's gate so rejections flow through the
//! standard error envelope. For streaming upgrades the token may instead
//! arrive via the `Bearer.<token>` sub-protocol or a `token` query
//! parameter (preferred in that order); see [`BearerToken::from_upgrade`].

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use stormstack_core::StormError;

/// Raw bearer token from the `Authorization` header.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    /// Extract from upgrade-level fields: the
    /// `Sec-WebSocket-Protocol: Bearer.<token>` sub-protocol (preferred)
    /// or a `?token=<token>` query parameter.
    #[must_use]
    pub fn from_upgrade(protocols: Option<&str>, query_token: Option<&str>) -> Option<Self> {
        if let Some(protocols) = protocols {
            for protocol in protocols.split(',') {
                if let Some(token) = protocol.trim().strip_prefix("Bearer.") {
                    return Some(Self(token.to_string()));
                }
            }
        }
        query_token.map(|token| Self(token.to_string()))
    }
}

impl<S: Send + Sync> FromRequestParts<S> for BearerToken {
    type Rejection = crate::responses::ApiError;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl Future<Output = Result<Self, Self::Rejection>> + Send {
        let header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string);

        async move {
            let header = header.ok_or_else(|| {
                crate::responses::ApiError::from(StormError::InvalidToken(
                    "missing Authorization header".to_string(),
                ))
            })?;
            let token = header.strip_prefix("Bearer ").ok_or_else(|| {
                crate::responses::ApiError::from(StormError::InvalidToken(
                    "Authorization header is not a bearer token".to_string(),
                ))
            })?;
            Ok(Self(token.to_string()))
        }
    }
}
