//! Standardized API responses.
//!
//! Success: `{"data": ..., "meta": {"timestamp", "requestId"}}`.
//! Error: `{"error": {"code", "message", "details"}}` with the code taken
//! verbatim from the error taxonomy.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stormstack_core::{RequestId, StormError};

/// Envelope metadata attached to every success response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMeta {
    /// Wall-clock time the response was produced.
    pub timestamp: DateTime<Utc>,
    /// Correlation id for this request.
    pub request_id: RequestId,
}

impl ResponseMeta {
    /// Fresh metadata for the current request.
    #[must_use]
    pub fn now() -> Self {
        Self {
            timestamp: Utc::now(),
            request_id: RequestId::new(),
        }
    }
}

/// Success envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    /// Response payload.
    pub data: T,
    /// Envelope metadata.
    pub meta: ResponseMeta,
}

impl<T: Serialize> ApiResponse<T> {
    /// Wrap a payload.
    pub fn ok(data: T) -> Self {
        Self {
            data,
            meta: ResponseMeta::now(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Error envelope body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// The error object.
    pub error: ApiErrorBody,
}

/// The `error` object inside the envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorBody {
    /// Taxonomy code in `UPPER_SNAKE_CASE`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Structured details, when the error carries them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Build an error envelope.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorBody {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// HTTP status for this error's code.
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        status_for_code(&self.error.code)
    }
}

impl From<&StormError> for ApiError {
    fn from(error: &StormError) -> Self {
        let mut api = Self::new(error.code(), error.to_string());
        if let StormError::MatchFull {
            player_limit,
            current_players,
        } = error
        {
            api = api.with_details(serde_json::json!({
                "playerLimit": player_limit,
                "currentPlayers": current_players,
            }));
        }
        if let StormError::UnroutableModules(modules) = error {
            api = api.with_details(serde_json::json!({ "modules": modules }));
        }
        if let StormError::TypeError { field, expected } = error {
            api = api.with_details(serde_json::json!({
                "field": field,
                "expected": expected,
            }));
        }
        api
    }
}

impl From<StormError> for ApiError {
    fn from(error: StormError) -> Self {
        Self::from(&error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

fn status_for_code(code: &str) -> StatusCode {
    match code {
        "INVALID_CREDENTIALS" | "EXPIRED_TOKEN" | "INVALID_TOKEN" => StatusCode::UNAUTHORIZED,
        "PERMISSION_DENIED" | "SCOPE_DENIED" | "USER_DISABLED" => StatusCode::FORBIDDEN,
        "NOT_FOUND" => StatusCode::NOT_FOUND,
        "CONFLICT" | "MATCH_FULL" | "INVALID_STATE" => StatusCode::CONFLICT,
        "BAD_REQUEST" | "TYPE_ERROR" | "UNKNOWN_COMMAND" | "SERIALIZATION_ERROR" => {
            StatusCode::BAD_REQUEST
        }
        "UNROUTABLE_MODULES" | "PLACEMENT_FAILED" | "UNRESOLVABLE_MODULES" => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        "PRECONDITION_FAILED" => StatusCode::PRECONDITION_FAILED,
        "BACKPRESSURE" => StatusCode::TOO_MANY_REQUESTS,
        "CAPACITY_EXHAUSTED" | "RESOURCE_UNAVAILABLE" => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
