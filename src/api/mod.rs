//! HTTP handlers and the shared response envelope.
//!
//! Every endpoint responds with `{success, data?, message?, error?}` plus
//! `pagination` on list endpoints. Statuses follow REST convention, with
//! one deliberate exception: the solver chat endpoint returns 200 even on
//! internal failure (see `solver::chat`).

pub mod assist;
pub mod records;
pub mod solver;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;
use crate::store::StoreError;

/// Standard response envelope.
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> Envelope<T> {
    pub fn data(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
        })
    }

    pub fn with_message(message: impl Into<String>, data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            error: None,
        })
    }
}

/// Success acknowledgment with no payload.
pub fn ok_message(message: impl Into<String>) -> Json<Envelope<()>> {
    Json(Envelope {
        success: true,
        data: None,
        message: Some(message.into()),
        error: None,
    })
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub page: usize,
    pub pages: usize,
    pub limit: usize,
}

/// Envelope variant for list endpoints.
#[derive(Debug, Serialize)]
pub struct ListEnvelope<T: Serialize> {
    pub success: bool,
    pub data: Vec<T>,
    pub pagination: Pagination,
}

/// Error responses reuse the envelope with `success: false`.
pub type ApiError = (StatusCode, Json<Envelope<()>>);

pub fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(Envelope {
            success: false,
            data: None,
            message: Some(message.into()),
            error: None,
        }),
    )
}

/// Error response carrying a detail string alongside the caller-facing
/// message, matching the original API's `{message, error}` pairs.
pub fn api_error_detail(
    status: StatusCode,
    message: impl Into<String>,
    error: impl Into<String>,
) -> ApiError {
    (
        status,
        Json(Envelope {
            success: false,
            data: None,
            message: Some(message.into()),
            error: Some(error.into()),
        }),
    )
}

/// Map a store error to a response: NotFound becomes 404, validation
/// becomes 400 with the field-level message as the error detail.
pub fn store_error(err: StoreError, message: &str) -> ApiError {
    match &err {
        StoreError::NotFound => api_error(StatusCode::NOT_FOUND, "RCA not found"),
        StoreError::Validation { .. } => {
            api_error_detail(StatusCode::BAD_REQUEST, message, err.to_string())
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub ai_enabled: bool,
    pub timestamp: String,
}

/// GET /api/health - liveness plus whether the LLM credential is configured.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "RCA System API is running",
        ai_enabled: state.config.llm.is_configured(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_omits_empty_fields() {
        let json = serde_json::to_value(&*Envelope::data(42)).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"], 42);
        assert!(json.get("message").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn test_error_envelope_shape() {
        let (status, body) = api_error_detail(
            StatusCode::BAD_REQUEST,
            "Failed to create RCA",
            "Issue title is required",
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let json = serde_json::to_value(&*body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["message"], "Failed to create RCA");
        assert_eq!(json["error"], "Issue title is required");
    }
}
