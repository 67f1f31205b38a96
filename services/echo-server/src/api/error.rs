//! API errors, rendered as `application/problem+json`.

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use netfault_delay::DelayError;
use serde::Serialize;

const PROBLEM_JSON: &str = "application/problem+json";

/// Problem details body.
#[derive(Debug, Serialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    /// Stable machine-readable code.
    pub code: String,
    /// Offending input (header name or config field).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub problem: Box<ProblemDetails>,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, detail: String) -> Self {
        let problem = ProblemDetails {
            kind: format!("about:blank#{code}"),
            title: status.canonical_reason().unwrap_or("Error").to_string(),
            status: status.as_u16(),
            detail,
            code: code.to_string(),
            field: None,
        };
        Self {
            status,
            problem: Box::new(problem),
        }
    }

    pub fn internal(code: &str, detail: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, code, detail.into())
    }
}

impl From<DelayError> for ApiError {
    fn from(err: DelayError) -> Self {
        let mut api = Self::new(
            StatusCode::BAD_REQUEST,
            "invalid_delay_override",
            err.to_string(),
        );
        api.problem.field = Some(err.field().to_string());
        api
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            [(header::CONTENT_TYPE, PROBLEM_JSON)],
            Json(self.problem),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_delay_error_becomes_problem_json() {
        let err: ApiError = DelayError::InvalidOverride {
            key: "x-delay-multiplier".into(),
            value: "abc".into(),
        }
        .into();
        assert_eq!(err.problem.field.as_deref(), Some("x-delay-multiplier"));

        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers()[header::CONTENT_TYPE], PROBLEM_JSON);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], 400);
        assert_eq!(json["title"], "Bad Request");
        assert_eq!(json["code"], "invalid_delay_override");
        assert_eq!(json["field"], "x-delay-multiplier");
    }
}
