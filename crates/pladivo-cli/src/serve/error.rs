//! Response envelope and error mapping for the HTTP API.
//!
//! Every response body has the shape `{success, data?, message?}`.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use pladivo_core::DomainError;
use pladivo_core::auth::guard::GuardError;

// ---------------------------------------------------------------------------
// Success envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

pub type ApiResult<T> = Result<ApiResponse<T>, AppError>;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Không có quyền truy cập")
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<()> {
            success: false,
            data: None,
            message: Some(self.message),
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        let status = match &err {
            DomainError::Validation(_) | DomainError::InvalidState(_) => StatusCode::BAD_REQUEST,
            DomainError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DomainError::NotFound(_) => StatusCode::NOT_FOUND,
            DomainError::Conflict(_) => StatusCode::CONFLICT,
            DomainError::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "request failed");
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Lỗi hệ thống, vui lòng thử lại sau",
                );
            }
        };
        Self::new(status, err.to_string())
    }
}

impl From<GuardError> for AppError {
    fn from(err: GuardError) -> Self {
        match err {
            GuardError::Forbidden { actual } => {
                tracing::warn!(role = %actual, "caller lacks the required role");
                Self::new(
                    StatusCode::FORBIDDEN,
                    "Tài khoản không có quyền thực hiện thao tác này",
                )
            }
            other => {
                tracing::warn!(error = %other, "rejected credentials");
                Self::unauthorized()
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(error = %rejection.body_text(), "malformed request body");
        Self::bad_request(format!("Dữ liệu không hợp lệ: {}", rejection.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1_048_576)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn domain_errors_map_to_status_codes() {
        let cases = [
            (DomainError::validation("x"), StatusCode::BAD_REQUEST),
            (DomainError::invalid_state("x"), StatusCode::BAD_REQUEST),
            (DomainError::Unauthorized("x".into()), StatusCode::UNAUTHORIZED),
            (DomainError::not_found("x"), StatusCode::NOT_FOUND),
            (DomainError::conflict("x"), StatusCode::CONFLICT),
            (
                DomainError::Internal(anyhow::anyhow!("db down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status(), status);
        }
    }

    #[tokio::test]
    async fn internal_errors_are_not_echoed() {
        let resp = AppError::from(DomainError::Internal(anyhow::anyhow!("password=hunter2")))
            .into_response();
        let json = body(resp).await;
        assert_eq!(json["success"], false);
        assert!(!json["message"].as_str().unwrap().contains("hunter2"));
        assert!(json.get("data").is_none());
    }

    #[tokio::test]
    async fn success_envelope_shape() {
        let json = body(ApiResponse::ok(serde_json::json!({"id": 1})).into_response()).await;
        assert_eq!(json, serde_json::json!({"success": true, "data": {"id": 1}}));
    }

    #[test]
    fn guard_errors() {
        assert_eq!(AppError::from(GuardError::Missing).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AppError::from(GuardError::Forbidden {
                actual: pladivo_core::auth::Role::Staff
            })
            .status(),
            StatusCode::FORBIDDEN
        );
    }
}
