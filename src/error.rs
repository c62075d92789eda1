use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Error taxonomy shared by every handler. Each variant carries the
/// client-facing message; server-side variants keep the underlying
/// diagnostic as a separate detail string.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{message}")]
    Upstream { message: String, details: String },
    #[error("{message}")]
    Internal { message: String, details: String },
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn upstream(msg: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            message: msg.into(),
            details: err.to_string(),
        }
    }

    pub fn internal(msg: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Internal {
            message: msg.into(),
            details: err.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn details(&self) -> Option<String> {
        match self {
            Self::Upstream { details, .. } | Self::Internal { details, .. } => {
                Some(details.clone())
            }
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(%status, error = %self, details = ?self.details(), "request failed");
        }
        let body = ErrorBody {
            error: self.to_string(),
            details: self.details(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            // 23505 = unique_violation
            if db.code().as_deref() == Some("23505") {
                return Self::Conflict("Username or email already in use".into());
            }
        }
        Self::internal("Database error", err)
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("Internal server error", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(
            ApiError::bad_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::unauthorized("x").status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::upstream("x", "boom").status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            ApiError::internal("x", "boom").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn client_errors_hide_details() {
        assert_eq!(ApiError::unauthorized("no token").details(), None);
        assert_eq!(
            ApiError::upstream("inference failed", "connection refused").details(),
            Some("connection refused".to_string())
        );
    }

    #[test]
    fn error_body_omits_empty_details() {
        let body = ErrorBody {
            error: "Token not found".into(),
            details: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert_eq!(json, r#"{"error":"Token not found"}"#);
    }
}
