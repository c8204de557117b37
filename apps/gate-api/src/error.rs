use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use utoipa::ToSchema;

/// Errors produced by the store, the registry and the lifecycle controller.
///
/// Losing a race on a transition is not an error: `approve`/`reject` report
/// it as `Ok(false)`.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Malformed or missing input to a setter. The message is shown verbatim.
    #[error("{0}")]
    Validation(String),

    /// Unknown channel or request.
    #[error("{0}")]
    NotFound(String),

    /// The backing store failed. Details are logged, never shown.
    #[error("storage error: {0}")]
    Storage(String),
}

impl GateError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn channel_not_set_up(channel_id: &str) -> Self {
        Self::NotFound(format!("Channel {channel_id} is not set up"))
    }
}

impl From<diesel::result::Error> for GateError {
    fn from(err: diesel::result::Error) -> Self {
        tracing::error!(?err, "database error");
        Self::Storage(err.to_string())
    }
}

impl From<diesel_async::pooled_connection::deadpool::PoolError> for GateError {
    fn from(err: diesel_async::pooled_connection::deadpool::PoolError) -> Self {
        tracing::error!(?err, "pool error");
        Self::Storage(err.to_string())
    }
}

/// Structured API error returned to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

/// HTTP-facing error type that converts into a response.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: ApiErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<GateError> for ApiError {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Validation(message) => Self::validation(message),
            GateError::NotFound(message) => Self::not_found(message),
            GateError::Storage(_) => Self::internal("An internal error occurred"),
        }
    }
}
