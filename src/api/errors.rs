use crate::error::AppError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

impl AppError {
    /// The HTTP status this error is surfaced with.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::BadRequest(_) | AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::IncorrectCode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::TooManyAttempts(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Database(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API-specific error wrapper that converts AppError into HTTP responses.
///
/// The body mirrors the unlock result shape so asynchronous callers can
/// branch on `success` for every endpoint.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::NotFound(msg)
            | AppError::Forbidden(msg)
            | AppError::BadRequest(msg)
            | AppError::Validation(msg)
            | AppError::Auth(msg)
            | AppError::Conflict(msg)
            | AppError::TooManyAttempts(msg)
            | AppError::Internal(msg) => msg.clone(),
            AppError::IncorrectCode(_) => "Incorrect code".to_string(),
            AppError::Database(msg) => format!("Database error: {}", msg),
            AppError::Storage(msg) => format!("Storage error: {}", msg),
            AppError::Config(msg) => format!("Configuration error: {}", msg),
        };

        let mut body = serde_json::json!({
            "success": false,
            "error": message
        });
        if let AppError::IncorrectCode(index) = self {
            body["index"] = serde_json::json!(index);
        }

        (status, axum::Json(body)).into_response()
    }
}
