// HTTP API Error Types
use axum::{extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::classify::{classify, ClassifiedError, ErrorCategory};
use crate::gateway::GatewayError;

/// HTTP API error. Everything except a wrong method is a classified error.
#[derive(Debug)]
pub enum ApiError {
    Classified(ClassifiedError),

    // 405 Method Not Allowed
    MethodNotAllowed(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::Classified(c) => c.category.status_code(),
            ApiError::MethodNotAllowed(_) => 405,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Classified(c) => &c.message,
            ApiError::MethodNotAllowed(msg) => msg,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &str {
        match self {
            ApiError::Classified(c) => &c.code,
            ApiError::MethodNotAllowed(_) => "METHOD_NOT_ALLOWED",
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::Classified(c) => json!({ "error": c }),
            ApiError::MethodNotAllowed(msg) => json!({
                "error": {
                    "category": "MethodNotAllowed",
                    "code": self.error_code(),
                    "message": msg,
                    "retryable": false
                }
            }),
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn validation(code: &str, message: impl Into<String>) -> Self {
        ApiError::Classified(ClassifiedError::new(ErrorCategory::ValidationFailed, code, message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::Classified(ClassifiedError::new(ErrorCategory::NotFound, "NOT_FOUND", message))
    }

    pub fn access_denied(message: impl Into<String>) -> Self {
        ApiError::Classified(ClassifiedError::new(ErrorCategory::AccessDenied, "ACCESS_DENIED", message))
    }

    pub fn method_not_allowed(method: &str, path: &str) -> Self {
        ApiError::MethodNotAllowed(format!("Method {} is not supported on {}", method, path))
    }
}

// Convert other error types to ApiError; raw details are logged, never returned
impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        let classified = classify(&err);
        match classified.category {
            ErrorCategory::Unknown | ErrorCategory::Unavailable | ErrorCategory::Timeout => {
                tracing::error!("Gateway error ({}): {}", classified.code, err);
            }
            _ => tracing::warn!("Gateway error ({}): {}", classified.code, err),
        }
        ApiError::Classified(classified)
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidCredentials => ApiError::access_denied("Invalid email or password"),
            AuthError::Storage(e) => GatewayError::Storage(e).into(),
            other => {
                tracing::error!("Auth error: {}", other);
                ApiError::Classified(ClassifiedError::new(ErrorCategory::Unknown, "AUTH_UNAVAILABLE", "Authentication is not available."))
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::warn!("Rejected request body: {}", rejection.body_text());
        ApiError::validation("INVALID_JSON", "Request body must be valid JSON")
    }
}

impl From<ClassifiedError> for ApiError {
    fn from(err: ClassifiedError) -> Self {
        ApiError::Classified(err)
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_allowed_body() {
        let err = ApiError::method_not_allowed("TRACE", "/api/model/post");
        assert_eq!(err.status_code(), 405);
        assert_eq!(err.to_json()["error"]["category"], "MethodNotAllowed");
        assert_eq!(err.to_json()["error"]["retryable"], false);
    }

    #[test]
    fn gateway_errors_render_classified() {
        let err: ApiError = GatewayError::not_found("post").into();
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_json()["error"]["category"], "NotFound");
        assert_eq!(err.error_code(), "NOT_FOUND");
    }
}
