//! Maps every failure to one of seven categories with a stable code,
//! a client-safe message and a retryability flag.

pub mod codes;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::database::StorageError;
use crate::gateway::GatewayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    AccessDenied,
    NotFound,
    ValidationFailed,
    Conflict,
    Timeout,
    Unavailable,
    Unknown,
}

impl ErrorCategory {
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorCategory::Conflict | ErrorCategory::Timeout | ErrorCategory::Unavailable)
    }

    pub fn status_code(&self) -> u16 {
        match self {
            ErrorCategory::AccessDenied => 403,
            ErrorCategory::NotFound => 404,
            ErrorCategory::ValidationFailed => 422,
            ErrorCategory::Conflict => 409,
            ErrorCategory::Timeout => 504,
            ErrorCategory::Unavailable => 503,
            ErrorCategory::Unknown => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::AccessDenied => "AccessDenied",
            ErrorCategory::NotFound => "NotFound",
            ErrorCategory::ValidationFailed => "ValidationFailed",
            ErrorCategory::Conflict => "Conflict",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::Unavailable => "Unavailable",
            ErrorCategory::Unknown => "Unknown",
        }
    }

    /// Category implied by an HTTP status, for error bodies that cannot be decoded
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ErrorCategory::AccessDenied,
            404 => ErrorCategory::NotFound,
            400 | 413 | 415 | 422 => ErrorCategory::ValidationFailed,
            409 => ErrorCategory::Conflict,
            408 | 504 => ErrorCategory::Timeout,
            502 | 503 => ErrorCategory::Unavailable,
            _ => ErrorCategory::Unknown,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error shape every client sees
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{category} ({code}): {message}")]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.into(),
            message: message.into(),
            retryable: category.retryable(),
        }
    }

    pub fn from_status(status: StatusCode) -> Self {
        let category = ErrorCategory::from_status(status.as_u16());
        Self::new(category, format!("HTTP_{}", status.as_u16()), format!("Request failed with status {}", status))
    }
}

/// Classify a gateway failure. Total: anything unrecognised is `Unknown`.
pub fn classify(err: &GatewayError) -> ClassifiedError {
    match err {
        GatewayError::AccessDenied { entity, operation, .. } => ClassifiedError::new(
            ErrorCategory::AccessDenied,
            "ACCESS_DENIED",
            format!("You are not allowed to {} this {}.", operation, entity),
        ),
        GatewayError::NotFound { entity } => {
            ClassifiedError::new(ErrorCategory::NotFound, "NOT_FOUND", format!("No {} record matched the request.", entity))
        }
        GatewayError::UnknownEntity(entity) => {
            ClassifiedError::new(ErrorCategory::NotFound, "UNKNOWN_ENTITY", format!("Unknown entity type '{}'.", entity))
        }
        GatewayError::Validation(v) => ClassifiedError::new(ErrorCategory::ValidationFailed, "INVALID_FIELD", v.to_string()),
        GatewayError::InvalidSelector(e) => ClassifiedError::new(ErrorCategory::ValidationFailed, "INVALID_SELECTOR", e.to_string()),
        GatewayError::Storage(e) => classify_storage(e),
        GatewayError::PasswordHash(_) => {
            ClassifiedError::new(ErrorCategory::Unknown, "PASSWORD_HASH_FAILED", "An unknown error occurred.")
        }
    }
}

pub fn classify_storage(err: &StorageError) -> ClassifiedError {
    match err {
        StorageError::Database { code: Some(sqlstate), .. } => match codes::lookup(sqlstate) {
            Some(known) => ClassifiedError::new(known.category, known.code, known.message),
            None => {
                let category = codes::class_category(sqlstate);
                ClassifiedError::new(category, format!("DB_{}", sqlstate), generic_message(category))
            }
        },
        StorageError::Database { code: None, .. } => unknown(),
        StorageError::PoolTimedOut => {
            ClassifiedError::new(ErrorCategory::Timeout, "POOL_TIMEOUT", "The database did not respond in time. Please try again later.")
        }
        StorageError::PoolClosed | StorageError::Connection(_) => ClassifiedError::new(
            ErrorCategory::Unavailable,
            "DATABASE_UNREACHABLE",
            "Database server was unable to be reached. Please try again later.",
        ),
        StorageError::WriteConflict { .. } => ClassifiedError::new(
            ErrorCategory::Conflict,
            "CONCURRENT_MODIFICATION",
            "The record was modified by another request. Please retry the operation.",
        ),
        StorageError::Query(e) => ClassifiedError::new(ErrorCategory::ValidationFailed, "INVALID_SELECTOR", e.to_string()),
        StorageError::Decode(_) | StorageError::Other(_) => unknown(),
    }
}

/// Classify a client transport failure
pub fn classify_transport(err: &reqwest::Error) -> ClassifiedError {
    if err.is_timeout() {
        ClassifiedError::new(ErrorCategory::Timeout, "REQUEST_TIMEOUT", "The server did not respond in time.")
    } else if err.is_connect() {
        ClassifiedError::new(ErrorCategory::Unavailable, "SERVER_UNREACHABLE", "The server could not be reached.")
    } else if let Some(status) = err.status() {
        ClassifiedError::from_status(status)
    } else if err.is_decode() {
        ClassifiedError::new(ErrorCategory::Unknown, "INVALID_RESPONSE", "The server returned an unreadable response.")
    } else {
        unknown()
    }
}

fn unknown() -> ClassifiedError {
    ClassifiedError::new(ErrorCategory::Unknown, "UNKNOWN", "An unknown error occurred.")
}

fn generic_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::Unavailable => "The database is unavailable. Please try again later.",
        ErrorCategory::ValidationFailed => "The provided data is invalid.",
        ErrorCategory::Conflict => "The operation conflicted with existing data. Please retry the operation.",
        _ => "An unknown error occurred.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ValidationError;
    use crate::types::OperationKind;
    use uuid::Uuid;

    fn db(code: &str) -> GatewayError {
        GatewayError::Storage(StorageError::Database {
            code: Some(code.to_string()),
            message: "raw detail".to_string(),
            constraint: None,
        })
    }

    #[test]
    fn unique_violation_is_retryable_conflict() {
        let c = classify(&db("23505"));
        assert_eq!(c.category, ErrorCategory::Conflict);
        assert_eq!(c.code, "UNIQUE_VIOLATION");
        assert!(c.retryable);
        assert!(!c.message.contains("raw detail"));
    }

    #[test]
    fn exact_codes_win_over_class_fallback() {
        assert_eq!(classify(&db("23502")).category, ErrorCategory::ValidationFailed);
        assert_eq!(classify(&db("23999")).category, ErrorCategory::Conflict);
        assert_eq!(classify(&db("57014")).category, ErrorCategory::Timeout);
        assert_eq!(classify(&db("57000")).category, ErrorCategory::Unavailable);
        assert_eq!(classify(&db("08006")).category, ErrorCategory::Unavailable);
        assert_eq!(classify(&db("22012")).category, ErrorCategory::ValidationFailed);
        assert_eq!(classify(&db("XX000")).category, ErrorCategory::Unknown);
        assert_eq!(classify(&db("")).category, ErrorCategory::Unknown);
    }

    #[test]
    fn gateway_failures_map_to_categories() {
        let denied = GatewayError::access_denied("post", OperationKind::Update, "no");
        assert_eq!(classify(&denied).category, ErrorCategory::AccessDenied);
        assert!(!classify(&denied).retryable);
        assert_eq!(classify(&GatewayError::not_found("post")).category.status_code(), 404);
        assert_eq!(classify(&GatewayError::UnknownEntity("x".into())).category, ErrorCategory::NotFound);
        let invalid = GatewayError::Validation(ValidationError::new("title", "is required"));
        assert_eq!(classify(&invalid).category.status_code(), 422);
    }

    #[test]
    fn infrastructure_failures() {
        let timeout = classify(&GatewayError::Storage(StorageError::PoolTimedOut));
        assert_eq!((timeout.category, timeout.retryable), (ErrorCategory::Timeout, true));
        let down = classify(&GatewayError::Storage(StorageError::Connection("refused".into())));
        assert_eq!(down.category, ErrorCategory::Unavailable);
        let conflict = classify(&GatewayError::Storage(StorageError::WriteConflict { table: "post".into(), id: Uuid::nil() }));
        assert_eq!(conflict.category, ErrorCategory::Conflict);
        let decode = classify(&GatewayError::Storage(StorageError::Decode("bad".into())));
        assert_eq!((decode.category, decode.retryable), (ErrorCategory::Unknown, false));
    }

    #[test]
    fn status_fallback_for_undecodable_bodies() {
        let c = ClassifiedError::from_status(StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(c.category, ErrorCategory::Unavailable);
        assert!(c.retryable);
        assert_eq!(ErrorCategory::from_status(418), ErrorCategory::Unknown);
    }

    #[test]
    fn serializes_wire_shape() {
        let c = ClassifiedError::new(ErrorCategory::NotFound, "NOT_FOUND", "gone");
        let v = serde_json::to_value(&c).unwrap();
        assert_eq!(v, serde_json::json!({ "category": "NotFound", "code": "NOT_FOUND", "message": "gone", "retryable": false }));
    }
}
