use thiserror::Error;

use crate::database::StorageError;
use crate::filter::FilterError;
use crate::registry::ValidationError;
use crate::types::OperationKind;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("{operation} on {entity} denied: {reason}")]
    AccessDenied {
        entity: String,
        operation: OperationKind,
        reason: String,
    },

    #[error("no {entity} record matched the selector")]
    NotFound { entity: String },

    #[error("unknown entity type '{0}'")]
    UnknownEntity(String),

    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid selector: {0}")]
    InvalidSelector(#[from] FilterError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("password hashing failed: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
}

impl GatewayError {
    pub fn access_denied(entity: &str, operation: OperationKind, reason: impl Into<String>) -> Self {
        GatewayError::AccessDenied {
            entity: entity.to_string(),
            operation,
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: &str) -> Self {
        GatewayError::NotFound { entity: entity.to_string() }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        GatewayError::Validation(ValidationError::new(field, message))
    }
}
