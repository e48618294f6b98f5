use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::filter::{Filter, FilterError};
use crate::types::Record;

/// Failures raised by a storage backend, before classification
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error ({}): {message}", code.as_deref().unwrap_or("no code"))]
    Database {
        /// PostgreSQL SQLSTATE
        code: Option<String>,
        message: String,
        constraint: Option<String>,
    },

    #[error("timed out acquiring a database connection")]
    PoolTimedOut,

    #[error("database pool is closed")]
    PoolClosed,

    #[error("database connection failed: {0}")]
    Connection(String),

    #[error("failed to decode row: {0}")]
    Decode(String),

    #[error("{table} {id} was modified concurrently")]
    WriteConflict { table: String, id: Uuid },

    #[error(transparent)]
    Query(#[from] FilterError),

    #[error("{0}")]
    Other(String),
}

impl StorageError {
    pub fn unique_violation(table: &str, column: &str) -> Self {
        let constraint = format!("{}_{}_key", table, column);
        StorageError::Database {
            code: Some("23505".to_string()),
            message: format!("duplicate key value violates unique constraint \"{}\"", constraint),
            constraint: Some(constraint),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => StorageError::Database {
                code: db.code().map(|c| c.into_owned()),
                message: db.message().to_string(),
                constraint: db.constraint().map(str::to_string),
            },
            sqlx::Error::PoolTimedOut => StorageError::PoolTimedOut,
            sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => StorageError::PoolClosed,
            sqlx::Error::Io(e) => StorageError::Connection(e.to_string()),
            sqlx::Error::Tls(e) => StorageError::Connection(e.to_string()),
            sqlx::Error::Configuration(e) => StorageError::Connection(e.to_string()),
            sqlx::Error::Protocol(msg) => StorageError::Connection(msg),
            e @ (sqlx::Error::ColumnDecode { .. }
            | sqlx::Error::Decode(_)
            | sqlx::Error::ColumnNotFound(_)
            | sqlx::Error::ColumnIndexOutOfBounds { .. }
            | sqlx::Error::TypeNotFound { .. }) => StorageError::Decode(e.to_string()),
            other => StorageError::Other(other.to_string()),
        }
    }
}

/// One guarded row update: applied only while `updatedAt` still equals
/// `expected_updated_at`
#[derive(Debug, Clone)]
pub struct RowUpdate {
    pub id: Uuid,
    pub expected_updated_at: Value,
    pub changes: Record,
}

/// Storage backend. Knows tables and rows, nothing about identities or
/// policies; the gateway is its only caller.
#[async_trait]
pub trait Store: Send + Sync {
    /// Rows matching the filter, in filter order
    async fn select(&self, filter: &Filter) -> Result<Vec<Record>, StorageError>;

    /// Insert complete rows atomically, returning them as stored
    async fn insert(&self, table: &str, records: Vec<Record>) -> Result<Vec<Record>, StorageError>;

    /// Apply guarded updates atomically. A guard miss fails the whole batch
    /// with `WriteConflict`.
    async fn update(&self, table: &str, updates: Vec<RowUpdate>) -> Result<Vec<Record>, StorageError>;

    /// Delete by id, returning the rows that existed
    async fn delete(&self, table: &str, ids: &[Uuid]) -> Result<Vec<Record>, StorageError>;

    async fn ping(&self) -> Result<(), StorageError>;
}
