use sqlx::{postgres::PgPoolOptions, Executor, PgPool};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::schema::create_tables_ddl;
use crate::config::DatabaseConfig;
use crate::registry::EntityRegistry;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Connection pool setup and schema management
pub struct DatabaseManager;

impl DatabaseManager {
    /// Open a pool configured from `config`; every connection gets the
    /// configured `statement_timeout`
    pub async fn connect(config: &DatabaseConfig) -> Result<PgPool, DatabaseError> {
        let connection_string = config.url.as_deref().ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        let url = url::Url::parse(connection_string).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let statement_timeout = format!("SET statement_timeout = {}", config.statement_timeout_ms);
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .after_connect(move |conn, _meta| {
                let statement_timeout = statement_timeout.clone();
                Box::pin(async move {
                    conn.execute(statement_timeout.as_str()).await?;
                    Ok(())
                })
            })
            .connect(url.as_str())
            .await?;

        info!("Created database pool for: {}", url.path().trim_start_matches('/'));
        Ok(pool)
    }

    /// Create every registered entity's table if missing
    pub async fn migrate(pool: &PgPool, registry: &EntityRegistry) -> Result<(), DatabaseError> {
        for ddl in create_tables_ddl(registry) {
            pool.execute(ddl.as_str()).await?;
        }
        info!("Migrated tables: {}", registry.names().join(", "));
        Ok(())
    }
}
