use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgArguments, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::store::{RowUpdate, StorageError, Store};
use crate::filter::filter::is_valid_identifier;
use crate::filter::{Filter, FilterError};
use crate::registry::UPDATED_AT;
use crate::types::Record;

/// PostgreSQL store. Rows travel as JSON both ways: reads through
/// `row_to_json`, writes through `jsonb_populate_record`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    log_queries: bool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool, log_queries: false }
    }

    pub fn with_query_logging(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    fn log(&self, sql: &str) {
        if self.log_queries {
            debug!("SQL: {}", sql);
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn select(&self, filter: &Filter) -> Result<Vec<Record>, StorageError> {
        let sql_result = filter.to_sql()?;
        self.log(&sql_result.query);

        let mut q = sqlx::query(&sql_result.query);
        for p in sql_result.params.iter() {
            q = bind_param_query(q, p);
        }
        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_record(row)).collect()
    }

    async fn insert(&self, table: &str, records: Vec<Record>) -> Result<Vec<Record>, StorageError> {
        let table = quoted_table(table)?;
        let sql = format!(
            "INSERT INTO {table} AS t SELECT * FROM jsonb_populate_record(NULL::{table}, $1) RETURNING row_to_json(t) AS row"
        );
        self.log(&sql);

        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(records.len());
        for record in records {
            let row = sqlx::query(&sql).bind(Value::Object(record)).fetch_one(&mut *tx).await?;
            out.push(row_record(&row)?);
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn update(&self, table_name: &str, updates: Vec<RowUpdate>) -> Result<Vec<Record>, StorageError> {
        let table = quoted_table(table_name)?;

        let mut tx = self.pool.begin().await?;
        let mut out = Vec::with_capacity(updates.len());
        for update in updates {
            let mut assignments = Vec::with_capacity(update.changes.len());
            for column in update.changes.keys() {
                if !is_valid_identifier(column) {
                    return Err(FilterError::InvalidColumn(column.clone()).into());
                }
                assignments.push(format!("\"{0}\" = r.\"{0}\"", column));
            }
            let sql = format!(
                "UPDATE {table} AS t SET {} FROM jsonb_populate_record(NULL::{table}, $1) AS r \
                 WHERE t.\"id\" = $2 AND t.\"{UPDATED_AT}\" = $3::timestamptz RETURNING row_to_json(t) AS row",
                assignments.join(", ")
            );
            self.log(&sql);

            let expected = update.expected_updated_at.as_str().unwrap_or_default().to_string();
            let row = sqlx::query(&sql)
                .bind(Value::Object(update.changes))
                .bind(update.id)
                .bind(expected)
                .fetch_optional(&mut *tx)
                .await?;
            match row {
                Some(row) => out.push(row_record(&row)?),
                // rolled back when `tx` drops
                None => return Err(StorageError::WriteConflict { table: table_name.to_string(), id: update.id }),
            }
        }
        tx.commit().await?;
        Ok(out)
    }

    async fn delete(&self, table: &str, ids: &[Uuid]) -> Result<Vec<Record>, StorageError> {
        let table = quoted_table(table)?;
        let sql = format!("DELETE FROM {table} AS t WHERE t.\"id\" = ANY($1) RETURNING row_to_json(t) AS row");
        self.log(&sql);

        let rows = sqlx::query(&sql).bind(ids.to_vec()).fetch_all(&self.pool).await?;
        rows.iter().map(|row| row_record(row)).collect()
    }

    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn quoted_table(table: &str) -> Result<String, StorageError> {
    if !is_valid_identifier(table) {
        return Err(FilterError::InvalidTableName(table.to_string()).into());
    }
    Ok(format!("\"{}\"", table))
}

fn row_record(row: &sqlx::postgres::PgRow) -> Result<Record, StorageError> {
    match row.try_get::<Value, _>("row")? {
        Value::Object(map) => Ok(map),
        other => Err(StorageError::Decode(format!("expected JSON object row, got {}", other))),
    }
}

fn bind_param_query<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    v: &'q Value,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match v {
        Value::Null => {
            let none: Option<String> = None;
            q.bind(none)
        }
        Value::Bool(b) => q.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                q.bind(i)
            } else if let Some(f) = n.as_f64() {
                q.bind(f)
            } else {
                q.bind(n.to_string())
            }
        }
        Value::String(s) => q.bind(s.as_str()),
        // FilterWhere expands arrays and rejects objects before binding
        Value::Array(_) | Value::Object(_) => q.bind(v.clone()),
    }
}
