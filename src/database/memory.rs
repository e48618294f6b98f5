use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{RowUpdate, StorageError, Store};
use crate::filter::filter_order::compare_values;
use crate::filter::Filter;
use crate::registry::{EntityRegistry, ID, UPDATED_AT};
use crate::types::Record;

/// In-process store for tests and `serve --memory`.
///
/// Mirrors the constraints the generated DDL declares that the gateway
/// cannot check itself: unique columns and the `updatedAt` write guard.
/// Foreign keys are not enforced.
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Vec<Record>>>,
    unique: HashMap<String, Vec<String>>,
}

impl MemoryStore {
    pub fn new(registry: &EntityRegistry) -> Self {
        let mut tables = HashMap::new();
        let mut unique = HashMap::new();
        for schema in registry.entities() {
            tables.insert(schema.table.clone(), Vec::new());
            unique.insert(
                schema.table.clone(),
                schema.unique_fields().map(|f| f.name.clone()).collect(),
            );
        }
        Self { tables: RwLock::new(tables), unique }
    }

    /// Row count per table, for assertions
    pub async fn count(&self, table: &str) -> usize {
        self.tables.read().await.get(table).map(Vec::len).unwrap_or(0)
    }

    fn check_unique(&self, table: &str, rows: &[Record]) -> Result<(), StorageError> {
        let Some(columns) = self.unique.get(table) else { return Ok(()) };
        for column in columns {
            for (i, row) in rows.iter().enumerate() {
                let Some(value) = row.get(column).filter(|v| !v.is_null()) else { continue };
                let duplicate = rows[..i]
                    .iter()
                    .filter_map(|other| other.get(column))
                    .any(|other| other == value);
                if duplicate {
                    return Err(StorageError::unique_violation(table, column));
                }
            }
        }
        Ok(())
    }
}

fn missing_table(table: &str) -> StorageError {
    StorageError::Database {
        code: Some("42P01".to_string()),
        message: format!("relation \"{}\" does not exist", table),
        constraint: None,
    }
}

fn row_id(row: &Record) -> Option<Uuid> {
    row.get(ID).and_then(Value::as_str).and_then(|s| Uuid::parse_str(s).ok())
}

#[async_trait]
impl Store for MemoryStore {
    async fn select(&self, filter: &Filter) -> Result<Vec<Record>, StorageError> {
        let tables = self.tables.read().await;
        let rows = tables.get(filter.table_name()).ok_or_else(|| missing_table(filter.table_name()))?;

        let mut out = Vec::new();
        for row in rows {
            if filter.matches(row)? {
                out.push(row.clone());
            }
        }
        filter.sort(&mut out);
        Ok(out)
    }

    async fn insert(&self, table: &str, records: Vec<Record>) -> Result<Vec<Record>, StorageError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing_table(table))?;

        let mut staged = rows.clone();
        staged.extend(records.iter().cloned());
        self.check_unique(table, &staged)?;

        *rows = staged;
        Ok(records)
    }

    async fn update(&self, table: &str, updates: Vec<RowUpdate>) -> Result<Vec<Record>, StorageError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing_table(table))?;

        let mut staged = rows.clone();
        let mut out = Vec::with_capacity(updates.len());
        for update in updates {
            let conflict = || StorageError::WriteConflict { table: table.to_string(), id: update.id };
            let row = staged
                .iter_mut()
                .find(|row| row_id(row) == Some(update.id))
                .ok_or_else(conflict)?;
            let current = row.get(UPDATED_AT).unwrap_or(&Value::Null);
            if compare_values(current, &update.expected_updated_at) != Some(Ordering::Equal) {
                return Err(conflict());
            }
            for (key, value) in update.changes {
                row.insert(key, value);
            }
            out.push(row.clone());
        }
        self.check_unique(table, &staged)?;

        *rows = staged;
        Ok(out)
    }

    async fn delete(&self, table: &str, ids: &[Uuid]) -> Result<Vec<Record>, StorageError> {
        let mut tables = self.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| missing_table(table))?;

        let (removed, kept): (Vec<Record>, Vec<Record>) = rows
            .drain(..)
            .partition(|row| row_id(row).map(|id| ids.contains(&id)).unwrap_or(false));
        *rows = kept;
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
