use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::envelope::{Envelope, Payload};
use super::error::GatewayError;
use super::selector::Selector;
use crate::auth::password::{hash_password, is_hashed, DEFAULT_COST};
use crate::auth::Identity;
use crate::database::{RowUpdate, StorageError, Store};
use crate::filter::filter_order::compare_values;
use crate::filter::filter_where::FilterWhere;
use crate::filter::{Filter, FilterError};
use crate::policy::{evaluate, evaluate_change};
use crate::registry::{validate_create, validate_update, EntityRegistry, EntitySchema, FieldType, Relation, CREATED_AT, ID, UPDATED_AT};
use crate::types::{OperationKind, Record};

pub const DEFAULT_MAX_TAKE: usize = 1000;

/// Per-request data gateway. Closes over the caller's identity; every
/// operation is checked against the entity's policy before it reaches
/// storage and again before results leave.
pub struct Gateway {
    store: Arc<dyn Store>,
    registry: Arc<EntityRegistry>,
    identity: Identity,
    max_take: usize,
    password_cost: u32,
}

impl Gateway {
    pub fn new(store: Arc<dyn Store>, registry: Arc<EntityRegistry>, identity: Identity) -> Self {
        Self { store, registry, identity, max_take: DEFAULT_MAX_TAKE, password_cost: DEFAULT_COST }
    }

    pub fn with_max_take(mut self, max_take: usize) -> Self {
        self.max_take = max_take;
        self
    }

    /// bcrypt work factor for password fields
    pub fn with_password_cost(mut self, cost: u32) -> Self {
        self.password_cost = cost;
        self
    }

    pub async fn execute(&self, envelope: Envelope) -> Result<Vec<Record>, GatewayError> {
        let Envelope { entity, operation, selector, payload } = envelope;
        match (operation, payload) {
            (OperationKind::Create, Payload::One(record)) => Ok(vec![self.create(&entity, record).await?]),
            (OperationKind::Create, Payload::Many(records)) => self.create_many(&entity, records).await,
            (OperationKind::Read, _) => self.read(&entity, &selector).await,
            (OperationKind::Update, Payload::One(changes)) => self.update(&entity, &selector, changes).await,
            (OperationKind::Delete, _) => self.delete(&entity, &selector).await,
            (OperationKind::Create | OperationKind::Update, _) => {
                // unknown entity reports before a missing body
                self.schema(&entity)?;
                Err(GatewayError::validation("data", "expected a record object"))
            }
        }
    }

    pub async fn create(&self, entity: &str, payload: Record) -> Result<Record, GatewayError> {
        let mut created = self.create_many(entity, vec![payload]).await?;
        created.pop().ok_or_else(|| GatewayError::not_found(entity))
    }

    /// Create every payload or none. Policies for all payloads are checked
    /// before storage is touched.
    pub async fn create_many(&self, entity: &str, payloads: Vec<Record>) -> Result<Vec<Record>, GatewayError> {
        let schema = self.schema(entity)?;
        let op = OperationKind::Create;

        if schema.creator_field.is_some() && !self.identity.is_authenticated() {
            return Err(GatewayError::access_denied(entity, op, "anonymous callers cannot create records with an owner"));
        }

        let now = timestamp();
        let mut prepared = Vec::with_capacity(payloads.len());
        for mut record in payloads {
            record.retain(|key, _| schema.get_relation(key).is_none() && !schema.is_managed(key));
            validate_create(schema, &record)?;

            for field in schema.fields.iter().filter(|f| f.default.is_some()) {
                if record.get(&field.name).map_or(true, Value::is_null) {
                    record.insert(field.name.clone(), field.default.clone().unwrap_or(Value::Null));
                }
            }
            record.insert(ID.to_string(), json!(Uuid::new_v4().to_string()));
            record.insert(CREATED_AT.to_string(), json!(now));
            record.insert(UPDATED_AT.to_string(), json!(now));
            if let (Some(creator), Some(id)) = (&schema.creator_field, self.identity.id()) {
                record.insert(creator.clone(), json!(id.to_string()));
            }

            let decision = evaluate(&schema.policy, &self.identity, op, &record);
            if !decision.allowed {
                return Err(GatewayError::access_denied(entity, op, decision.reason.unwrap_or_default()));
            }
            for field in &decision.redacted {
                record.remove(field);
            }
            self.hash_passwords(schema, &mut record)?;
            prepared.push(record);
        }

        debug!("Creating {} {} record(s)", prepared.len(), entity);
        let created = self.store.insert(&schema.table, prepared).await?;
        Ok(created.into_iter().map(|r| self.redact(schema, r)).collect())
    }

    /// Records the caller may see, in selector order. Records the read
    /// policy denies are dropped before `skip`/`take` apply.
    pub async fn read(&self, entity: &str, selector: &Selector) -> Result<Vec<Record>, GatewayError> {
        let schema = self.schema(entity)?;

        let mut relations = Vec::new();
        for name in selector.include_names()? {
            let relation = schema
                .get_relation(&name)
                .ok_or_else(|| GatewayError::validation("include", format!("unknown relation '{}' on {}", name, entity)))?;
            relations.push(relation);
        }

        let filter = self.build_filter(schema, selector)?;
        let rows = self.store.select(&filter).await?;
        let total = rows.len();

        let take = selector.take.unwrap_or(self.max_take).min(self.max_take);
        let mut records: Vec<Record> = self
            .visible(schema, rows)
            .into_iter()
            .skip(selector.skip.unwrap_or(0))
            .take(take)
            .collect();
        debug!("Read {} of {} {} record(s)", records.len(), total, entity);

        for relation in relations {
            self.resolve_include(relation, &mut records).await?;
        }
        Ok(records)
    }

    /// One visible record by id
    pub async fn find_unique(&self, entity: &str, id: Uuid) -> Result<Record, GatewayError> {
        self.read(entity, &Selector::by_id(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::not_found(entity))
    }

    /// Policy runs before validation: a caller without update permission
    /// gets `AccessDenied` whatever the payload holds.
    pub async fn update(&self, entity: &str, selector: &Selector, payload: Record) -> Result<Vec<Record>, GatewayError> {
        let schema = self.schema(entity)?;
        let op = OperationKind::Update;

        let targets = self.targets(schema, selector).await?;

        let mut changes = payload;
        changes.retain(|key, _| schema.get_relation(key).is_none());

        let mut decisions = Vec::with_capacity(targets.len());
        for target in &targets {
            let proposed = post_image(schema, target, &changes);
            let decision = evaluate_change(&schema.policy, &self.identity, op, target, &proposed);
            if !decision.allowed {
                return Err(GatewayError::access_denied(entity, op, decision.reason.unwrap_or_default()));
            }
            decisions.push(decision);
        }

        for (key, value) in &changes {
            if !schema.is_immutable(key) {
                continue;
            }
            for target in &targets {
                if !same_value(target.get(key).unwrap_or(&Value::Null), value) {
                    return Err(GatewayError::validation(key, "is immutable"));
                }
            }
        }
        // unchanged immutables and the server-managed timestamp are dropped
        changes.retain(|key, _| !schema.is_managed(key));
        validate_update(schema, &changes)?;

        let now = timestamp();
        let mut updates = Vec::with_capacity(targets.len());
        for (target, decision) in targets.iter().zip(&decisions) {
            let mut row_changes = changes.clone();
            for field in &decision.redacted {
                row_changes.remove(field);
            }
            self.hash_passwords(schema, &mut row_changes)?;
            row_changes.insert(UPDATED_AT.to_string(), json!(now));

            updates.push(RowUpdate {
                id: record_id(target)?,
                expected_updated_at: target.get(UPDATED_AT).cloned().unwrap_or(Value::Null),
                changes: row_changes,
            });
        }

        debug!("Updating {} {} record(s)", updates.len(), entity);
        let updated = self.store.update(&schema.table, updates).await?;
        Ok(updated.into_iter().map(|r| self.redact(schema, r)).collect())
    }

    pub async fn delete(&self, entity: &str, selector: &Selector) -> Result<Vec<Record>, GatewayError> {
        let schema = self.schema(entity)?;
        let op = OperationKind::Delete;

        let targets = self.targets(schema, selector).await?;
        let mut ids = Vec::with_capacity(targets.len());
        for target in &targets {
            let decision = evaluate(&schema.policy, &self.identity, op, target);
            if !decision.allowed {
                return Err(GatewayError::access_denied(entity, op, decision.reason.unwrap_or_default()));
            }
            ids.push(record_id(target)?);
        }

        debug!("Deleting {} {} record(s)", ids.len(), entity);
        let deleted = self.store.delete(&schema.table, &ids).await?;
        if deleted.is_empty() {
            return Err(GatewayError::not_found(entity));
        }
        Ok(deleted.into_iter().map(|r| self.redact(schema, r)).collect())
    }

    fn schema(&self, entity: &str) -> Result<&EntitySchema, GatewayError> {
        self.registry
            .get(entity)
            .ok_or_else(|| GatewayError::UnknownEntity(entity.to_string()))
    }

    /// Raw selector match for writes; `NotFound` when empty
    async fn targets(&self, schema: &EntitySchema, selector: &Selector) -> Result<Vec<Record>, GatewayError> {
        let filter = self.build_filter(schema, selector)?;
        let targets = self.store.select(&filter).await?;
        if targets.is_empty() {
            return Err(GatewayError::not_found(&schema.name));
        }
        Ok(targets)
    }

    fn build_filter(&self, schema: &EntitySchema, selector: &Selector) -> Result<Filter, GatewayError> {
        let mut filter = Filter::new(&schema.table)?;

        if let Some(where_clause) = &selector.where_clause {
            for column in FilterWhere::columns(where_clause)? {
                check_queryable(schema, &column)?;
            }
            filter.where_clause(where_clause.clone())?;
        }
        if let Some(order_by) = &selector.order_by {
            filter.order(order_by.clone())?;
            for info in filter.order_info() {
                check_queryable(schema, &info.column)?;
            }
        }
        filter.with_options(schema.filter_options());
        Ok(filter)
    }

    fn visible(&self, schema: &EntitySchema, rows: Vec<Record>) -> Vec<Record> {
        rows.into_iter()
            .filter_map(|mut row| {
                let decision = evaluate(&schema.policy, &self.identity, OperationKind::Read, &row);
                if !decision.allowed {
                    return None;
                }
                for field in &decision.redacted {
                    row.remove(field);
                }
                Some(row)
            })
            .collect()
    }

    fn hash_passwords(&self, schema: &EntitySchema, record: &mut Record) -> Result<(), GatewayError> {
        for field in schema.password_fields() {
            if let Some(Value::String(plain)) = record.get(&field.name) {
                if !is_hashed(plain) {
                    let hashed = hash_password(plain, self.password_cost)?;
                    record.insert(field.name.clone(), Value::String(hashed));
                }
            }
        }
        Ok(())
    }

    /// Field-level read redaction for records returned by writes
    fn redact(&self, schema: &EntitySchema, mut row: Record) -> Record {
        let decision = evaluate(&schema.policy, &self.identity, OperationKind::Read, &row);
        for field in &decision.redacted {
            row.remove(field);
        }
        row
    }

    /// Attach the related record under `relation.name`, or null when it is
    /// missing or not visible to the caller
    async fn resolve_include(&self, relation: &Relation, records: &mut [Record]) -> Result<(), GatewayError> {
        let target = self.schema(&relation.target)?;

        let mut ids: Vec<Value> = Vec::new();
        for record in records.iter() {
            if let Some(id) = record.get(&relation.local_field).filter(|v| v.is_string()) {
                if !ids.contains(id) {
                    ids.push(id.clone());
                }
            }
        }

        let mut related: HashMap<String, Record> = HashMap::new();
        if !ids.is_empty() {
            let mut filter = Filter::new(&target.table)?;
            filter.where_clause(json!({ ID: { "$in": ids } }))?;
            filter.with_options(target.filter_options());
            for row in self.visible(target, self.store.select(&filter).await?) {
                if let Some(id) = row.get(ID).and_then(Value::as_str) {
                    related.insert(id.to_lowercase(), row.clone());
                }
            }
        }

        for record in records.iter_mut() {
            let value = record
                .get(&relation.local_field)
                .and_then(Value::as_str)
                .and_then(|id| related.get(&id.to_lowercase()))
                .map(|r| Value::Object(r.clone()))
                .unwrap_or(Value::Null);
            record.insert(relation.name.clone(), value);
        }
        Ok(())
    }
}

fn check_queryable(schema: &EntitySchema, column: &str) -> Result<(), GatewayError> {
    match schema.get_field(column) {
        None => Err(FilterError::InvalidColumn(format!("unknown field '{}' on {}", column, schema.name)).into()),
        Some(field) if field.kind == FieldType::Password => {
            Err(FilterError::InvalidColumn(format!("field '{}' cannot be queried", column)).into())
        }
        Some(_) => Ok(()),
    }
}

/// The record as it would read after `changes` apply. Managed fields keep
/// their stored values.
fn post_image(schema: &EntitySchema, target: &Record, changes: &Record) -> Record {
    let mut proposed = target.clone();
    for (key, value) in changes.iter().filter(|(key, _)| !schema.is_managed(key)) {
        proposed.insert(key.clone(), value.clone());
    }
    proposed
}

fn record_id(record: &Record) -> Result<Uuid, GatewayError> {
    record
        .get(ID)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or_else(|| StorageError::Decode("record without a valid id".to_string()).into())
}

/// Equality that treats differently formatted uuids and timestamps alike
fn same_value(current: &Value, proposed: &Value) -> bool {
    if current == proposed {
        return true;
    }
    if let (Some(a), Some(b)) = (current.as_str(), proposed.as_str()) {
        if let (Ok(a), Ok(b)) = (Uuid::parse_str(a), Uuid::parse_str(b)) {
            return a == b;
        }
    }
    compare_values(current, proposed) == Some(std::cmp::Ordering::Equal)
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}
