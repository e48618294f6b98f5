//! Entity registry: the explicit table from entity name to schema and policy.

pub mod validate;

use chrono::DateTime;
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::filter::FilterWhereOptions;
use crate::policy::PolicySet;

pub use validate::{validate_create, validate_update, ValidationError};

pub const ID: &str = "id";
pub const CREATED_AT: &str = "createdAt";
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Uuid,
    String,
    Text,
    Boolean,
    DateTime,
    /// Stored hashed, accepted as plain text on write
    Password,
}

impl FieldType {
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Uuid => "uuid",
            FieldType::String => "varchar(255)",
            FieldType::Text | FieldType::Password => "text",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "timestamptz",
        }
    }

    /// Cast applied to bound filter parameters
    pub fn cast(&self) -> Option<&'static str> {
        match self {
            FieldType::Uuid => Some("uuid"),
            FieldType::Boolean => Some("boolean"),
            FieldType::DateTime => Some("timestamptz"),
            _ => None,
        }
    }

    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (FieldType::Uuid, Value::String(s)) => Uuid::parse_str(s).is_ok(),
            (FieldType::String | FieldType::Text | FieldType::Password, Value::String(_)) => true,
            (FieldType::Boolean, Value::Bool(_)) => true,
            (FieldType::DateTime, Value::String(s)) => DateTime::parse_from_rfc3339(s).is_ok(),
            _ => false,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            FieldType::Uuid => "uuid",
            FieldType::String | FieldType::Text => "string",
            FieldType::Boolean => "boolean",
            FieldType::DateTime => "datetime",
            FieldType::Password => "password",
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub kind: FieldType,
    pub required: bool,
    pub unique: bool,
    pub default: Option<Value>,
    /// Generated by the gateway, never accepted from callers
    pub system: bool,
}

impl FieldDef {
    pub fn new(name: &str, kind: FieldType) -> Self {
        Self { name: name.to_string(), kind, required: false, unique: false, default: None, system: false }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn system(mut self) -> Self {
        self.system = true;
        self.required = true;
        self
    }
}

/// To-one relation resolved through `local_field` holding the target's id
#[derive(Debug, Clone)]
pub struct Relation {
    pub name: String,
    pub target: String,
    pub local_field: String,
}

#[derive(Debug, Clone)]
pub struct EntitySchema {
    pub name: String,
    pub table: String,
    pub fields: Vec<FieldDef>,
    pub creator_field: Option<String>,
    pub relations: Vec<Relation>,
    pub policy: PolicySet,
}

impl EntitySchema {
    /// New schema with the system fields every record carries
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            table: name.to_string(),
            fields: vec![
                FieldDef::new(ID, FieldType::Uuid).system().unique(),
                FieldDef::new(CREATED_AT, FieldType::DateTime).system(),
                FieldDef::new(UPDATED_AT, FieldType::DateTime).system(),
            ],
            creator_field: None,
            relations: vec![],
            policy: PolicySet::new(),
        }
    }

    pub fn field(mut self, def: FieldDef) -> Self {
        self.fields.push(def);
        self
    }

    /// Declare the creator reference; the gateway forces it to the acting user
    pub fn creator(mut self, field: &str) -> Self {
        self.fields.push(FieldDef::new(field, FieldType::Uuid));
        self.creator_field = Some(field.to_string());
        self
    }

    pub fn relation(mut self, name: &str, target: &str, local_field: &str) -> Self {
        self.relations.push(Relation {
            name: name.to_string(),
            target: target.to_string(),
            local_field: local_field.to_string(),
        });
        self
    }

    pub fn policy(mut self, policy: PolicySet) -> Self {
        self.policy = policy;
        self
    }

    pub fn get_field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn get_relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn is_creator(&self, name: &str) -> bool {
        self.creator_field.as_deref() == Some(name)
    }

    /// Fields whose value may never change once set
    pub fn is_immutable(&self, name: &str) -> bool {
        name == ID || name == CREATED_AT || self.is_creator(name)
    }

    /// Fields a caller may not supply: system fields and the creator
    pub fn is_managed(&self, name: &str) -> bool {
        self.get_field(name).map(|f| f.system).unwrap_or(false) || self.is_creator(name)
    }

    pub fn password_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.kind == FieldType::Password)
    }

    pub fn unique_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.unique)
    }

    pub fn filter_options(&self) -> FilterWhereOptions {
        let mut options = FilterWhereOptions::default();
        for field in &self.fields {
            if let Some(cast) = field.kind.cast() {
                options.casts.insert(field.name.clone(), cast);
            }
        }
        options
    }
}

#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, EntitySchema>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, schema: EntitySchema) -> Self {
        self.entities.insert(schema.name.clone(), schema);
        self
    }

    pub fn get(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    pub fn names(&self) -> Vec<&str> {
        self.entities.keys().map(String::as_str).collect()
    }
}
