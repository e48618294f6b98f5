use serde_json::Value;
use thiserror::Error;

use super::EntitySchema;
use crate::types::Record;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

/// Check a create payload after managed fields have been stripped
pub fn validate_create(schema: &EntitySchema, payload: &Record) -> Result<(), ValidationError> {
    check_known_and_typed(schema, payload)?;

    for field in schema.fields.iter().filter(|f| f.required && !f.system && !schema.is_creator(&f.name)) {
        match payload.get(&field.name) {
            None | Some(Value::Null) if field.default.is_none() => {
                return Err(ValidationError::new(&field.name, "is required"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Check update changes; immutable fields are handled by the gateway
pub fn validate_update(schema: &EntitySchema, changes: &Record) -> Result<(), ValidationError> {
    if changes.is_empty() {
        return Err(ValidationError::new("data", "update payload is empty"));
    }
    check_known_and_typed(schema, changes)?;

    for (name, value) in changes {
        if value.is_null() && schema.get_field(name).map(|f| f.required).unwrap_or(false) {
            return Err(ValidationError::new(name, "is required"));
        }
    }
    Ok(())
}

fn check_known_and_typed(schema: &EntitySchema, payload: &Record) -> Result<(), ValidationError> {
    for (name, value) in payload {
        let field = schema
            .get_field(name)
            .ok_or_else(|| ValidationError::new(name, format!("unknown field for {}", schema.name)))?;
        if !value.is_null() && !field.kind.accepts(value) {
            return Err(ValidationError::new(name, format!("expected {}", field.kind.name())));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{FieldDef, FieldType};
    use serde_json::json;

    fn schema() -> EntitySchema {
        EntitySchema::new("post")
            .field(FieldDef::new("title", FieldType::String).required())
            .field(FieldDef::new("published", FieldType::Boolean).required().default(false))
            .creator("createdById")
    }

    fn record(v: Value) -> Record {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn create_requires_fields_without_defaults() {
        assert!(validate_create(&schema(), &record(json!({ "title": "t" }))).is_ok());
        let err = validate_create(&schema(), &record(json!({ "published": true }))).unwrap_err();
        assert_eq!(err.field, "title");
    }

    #[test]
    fn rejects_unknown_and_mistyped_fields() {
        let err = validate_create(&schema(), &record(json!({ "title": "t", "slug": "x" }))).unwrap_err();
        assert_eq!(err.field, "slug");
        let err = validate_create(&schema(), &record(json!({ "title": 5 }))).unwrap_err();
        assert_eq!(err.message, "expected string");
    }

    #[test]
    fn update_cannot_null_required_fields() {
        assert!(validate_update(&schema(), &record(json!({ "published": true }))).is_ok());
        assert!(validate_update(&schema(), &record(json!({ "title": null }))).is_err());
        assert!(validate_update(&schema(), &Record::new()).is_err());
    }
}
