use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::GatewayError;
use crate::registry::ID;

/// Which records an operation addresses, and how reads are shaped
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selector {
    #[serde(rename = "where", default, skip_serializing_if = "Option::is_none")]
    pub where_clause: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<Value>,
    /// `{"createdBy": true}`, `["createdBy"]` or `"createdBy"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip: Option<usize>,
}

impl Selector {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self::filtered(json!({ ID: id.to_string() }))
    }

    pub fn filtered(where_clause: Value) -> Self {
        Self { where_clause: Some(where_clause), ..Self::default() }
    }

    pub fn order_by(mut self, order: Value) -> Self {
        self.order_by = Some(order);
        self
    }

    pub fn include(mut self, relation: &str) -> Self {
        let mut names = match self.include.take() {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        names.insert(relation.to_string(), Value::Bool(true));
        self.include = Some(Value::Object(names));
        self
    }

    pub fn take(mut self, take: usize) -> Self {
        self.take = Some(take);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Relation names requested by `include`
    pub fn include_names(&self) -> Result<Vec<String>, GatewayError> {
        let invalid = || GatewayError::validation("include", "expected relation name, array or object");
        match &self.include {
            None | Some(Value::Null) => Ok(vec![]),
            Some(Value::String(name)) => Ok(vec![name.clone()]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
                .collect(),
            Some(Value::Object(map)) => {
                let mut names = Vec::new();
                for (name, flag) in map {
                    match flag {
                        Value::Bool(true) => names.push(name.clone()),
                        Value::Bool(false) => {}
                        _ => return Err(invalid()),
                    }
                }
                Ok(names)
            }
            Some(_) => Err(invalid()),
        }
    }

    /// Canonical JSON of the selector, stable under key order
    pub fn shape(&self) -> String {
        serde_json::to_value(self)
            .map(|v| v.to_string())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_wire_names() {
        let selector: Selector = serde_json::from_value(json!({
            "where": { "published": true },
            "orderBy": { "createdAt": "desc" },
            "include": { "createdBy": true },
            "take": 5
        }))
        .unwrap();
        assert_eq!(selector.where_clause, Some(json!({ "published": true })));
        assert_eq!(selector.include_names().unwrap(), vec!["createdBy".to_string()]);
        assert_eq!(selector.take, Some(5));
    }

    #[test]
    fn shape_ignores_key_order() {
        let a: Selector = serde_json::from_str(r#"{"where":{"a":1,"b":2},"take":1}"#).unwrap();
        let b: Selector = serde_json::from_str(r#"{"take":1,"where":{"b":2,"a":1}}"#).unwrap();
        assert_eq!(a.shape(), b.shape());
        assert_ne!(a.shape(), Selector::all().shape());
    }

    #[test]
    fn include_accepts_several_forms() {
        let from_array = Selector { include: Some(json!(["createdBy"])), ..Selector::default() };
        assert_eq!(from_array.include_names().unwrap(), vec!["createdBy".to_string()]);
        let off = Selector { include: Some(json!({ "createdBy": false })), ..Selector::default() };
        assert!(off.include_names().unwrap().is_empty());
        let bad = Selector { include: Some(json!(3)), ..Selector::default() };
        assert!(bad.include_names().is_err());
    }
}
