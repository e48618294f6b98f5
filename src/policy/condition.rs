use serde_json::Value;
use uuid::Uuid;

use crate::auth::Identity;
use crate::types::Record;

/// Predicate over `(identity, record)`
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Always,
    Authenticated,
    /// The record field holds the acting user's id
    OwnedBy(String),
    FieldEquals(String, Value),
    Not(Box<Condition>),
    Any(Vec<Condition>),
    All(Vec<Condition>),
}

impl Condition {
    pub fn owned_by(field: impl Into<String>) -> Self {
        Condition::OwnedBy(field.into())
    }

    pub fn field_equals(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::FieldEquals(field.into(), value.into())
    }

    pub fn not(inner: Condition) -> Self {
        Condition::Not(Box::new(inner))
    }

    pub fn holds(&self, identity: &Identity, record: &Record) -> bool {
        match self {
            Condition::Always => true,
            Condition::Authenticated => identity.is_authenticated(),
            Condition::OwnedBy(field) => match (identity.id(), record.get(field).and_then(Value::as_str)) {
                (Some(id), Some(owner)) => Uuid::parse_str(owner).map(|o| o == id).unwrap_or(false),
                _ => false,
            },
            Condition::FieldEquals(field, expected) => record.get(field) == Some(expected),
            Condition::Not(inner) => !inner.holds(identity, record),
            Condition::Any(conditions) => conditions.iter().any(|c| c.holds(identity, record)),
            Condition::All(conditions) => conditions.iter().all(|c| c.holds(identity, record)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ownership_compares_parsed_uuids() {
        let id = Uuid::new_v4();
        let record = json!({ "createdById": id.to_string().to_uppercase() }).as_object().cloned().unwrap();
        assert!(Condition::owned_by("createdById").holds(&Identity::user(id), &record));
        assert!(!Condition::owned_by("createdById").holds(&Identity::user(Uuid::new_v4()), &record));
        assert!(!Condition::owned_by("createdById").holds(&Identity::Anonymous, &record));
        assert!(!Condition::owned_by("missing").holds(&Identity::user(id), &record));
    }

    #[test]
    fn combinators() {
        let record = json!({ "published": true }).as_object().cloned().unwrap();
        let user = Identity::user(Uuid::new_v4());
        let published_and_signed_in = Condition::All(vec![Condition::Authenticated, Condition::field_equals("published", true)]);
        assert!(published_and_signed_in.holds(&user, &record));
        assert!(!published_and_signed_in.holds(&Identity::Anonymous, &record));
        assert!(Condition::Any(vec![Condition::not(Condition::Always), Condition::Authenticated]).holds(&user, &record));
        assert!(Condition::All(vec![]).holds(&Identity::Anonymous, &record));
        assert!(!Condition::Any(vec![]).holds(&user, &record));
    }
}
