use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::User;
use crate::policy::{Condition, PolicySet};
use crate::registry::{EntitySchema, FieldDef, FieldType};
use crate::types::OperationKind::{Create, Delete, Read, Update};

pub const ENTITY: &str = "post";

/// Signed-in users see published posts; authors see and manage their own.
pub fn schema() -> EntitySchema {
    EntitySchema::new(ENTITY)
        .field(FieldDef::new("name", FieldType::String))
        .field(FieldDef::new("title", FieldType::String).required())
        .field(FieldDef::new("content", FieldType::Text).required())
        .field(FieldDef::new("published", FieldType::Boolean).required().default(false))
        .creator("createdById")
        .relation("createdBy", super::user::ENTITY, "createdById")
        .policy(
            PolicySet::new()
                .allow(&[Create], Condition::Authenticated)
                .allow(
                    &[Read],
                    Condition::Any(vec![
                        Condition::All(vec![Condition::Authenticated, Condition::field_equals("published", true)]),
                        Condition::owned_by("createdById"),
                    ]),
                )
                .allow(&[Update, Delete], Condition::owned_by("createdById")),
        )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: Uuid,
    #[serde(default)]
    pub name: Option<String>,
    pub title: String,
    pub content: String,
    pub published: bool,
    pub created_by_id: Uuid,
    /// Present when the read included `createdBy`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<User>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
