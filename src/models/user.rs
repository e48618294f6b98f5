use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::policy::{Condition, PolicySet};
use crate::registry::{EntitySchema, FieldDef, FieldType};
use crate::types::OperationKind::{Create, Delete, Read, Update};

pub const ENTITY: &str = "user";

/// A user is its own principal: sign-up is open, profiles are visible to
/// signed-in users, and only the user may change or remove their account.
pub fn schema() -> EntitySchema {
    EntitySchema::new(ENTITY)
        .field(FieldDef::new("email", FieldType::String).required().unique())
        .field(FieldDef::new("password", FieldType::Password).required())
        .field(FieldDef::new("username", FieldType::String))
        .field(FieldDef::new("phone", FieldType::String))
        .policy(
            PolicySet::new()
                .allow(&[Create], Condition::Always)
                .allow(&[Read], Condition::Authenticated)
                .allow(&[Update, Delete], Condition::owned_by("id"))
                .deny_field("password", &[Read], Condition::Always),
        )
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
