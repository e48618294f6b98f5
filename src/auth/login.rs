use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use super::jwt::JwtResolver;
use super::password::verify_password;
use super::AuthError;
use crate::database::{StorageError, Store};
use crate::filter::Filter;
use crate::models::user;
use crate::registry::EntityRegistry;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: String,
    /// Seconds until the token expires
    pub expires_in: i64,
    pub user: LoginUser,
}

#[derive(Debug, Serialize)]
pub struct LoginUser {
    pub id: Uuid,
    pub email: String,
}

/// Verify credentials against stored users and issue a bearer token.
/// Looks the user up directly in storage: the caller has no identity yet.
pub async fn authenticate(
    store: &dyn Store,
    registry: &EntityRegistry,
    resolver: &JwtResolver,
    email: &str,
    password: &str,
) -> Result<LoginResult, AuthError> {
    let schema = registry.get(user::ENTITY).ok_or(AuthError::MissingEntity(user::ENTITY))?;

    let mut filter = Filter::new(&schema.table).map_err(StorageError::from)?;
    filter
        .where_clause(json!({ "email": email }))
        .map_err(StorageError::from)?;
    filter.with_options(schema.filter_options());

    let rows = store.select(&filter).await?;
    let row = rows.first().ok_or(AuthError::InvalidCredentials)?;

    let stored = row.get("password").and_then(Value::as_str).unwrap_or_default();
    if !verify_password(password, stored) {
        return Err(AuthError::InvalidCredentials);
    }

    let id = row
        .get("id")
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        .ok_or(AuthError::InvalidCredentials)?;

    let token = resolver.issue(id, Some(email.to_string()))?;
    info!("User {} logged in", id);

    Ok(LoginResult {
        token,
        expires_in: resolver.expiry_seconds(),
        user: LoginUser { id, email: email.to_string() },
    })
}
