// handlers/model.rs - Generic model API
//
// GET    /api/model/:entity        read (selector from query)
// POST   /api/model/:entity        create, body {data: {...} | [...]}
// PATCH  /api/model/:entity        update, body {where, data}
// DELETE /api/model/:entity        delete, ?where= required
// GET    /api/model/:entity/:id    read one
// PATCH  /api/model/:entity/:id    update one, body {data}
// DELETE /api/model/:entity/:id    delete one

use axum::{
    extract::{rejection::JsonRejection, Path, RawQuery, State},
    http::{Method, Uri},
    Extension, Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::Identity;
use crate::error::ApiError;
use crate::gateway::{Envelope, Payload, Selector};
use crate::middleware::{ApiResponse, ApiResult};
use crate::types::{OperationKind, Record};

pub async fn collection_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(entity): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Vec<Record>> {
    let selector = selector_from_query(query.as_deref())?;
    let envelope = Envelope::new(entity, OperationKind::Read).with_selector(selector);
    let records = state.gateway(identity).execute(envelope).await?;
    Ok(ApiResponse::success(records))
}

pub async fn collection_post(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(entity): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Value> {
    let Json(body) = body?;
    let payload = match body.get("data") {
        Some(Value::Object(record)) => Payload::One(record.clone()),
        Some(Value::Array(items)) => Payload::Many(records_from(items)?),
        _ => return Err(ApiError::validation("INVALID_BODY", "Body must be {\"data\": object | array}")),
    };
    let single = matches!(payload, Payload::One(_));

    let envelope = Envelope::new(entity, OperationKind::Create).with_payload(payload);
    let mut created = state.gateway(identity).execute(envelope).await?;

    let data = match (single, created.pop()) {
        (true, Some(record)) => Value::Object(record),
        (_, last) => {
            created.extend(last);
            Value::Array(created.into_iter().map(Value::Object).collect())
        }
    };
    Ok(ApiResponse::created(data))
}

pub async fn collection_update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(entity): Path<String>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Vec<Record>> {
    let Json(body) = body?;
    let where_clause = required_where(body.get("where"))?;
    let changes = data_object(&body)?;

    let envelope = Envelope::new(entity, OperationKind::Update)
        .with_selector(Selector::filtered(where_clause))
        .with_payload(Payload::One(changes));
    let updated = state.gateway(identity).execute(envelope).await?;
    Ok(ApiResponse::success(updated))
}

pub async fn collection_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(entity): Path<String>,
    RawQuery(query): RawQuery,
) -> ApiResult<Vec<Record>> {
    let selector = selector_from_query(query.as_deref())?;
    let where_clause = required_where(selector.where_clause.as_ref())?;
    if selector.take.is_some() || selector.skip.is_some() {
        return Err(ApiError::validation("INVALID_QUERY", "take and skip are not supported on delete"));
    }
    let selector = Selector::filtered(where_clause);

    let envelope = Envelope::new(entity, OperationKind::Delete).with_selector(selector);
    let deleted = state.gateway(identity).execute(envelope).await?;
    Ok(ApiResponse::success(deleted))
}

pub async fn record_get(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((entity, id)): Path<(String, String)>,
    RawQuery(query): RawQuery,
) -> ApiResult<Record> {
    let id = parse_id(&entity, &id)?;
    let mut selector = selector_from_query(query.as_deref())?;
    selector.where_clause = Selector::by_id(id).where_clause;
    selector.skip = None;

    let envelope = Envelope::new(entity.as_str(), OperationKind::Read).with_selector(selector);
    let record = single(&entity, state.gateway(identity).execute(envelope).await?)?;
    Ok(ApiResponse::success(record))
}

pub async fn record_update(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((entity, id)): Path<(String, String)>,
    body: Result<Json<Value>, JsonRejection>,
) -> ApiResult<Record> {
    let id = parse_id(&entity, &id)?;
    let Json(body) = body?;
    let changes = data_object(&body)?;

    let envelope = Envelope::new(entity.as_str(), OperationKind::Update)
        .with_selector(Selector::by_id(id))
        .with_payload(Payload::One(changes));
    let record = single(&entity, state.gateway(identity).execute(envelope).await?)?;
    Ok(ApiResponse::success(record))
}

pub async fn record_delete(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path((entity, id)): Path<(String, String)>,
) -> ApiResult<Record> {
    let id = parse_id(&entity, &id)?;

    let envelope = Envelope::new(entity.as_str(), OperationKind::Delete).with_selector(Selector::by_id(id));
    let record = single(&entity, state.gateway(identity).execute(envelope).await?)?;
    Ok(ApiResponse::success(record))
}

pub async fn method_not_allowed(method: Method, uri: Uri) -> ApiError {
    ApiError::method_not_allowed(method.as_str(), uri.path())
}

/// Build a selector from `?q=<selector json>` or the individual
/// `where`, `orderBy`, `include`, `take` and `skip` parameters
pub fn selector_from_query(query: Option<&str>) -> Result<Selector, ApiError> {
    let mut selector = Selector::default();
    let Some(query) = query else { return Ok(selector) };

    for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
        match key.as_ref() {
            "q" => {
                selector = serde_json::from_str(&value)
                    .map_err(|e| ApiError::validation("INVALID_QUERY", format!("q: {}", e)))?;
            }
            "where" => selector.where_clause = Some(json_param("where", &value)?),
            "orderBy" => selector.order_by = Some(json_or_string(&value)),
            "include" => selector.include = Some(json_or_string(&value)),
            "take" => selector.take = Some(count_param("take", &value)?),
            "skip" => selector.skip = Some(count_param("skip", &value)?),
            _ => {}
        }
    }
    Ok(selector)
}

/// Collection writes need a non-empty `where` object
fn required_where(where_clause: Option<&Value>) -> Result<Value, ApiError> {
    match where_clause {
        Some(Value::Object(conditions)) if !conditions.is_empty() => Ok(Value::Object(conditions.clone())),
        _ => Err(ApiError::validation("MISSING_WHERE", "Collection writes require a non-empty \"where\" object")),
    }
}

fn json_param(name: &str, value: &str) -> Result<Value, ApiError> {
    serde_json::from_str(value).map_err(|e| ApiError::validation("INVALID_QUERY", format!("{}: {}", name, e)))
}

/// `orderBy=createdAt desc` and `include=createdBy` need no JSON quoting
fn json_or_string(value: &str) -> Value {
    serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()))
}

fn count_param(name: &str, value: &str) -> Result<usize, ApiError> {
    value
        .parse()
        .map_err(|_| ApiError::validation("INVALID_QUERY", format!("{} must be a non-negative integer", name)))
}

fn data_object(body: &Value) -> Result<Record, ApiError> {
    match body.get("data") {
        Some(Value::Object(record)) => Ok(record.clone()),
        _ => Err(ApiError::validation("INVALID_BODY", "Body must be {\"data\": object}")),
    }
}

fn records_from(items: &[Value]) -> Result<Vec<Record>, ApiError> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record.clone()),
            _ => Err(ApiError::validation("INVALID_BODY", "Every item in data must be an object")),
        })
        .collect()
}

/// Malformed ids cannot match any record
fn parse_id(entity: &str, id: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(id).map_err(|_| ApiError::not_found(format!("No {} record matched the request.", entity)))
}

fn single(entity: &str, records: Vec<Record>) -> Result<Record, ApiError> {
    records
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found(format!("No {} record matched the request.", entity)))
}
