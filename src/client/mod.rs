//! Typed query/mutation client with a per-query cache.
//!
//! Entries are keyed by entity and the canonical JSON of the selector.
//! Successful mutations drop every entry of the entity they touched;
//! optimistic mutations patch entries first and restore them on failure.
//! Each entity carries a generation bumped by invalidation. A fetch or
//! rollback that started under an older generation leaves the cache alone.

pub mod transport;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::classify::{ClassifiedError, ErrorCategory};
use crate::gateway::Selector;
use crate::models::{post, user, Post, User};
use crate::registry::ID;
use crate::types::Record;

pub use transport::{HttpTransport, ModelRequest, RouterTransport, Transport};

/// A record type served by the model API
pub trait Model: DeserializeOwned {
    const ENTITY: &'static str;
}

impl Model for Post {
    const ENTITY: &'static str = post::ENTITY;
}

impl Model for User {
    const ENTITY: &'static str = user::ENTITY;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: String,
    pub shape: String,
}

impl CacheKey {
    pub fn new(entity: &str, selector: &Selector) -> Self {
        Self { entity: entity.to_string(), shape: selector.shape() }
    }
}

#[derive(Default)]
struct Cache {
    entries: HashMap<CacheKey, Vec<Value>>,
    generations: HashMap<String, u64>,
}

impl Cache {
    fn generation(&self, entity: &str) -> u64 {
        self.generations.get(entity).copied().unwrap_or(0)
    }
}

struct Snapshot {
    generation: u64,
    entries: Vec<(CacheKey, Vec<Value>)>,
}

pub struct QueryClient<T: Transport> {
    transport: T,
    cache: RwLock<Cache>,
}

impl<T: Transport> QueryClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport, cache: RwLock::new(Cache::default()) }
    }

    pub async fn find_many<M: Model>(&self, selector: &Selector) -> Result<Vec<M>, ClassifiedError> {
        let records = self.fetch(M::ENTITY, selector).await?;
        records.into_iter().map(decode).collect()
    }

    pub async fn find_unique<M: Model>(&self, id: Uuid) -> Result<M, ClassifiedError> {
        let records = self.fetch(M::ENTITY, &Selector::by_id(id)).await?;
        match records.into_iter().next() {
            Some(record) => decode(record),
            None => Err(ClassifiedError::new(ErrorCategory::NotFound, "NOT_FOUND", format!("No {} record matched the request.", M::ENTITY))),
        }
    }

    pub async fn create<M: Model>(&self, data: Record) -> Result<M, ClassifiedError> {
        let request = ModelRequest::new(Method::POST, collection_path(M::ENTITY)).body(json!({ "data": data }));
        let created = self.transport.send(request).await?;
        self.invalidate(M::ENTITY).await;
        decode(created)
    }

    pub async fn update<M: Model>(&self, id: Uuid, changes: Record) -> Result<M, ClassifiedError> {
        let updated = self.send_update(M::ENTITY, id, changes).await?;
        self.invalidate(M::ENTITY).await;
        decode(updated)
    }

    pub async fn delete<M: Model>(&self, id: Uuid) -> Result<M, ClassifiedError> {
        let deleted = self.send_delete(M::ENTITY, id).await?;
        self.invalidate(M::ENTITY).await;
        decode(deleted)
    }

    /// Patch cached copies of the record before the server confirms.
    /// On failure the cache is restored and the error returned unchanged.
    pub async fn update_optimistic<M: Model>(&self, id: Uuid, changes: Record) -> Result<M, ClassifiedError> {
        let snapshot = self
            .patch_cached(M::ENTITY, |records| {
                for record in records.iter_mut().filter(|r| has_id(r, id)) {
                    if let Value::Object(fields) = record {
                        fields.extend(changes.clone());
                    }
                }
            })
            .await;

        match self.send_update(M::ENTITY, id, changes).await {
            Ok(updated) => {
                self.invalidate(M::ENTITY).await;
                decode(updated)
            }
            Err(err) => {
                self.restore(M::ENTITY, snapshot).await;
                Err(err)
            }
        }
    }

    /// Drop the record from cached results before the server confirms
    pub async fn delete_optimistic<M: Model>(&self, id: Uuid) -> Result<M, ClassifiedError> {
        let snapshot = self.patch_cached(M::ENTITY, |records| records.retain(|r| !has_id(r, id))).await;

        match self.send_delete(M::ENTITY, id).await {
            Ok(deleted) => {
                self.invalidate(M::ENTITY).await;
                decode(deleted)
            }
            Err(err) => {
                self.restore(M::ENTITY, snapshot).await;
                Err(err)
            }
        }
    }

    /// Drop every cached query of `entity`
    pub async fn invalidate(&self, entity: &str) {
        let mut cache = self.cache.write().await;
        cache.entries.retain(|key, _| key.entity != entity);
        *cache.generations.entry(entity.to_string()).or_insert(0) += 1;
        debug!("Invalidated cached {} queries", entity);
    }

    /// Cached result for a query, without touching the transport
    pub async fn cached<M: Model>(&self, selector: &Selector) -> Option<Vec<M>> {
        let records = self.cache.read().await.entries.get(&CacheKey::new(M::ENTITY, selector)).cloned()?;
        records.into_iter().map(decode).collect::<Result<Vec<M>, _>>().ok()
    }

    async fn fetch(&self, entity: &str, selector: &Selector) -> Result<Vec<Value>, ClassifiedError> {
        let key = CacheKey::new(entity, selector);
        let generation = {
            let cache = self.cache.read().await;
            if let Some(records) = cache.entries.get(&key) {
                return Ok(records.clone());
            }
            cache.generation(entity)
        };

        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("q", &key.shape)
            .finish();
        let data = self
            .transport
            .send(ModelRequest::new(Method::GET, collection_path(entity)).query(query))
            .await?;
        let records = match data {
            Value::Array(records) => records,
            other => return Err(decode_error(format!("expected array, got {}", other))),
        };

        let mut cache = self.cache.write().await;
        if cache.generation(entity) == generation {
            cache.entries.insert(key, records.clone());
        } else {
            debug!("Discarding {} result fetched before invalidation", entity);
        }
        Ok(records)
    }

    async fn send_update(&self, entity: &str, id: Uuid, changes: Record) -> Result<Value, ClassifiedError> {
        let request = ModelRequest::new(Method::PATCH, record_path(entity, id)).body(json!({ "data": changes }));
        self.transport.send(request).await
    }

    async fn send_delete(&self, entity: &str, id: Uuid) -> Result<Value, ClassifiedError> {
        self.transport.send(ModelRequest::new(Method::DELETE, record_path(entity, id))).await
    }

    /// Apply `patch` to every cached result of `entity`, returning the
    /// entries as they were before
    async fn patch_cached(&self, entity: &str, patch: impl Fn(&mut Vec<Value>)) -> Snapshot {
        let mut cache = self.cache.write().await;
        let generation = cache.generation(entity);
        let mut entries = Vec::new();
        for (key, records) in cache.entries.iter_mut().filter(|(key, _)| key.entity == entity) {
            entries.push((key.clone(), records.clone()));
            patch(records);
        }
        Snapshot { generation, entries }
    }

    /// Put pre-patch entries back unless the entity was invalidated meanwhile
    async fn restore(&self, entity: &str, snapshot: Snapshot) {
        let mut cache = self.cache.write().await;
        if cache.generation(entity) != snapshot.generation {
            debug!("Skipping rollback of invalidated {} queries", entity);
            return;
        }
        cache.entries.extend(snapshot.entries);
    }
}

fn collection_path(entity: &str) -> String {
    format!("/api/model/{}", entity)
}

fn record_path(entity: &str, id: Uuid) -> String {
    format!("/api/model/{}/{}", entity, id)
}

fn has_id(record: &Value, id: Uuid) -> bool {
    record
        .get(ID)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
        == Some(id)
}

fn decode<M: DeserializeOwned>(value: Value) -> Result<M, ClassifiedError> {
    serde_json::from_value(value).map_err(|e| decode_error(e.to_string()))
}

fn decode_error(detail: String) -> ClassifiedError {
    tracing::warn!("Could not decode model API record: {}", detail);
    ClassifiedError::new(ErrorCategory::Unknown, "INVALID_RESPONSE", "The server returned an unreadable response.")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    /// Each request consumes one permit released by the test
    struct GatedTransport {
        gate: Semaphore,
        post: Value,
    }

    impl GatedTransport {
        fn new() -> Self {
            let stamp = "2026-01-01T00:00:00Z";
            let post = json!({
                "id": Uuid::new_v4(),
                "title": "cached",
                "content": "body",
                "published": true,
                "createdById": Uuid::new_v4(),
                "createdAt": stamp,
                "updatedAt": stamp,
            });
            Self { gate: Semaphore::new(0), post }
        }
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, request: ModelRequest) -> Result<Value, ClassifiedError> {
            self.gate.acquire().await.expect("gate closed").forget();
            if request.method == Method::GET {
                Ok(json!([self.post.clone()]))
            } else {
                Err(ClassifiedError::new(ErrorCategory::AccessDenied, "ACCESS_DENIED", "no"))
            }
        }
    }

    #[tokio::test]
    async fn fetch_racing_invalidate_is_not_cached() {
        let client = Arc::new(QueryClient::new(GatedTransport::new()));
        let selector = Selector::default();

        let pending = {
            let client = client.clone();
            let selector = selector.clone();
            tokio::spawn(async move { client.find_many::<Post>(&selector).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.invalidate(post::ENTITY).await;
        client.transport.gate.add_permits(1);

        let posts = pending.await.unwrap().unwrap();
        assert_eq!(posts.len(), 1);
        assert!(client.cached::<Post>(&selector).await.is_none());

        client.transport.gate.add_permits(1);
        client.find_many::<Post>(&selector).await.unwrap();
        assert_eq!(client.cached::<Post>(&selector).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_after_invalidate_keeps_the_cache_empty() {
        let client = Arc::new(QueryClient::new(GatedTransport::new()));
        let selector = Selector::default();
        client.transport.gate.add_permits(1);
        let cached = client.find_many::<Post>(&selector).await.unwrap();
        let id = cached[0].id;

        let pending = {
            let client = client.clone();
            let mut changes = Record::new();
            changes.insert("title".into(), json!("optimistic"));
            tokio::spawn(async move { client.update_optimistic::<Post>(id, changes).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.cached::<Post>(&selector).await.unwrap()[0].title, "optimistic");

        client.invalidate(post::ENTITY).await;
        client.transport.gate.add_permits(1);
        let err = pending.await.unwrap().unwrap_err();
        assert_eq!(err.category, ErrorCategory::AccessDenied);
        assert!(client.cached::<Post>(&selector).await.is_none());
    }
}
