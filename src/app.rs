use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{Identity, IdentityResolver, JwtResolver};
use crate::config::{AppConfig, SecurityConfig};
use crate::database::Store;
use crate::gateway::Gateway;
use crate::handlers::{auth, model, system};
use crate::middleware::identity_middleware;
use crate::registry::EntityRegistry;

/// Shared state: the store is the only shared resource, reached only
/// through per-request gateways
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub registry: Arc<EntityRegistry>,
    pub resolver: Arc<dyn IdentityResolver>,
    pub tokens: Arc<JwtResolver>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, registry: EntityRegistry, config: AppConfig) -> Self {
        let tokens = Arc::new(JwtResolver::new(
            config.security.jwt_secret.clone(),
            config.security.jwt_expiry_hours,
        ));
        Self {
            store,
            registry: Arc::new(registry),
            resolver: tokens.clone(),
            tokens,
            config: Arc::new(config),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn IdentityResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn gateway(&self, identity: Identity) -> Gateway {
        Gateway::new(self.store.clone(), self.registry.clone(), identity)
            .with_max_take(self.config.api.max_take)
            .with_password_cost(self.config.security.password_cost)
    }
}

pub fn app(state: AppState) -> Router {
    let router = Router::new()
        // Public
        .route("/", get(system::root))
        .route("/health", get(system::health))
        .route("/auth/login", post(auth::login))
        // Model API
        .route(
            "/api/model/:entity",
            get(model::collection_get)
                .post(model::collection_post)
                .patch(model::collection_update)
                .put(model::collection_update)
                .delete(model::collection_delete)
                .fallback(model::method_not_allowed),
        )
        .route(
            "/api/model/:entity/:id",
            get(model::record_get)
                .patch(model::record_update)
                .put(model::record_update)
                .delete(model::record_delete)
                .fallback(model::method_not_allowed),
        )
        .fallback(system::not_found)
        // Global middleware
        .layer(from_fn_with_state(state.clone(), identity_middleware))
        .layer(DefaultBodyLimit::max(state.config.api.max_request_size_bytes))
        .layer(cors_layer(&state.config.security));

    let router = if state.config.api.enable_request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    };
    router.with_state(state)
}

fn cors_layer(security: &SecurityConfig) -> CorsLayer {
    if security.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = security
        .cors_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(origins).allow_methods(Any).allow_headers(Any)
}
