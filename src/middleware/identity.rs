use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use crate::app::AppState;

/// Resolve the caller once per request and store the `Identity` in the
/// request extensions for handlers to reuse
pub async fn identity_middleware(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let identity = state.resolver.resolve(request.headers());
    debug!("{} {} as {:?}", request.method(), request.uri().path(), identity.id());
    request.extensions_mut().insert(identity);
    next.run(request).await
}
