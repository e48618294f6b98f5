use axum::http::HeaderMap;
use uuid::Uuid;

/// The acting principal for one inbound request.
/// Produced once by the identity middleware and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    User { id: Uuid, email: Option<String> },
}

impl Identity {
    pub fn user(id: Uuid) -> Self {
        Identity::User { id, email: None }
    }

    pub fn id(&self) -> Option<Uuid> {
        match self {
            Identity::User { id, .. } => Some(*id),
            Identity::Anonymous => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::User { .. })
    }
}

/// Turns request headers into an identity. Never fails: anything that
/// cannot be verified resolves to `Identity::Anonymous`.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> Identity;
}

/// Resolver that returns a fixed identity, for tests and local tooling
#[derive(Debug, Clone, Default)]
pub struct StaticResolver(pub Identity);

impl IdentityResolver for StaticResolver {
    fn resolve(&self, _headers: &HeaderMap) -> Identity {
        self.0.clone()
    }
}

/// Extract a bearer token from the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let auth_str = headers.get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    let token = auth_str.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}
