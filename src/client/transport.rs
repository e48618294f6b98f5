use async_trait::async_trait;
use axum::{body::Body, http::Request, Router};
use reqwest::{header, Method, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tower::ServiceExt;

use crate::classify::{classify_transport, ClassifiedError, ErrorCategory};

/// One call against the model API
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub method: Method,
    /// Path below the server root, e.g. `/api/model/post`
    pub path: String,
    /// Already-encoded query string without `?`
    pub query: Option<String>,
    pub body: Option<Value>,
}

impl ModelRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self { method, path: path.into(), query: None, body: None }
    }

    pub fn query(mut self, query: String) -> Self {
        self.query = Some(query);
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    fn uri(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }
}

/// Carries model requests to a server and returns the `data` member of
/// the response. Failures arrive already classified.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ModelRequest) -> Result<Value, ClassifiedError>;
}

/// Remote server over HTTP
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpTransport {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClassifiedError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| classify_transport(&e))?;
        Ok(Self { client, base_url: base_url.into().trim_end_matches('/').to_string(), token: None })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ModelRequest) -> Result<Value, ClassifiedError> {
        let url = format!("{}{}", self.base_url, request.uri());
        let mut builder = self.client.request(request.method, url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| classify_transport(&e))?;
        decode_response(status, &bytes)
    }
}

/// In-process server: drives the router directly
#[derive(Clone)]
pub struct RouterTransport {
    router: Router,
    token: Option<String>,
}

impl RouterTransport {
    pub fn new(router: Router) -> Self {
        Self { router, token: None }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl Transport for RouterTransport {
    async fn send(&self, request: ModelRequest) -> Result<Value, ClassifiedError> {
        let mut builder = Request::builder().method(request.method.clone()).uri(request.uri());
        if let Some(token) = &self.token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match request.body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let http_request = builder.body(body).map_err(|e| invalid_response(e.to_string()))?;

        let response = match self.router.clone().oneshot(http_request).await {
            Ok(response) => response,
            Err(never) => match never {},
        };
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| invalid_response(e.to_string()))?;
        decode_response(status, &bytes)
    }
}

/// Success bodies are `{data}`; error bodies are `{error: ClassifiedError}`,
/// falling back to the status when the body is not in that shape
pub fn decode_response(status: StatusCode, bytes: &[u8]) -> Result<Value, ClassifiedError> {
    let body: Option<Value> = serde_json::from_slice(bytes).ok();

    if status.is_success() {
        return match body {
            Some(Value::Object(mut map)) if map.contains_key("data") => Ok(map.remove("data").unwrap_or(Value::Null)),
            _ => Err(invalid_response(format!("response without data member (status {})", status))),
        };
    }

    let classified = body
        .and_then(|mut b| b.get_mut("error").map(Value::take))
        .and_then(|error| serde_json::from_value::<ClassifiedError>(error).ok())
        .unwrap_or_else(|| ClassifiedError::from_status(status));
    Err(classified)
}

fn invalid_response(detail: String) -> ClassifiedError {
    tracing::warn!("Unreadable model API response: {}", detail);
    ClassifiedError::new(ErrorCategory::Unknown, "INVALID_RESPONSE", "The server returned an unreadable response.")
}
