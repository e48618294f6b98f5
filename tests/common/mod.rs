#![allow(dead_code)]

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use quill_api::app::{app, AppState};
use quill_api::config::AppConfig;
use quill_api::database::MemoryStore;
use quill_api::models;

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
}

pub struct TestUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

/// Fresh in-memory server per test
pub fn spawn_app() -> TestApp {
    spawn_app_with(AppConfig::development())
}

pub fn spawn_app_with(config: AppConfig) -> TestApp {
    let registry = models::registry();
    let store = Arc::new(MemoryStore::new(&registry));
    let state = AppState::new(store, registry, config);
    TestApp { router: app(state.clone()), state }
}

impl TestApp {
    pub async fn send(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))?,
            None => builder.body(Body::empty())?,
        };

        let response = self.router.clone().oneshot(request).await?;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).context("response was not JSON")? };
        Ok((status, body))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Result<(StatusCode, Value)> {
        self.send(Method::GET, uri, token, None).await
    }

    /// Create an account through the API, then log in with it
    pub async fn sign_up(&self, email: &str) -> Result<TestUser> {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/model/user",
                None,
                Some(json!({ "data": { "email": email, "password": "password123" } })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "sign up failed with {}: {}", status, body);

        let (status, body) = self
            .send(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": email, "password": "password123" })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::OK, "login failed with {}: {}", status, body);

        let id = body["data"]["user"]["id"].as_str().context("login without user id")?;
        let token = body["data"]["token"].as_str().context("login without token")?;
        Ok(TestUser { id: Uuid::parse_str(id)?, email: email.to_string(), token: token.to_string() })
    }

    pub async fn create_post(&self, user: &TestUser, title: &str, published: bool) -> Result<Value> {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/model/post",
                Some(&user.token),
                Some(json!({ "data": { "title": title, "content": "Lorem ipsum", "published": published } })),
            )
            .await?;
        anyhow::ensure!(status == StatusCode::CREATED, "create post failed with {}: {}", status, body);
        Ok(body["data"].clone())
    }
}
