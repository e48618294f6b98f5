mod common;

use anyhow::Result;
use axum::http::{Method, StatusCode};
use quill_api::config::AppConfig;
use serde_json::json;
use std::time::Duration;

fn query(pairs: &[(&str, &str)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

#[tokio::test]
async fn root_and_health() -> Result<()> {
    let app = common::spawn_app();

    let (status, body) = app.get("/", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["entities"], json!(["post", "user"]), "unexpected entities: {}", body);

    let (status, body) = app.get("/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("ok"));
    Ok(())
}

#[tokio::test]
async fn serves_without_request_logging() -> Result<()> {
    let mut config = AppConfig::development();
    config.api.enable_request_logging = false;
    let app = common::spawn_app_with(config);

    let (status, _) = app.get("/", None).await?;
    assert_eq!(status, StatusCode::OK);
    let alice = app.sign_up("alice@example.com").await?;
    app.create_post(&alice, "quiet", true).await?;
    Ok(())
}

#[tokio::test]
async fn anonymous_post_create_is_forbidden() -> Result<()> {
    let app = common::spawn_app();

    let (status, body) = app
        .send(Method::POST, "/api/model/post", None, Some(json!({ "data": { "title": "t", "content": "c" } })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "expected 403, got {}: {}", status, body);
    assert_eq!(body["error"]["category"], json!("AccessDenied"));
    assert_eq!(body["error"]["retryable"], json!(false));

    let (_, body) = app.get("/api/model/post", None).await?;
    assert_eq!(body["data"], json!([]));
    Ok(())
}

#[tokio::test]
async fn create_then_read_with_forced_creator() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    let bob = app.sign_up("bob@example.com").await?;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/model/post",
            Some(&alice.token),
            Some(json!({ "data": { "title": "Hello", "content": "World", "createdById": bob.id.to_string() } })),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    let created = body["data"].clone();
    assert_eq!(created["createdById"], json!(alice.id.to_string()));
    assert_eq!(created["published"], json!(false));

    let id = created["id"].as_str().unwrap();
    let (status, body) = app.get(&format!("/api/model/post/{}", id), Some(&alice.token)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], created);
    Ok(())
}

#[tokio::test]
async fn unpublished_posts_are_hidden_from_others() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    let bob = app.sign_up("bob@example.com").await?;
    let draft = app.create_post(&alice, "draft", false).await?;
    app.create_post(&alice, "public", true).await?;

    let (_, body) = app.get("/api/model/post", Some(&bob.token)).await?;
    let titles: Vec<_> = body["data"].as_array().unwrap().iter().map(|p| p["title"].clone()).collect();
    assert_eq!(titles, vec![json!("public")]);

    let (status, body) = app
        .get(&format!("/api/model/post/{}", draft["id"].as_str().unwrap()), Some(&bob.token))
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "draft leaked: {}", body);
    assert_eq!(body["error"]["category"], json!("NotFound"));

    let filtered = query(&[("where", r#"{"published":false}"#)]);
    let (_, body) = app.get(&format!("/api/model/post?{}", filtered), Some(&alice.token)).await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn cross_user_publish_toggle_is_forbidden() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    let bob = app.sign_up("bob@example.com").await?;
    let post = app.create_post(&alice, "mine", false).await?;
    let uri = format!("/api/model/post/{}", post["id"].as_str().unwrap());

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&bob.token), Some(json!({ "data": { "published": true } })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "expected 403, got {}: {}", status, body);

    let (_, body) = app.get(&uri, Some(&alice.token)).await?;
    assert_eq!(body["data"]["published"], json!(false));

    let (status, body) = app
        .send(Method::PATCH, &uri, Some(&alice.token), Some(json!({ "data": { "published": true } })))
        .await?;
    assert_eq!(status, StatusCode::OK, "owner update failed: {}", body);
    assert_eq!(body["data"]["published"], json!(true));
    Ok(())
}

#[tokio::test]
async fn collection_update_requires_where() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    app.create_post(&alice, "a", false).await?;
    app.create_post(&alice, "b", false).await?;

    let (status, body) = app
        .send(Method::PATCH, "/api/model/post", Some(&alice.token), Some(json!({ "data": { "published": true } })))
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "expected 422, got {}: {}", status, body);
    assert_eq!(body["error"]["code"], json!("MISSING_WHERE"));

    let (status, body) = app
        .send(
            Method::PATCH,
            "/api/model/post",
            Some(&alice.token),
            Some(json!({ "where": { "published": false }, "data": { "published": true } })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "bulk update failed: {}", body);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    Ok(())
}

#[tokio::test]
async fn delete_twice_is_not_found() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    let post = app.create_post(&alice, "bye", true).await?;
    let uri = format!("/api/model/post/{}", post["id"].as_str().unwrap());

    let (status, body) = app.send(Method::DELETE, &uri, Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::OK, "delete failed: {}", body);
    assert_eq!(body["data"]["id"], post["id"]);

    let (status, _) = app.send(Method::DELETE, &uri, Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app.send(Method::DELETE, "/api/model/post/not-a-uuid", Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn order_by_created_at_desc() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    for title in ["first", "second", "third"] {
        app.create_post(&alice, title, true).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let params = query(&[("orderBy", "createdAt desc"), ("take", "2")]);
    let (status, body) = app.get(&format!("/api/model/post?{}", params), Some(&alice.token)).await?;
    assert_eq!(status, StatusCode::OK);
    let titles: Vec<_> = body["data"].as_array().unwrap().iter().map(|p| p["title"].clone()).collect();
    assert_eq!(titles, vec![json!("third"), json!("second")]);
    Ok(())
}

#[tokio::test]
async fn duplicate_email_is_conflict() -> Result<()> {
    let app = common::spawn_app();
    app.sign_up("alice@example.com").await?;

    let (status, body) = app
        .send(
            Method::POST,
            "/api/model/user",
            None,
            Some(json!({ "data": { "email": "alice@example.com", "password": "another" } })),
        )
        .await?;
    assert_eq!(status, StatusCode::CONFLICT, "expected 409, got {}: {}", status, body);
    assert_eq!(body["error"]["category"], json!("Conflict"));
    assert_eq!(body["error"]["code"], json!("UNIQUE_VIOLATION"));
    assert_eq!(body["error"]["retryable"], json!(true));
    Ok(())
}

#[tokio::test]
async fn validation_failures_are_422() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;

    let (status, body) = app
        .send(Method::POST, "/api/model/post", Some(&alice.token), Some(json!({ "data": { "title": "no content" } })))
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "expected 422, got {}: {}", status, body);
    assert_eq!(body["error"]["category"], json!("ValidationFailed"));

    let (status, _) = app
        .send(Method::POST, "/api/model/post", Some(&alice.token), Some(json!({ "title": "unwrapped" })))
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    Ok(())
}

#[tokio::test]
async fn unknown_entity_and_method() -> Result<()> {
    let app = common::spawn_app();

    let (status, body) = app.get("/api/model/comment", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND, "expected 404, got {}: {}", status, body);

    let (status, body) = app.send(Method::POST, "/api/model/post/00000000-0000-0000-0000-000000000000", None, None).await?;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["category"], json!("MethodNotAllowed"));
    assert!(body["error"]["message"].as_str().unwrap().contains("POST"), "message should name the method: {}", body);
    Ok(())
}

#[tokio::test]
async fn unmatched_routes_answer_with_json_not_found() -> Result<()> {
    let app = common::spawn_app();

    for uri in ["/api/model", "/api/model/post/a/b", "/nowhere"] {
        let (status, body) = app.get(uri, None).await?;
        assert_eq!(status, StatusCode::NOT_FOUND, "{} answered {}: {}", uri, status, body);
        assert_eq!(body["error"]["category"], json!("NotFound"));
    }
    Ok(())
}

#[tokio::test]
async fn collection_delete_needs_conditions_and_no_paging() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    app.create_post(&alice, "keep me", false).await?;
    app.create_post(&alice, "drop me", false).await?;

    for params in [
        query(&[("where", "{}")]),
        query(&[("where", r#"{"published":false}"#), ("take", "1")]),
        query(&[("where", r#"{"published":false}"#), ("skip", "1")]),
    ] {
        let (status, body) = app.send(Method::DELETE, &format!("/api/model/post?{}", params), Some(&alice.token), None).await?;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{} answered {}: {}", params, status, body);
        assert_eq!(body["error"]["category"], json!("ValidationFailed"));
    }

    let (status, body) = app
        .send(Method::PATCH, "/api/model/post", Some(&alice.token), Some(json!({ "where": {}, "data": { "published": true } })))
        .await?;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "empty where on update: {}", body);
    assert_eq!(body["error"]["code"], json!("MISSING_WHERE"));

    let (_, body) = app.get("/api/model/post", Some(&alice.token)).await?;
    assert_eq!(body["data"].as_array().unwrap().len(), 2, "nothing may be deleted or touched: {}", body);

    let params = query(&[("where", r#"{"title":"drop me"}"#)]);
    let (status, body) = app.send(Method::DELETE, &format!("/api/model/post?{}", params), Some(&alice.token), None).await?;
    assert_eq!(status, StatusCode::OK, "filtered delete failed: {}", body);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn login_rejects_bad_credentials() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    assert!(!alice.token.is_empty());

    let (status, body) = app
        .send(Method::POST, "/auth/login", None, Some(json!({ "email": "alice@example.com", "password": "wrong" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN, "expected 403, got {}: {}", status, body);
    assert_eq!(body["error"]["category"], json!("AccessDenied"));

    let (status, _) = app
        .send(Method::POST, "/auth/login", None, Some(json!({ "email": "nobody@example.com", "password": "password123" })))
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // a garbage token reads as anonymous
    let (status, body) = app.get("/api/model/user", Some("not-a-jwt")).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
    Ok(())
}

#[tokio::test]
async fn password_is_never_returned() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;

    let (_, body) = app.get(&format!("/api/model/user/{}", alice.id), Some(&alice.token)).await?;
    assert_eq!(body["data"]["email"], json!(alice.email));
    assert!(body["data"].get("password").is_none(), "password leaked: {}", body);

    let (status, body) = app
        .send(
            Method::PATCH,
            &format!("/api/model/user/{}", alice.id),
            Some(&alice.token),
            Some(json!({ "data": { "password": "changed" } })),
        )
        .await?;
    assert_eq!(status, StatusCode::OK, "password change failed: {}", body);
    assert!(body["data"].get("password").is_none(), "password leaked: {}", body);

    let (status, _) = app
        .send(Method::POST, "/auth/login", None, Some(json!({ "email": alice.email, "password": "changed" })))
        .await?;
    assert_eq!(status, StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn include_created_by() -> Result<()> {
    let app = common::spawn_app();
    let alice = app.sign_up("alice@example.com").await?;
    let bob = app.sign_up("bob@example.com").await?;
    app.create_post(&alice, "public", true).await?;

    let (status, body) = app.get("/api/model/post?include=createdBy", Some(&bob.token)).await?;
    assert_eq!(status, StatusCode::OK, "include failed: {}", body);
    let author = &body["data"][0]["createdBy"];
    assert_eq!(author["id"], json!(alice.id.to_string()));
    assert!(author.get("password").is_none());
    Ok(())
}

#[tokio::test]
async fn static_resolver_fixes_the_caller() -> Result<()> {
    use quill_api::app::app;
    use quill_api::auth::{Identity, StaticResolver};
    use std::sync::Arc;

    let base = common::spawn_app();
    let alice = base.sign_up("alice@example.com").await?;

    let state = base.state.clone().with_resolver(Arc::new(StaticResolver(Identity::user(alice.id))));
    let fixed = common::TestApp { router: app(state.clone()), state };

    // no token needed: every request runs as alice
    let (status, body) = fixed
        .send(Method::POST, "/api/model/post", None, Some(json!({ "data": { "title": "t", "content": "c" } })))
        .await?;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", body);
    assert_eq!(body["data"]["createdById"], json!(alice.id.to_string()));

    // the original app shares the store but still resolves tokens
    let (_, body) = base.get("/api/model/post", None).await?;
    assert_eq!(body["data"], json!([]));
    Ok(())
}
