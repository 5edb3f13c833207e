//! HTTP surface tests: routes, status codes and error bodies.

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::{json, Value};
use sitestack::{
    api,
    stacks::{
        provider::{MemoryProvider, Provider},
        store::{MemoryStore, StackStore},
        AcquirePolicy, ConcurrencyGuard, ControllerConfig, LifecycleController, ProjectName,
        ResolverConfig, Resolver, SiteService, StackError, StackHandle, StackRecord,
        StackRegistry, StackResult,
    },
};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower::ServiceExt;

const DB_DETAIL: &str = "password authentication failed for user \"admin\" at db.internal:5432";

/// A store whose backend is unreachable.
struct BrokenStore;

#[async_trait]
impl StackStore for BrokenStore {
    fn backend(&self) -> &'static str {
        "broken"
    }

    async fn get(&self, _handle: &StackHandle) -> StackResult<Option<StackRecord>> {
        Err(StackError::storage(DB_DETAIL))
    }

    async fn put(&self, _record: &StackRecord) -> StackResult<()> {
        Err(StackError::storage(DB_DETAIL))
    }

    async fn delete(&self, _handle: &StackHandle) -> StackResult<bool> {
        Err(StackError::storage(DB_DETAIL))
    }

    async fn list_by_project(&self, _project: &ProjectName) -> StackResult<Vec<StackRecord>> {
        Err(StackError::storage(DB_DETAIL))
    }

    async fn project_exists(&self, _project: &ProjectName) -> StackResult<bool> {
        Err(StackError::storage(DB_DETAIL))
    }
}

fn service(provider: MemoryProvider) -> Arc<SiteService> {
    service_on(provider, Arc::new(MemoryStore::new()))
}

fn service_on(provider: MemoryProvider, store: Arc<dyn StackStore>) -> Arc<SiteService> {
    let engine: Arc<dyn Provider> = Arc::new(provider);
    let controller = LifecycleController::new(
        StackRegistry::new(store),
        ConcurrencyGuard::new(AcquirePolicy::FailFast),
        engine,
        ControllerConfig::default(),
    );
    let resolver = Resolver::new(
        ResolverConfig::new()
            .with_location("westeurope")
            .with_subscription_id("6b4ce01c-5368-4bb0-af54-be67444292c2"),
    );
    Arc::new(SiteService::new(controller, resolver))
}

fn app() -> Router {
    api::app(service(MemoryProvider::new()))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<Response> {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => request.body(Body::empty())?,
    };
    Ok(app.clone().oneshot(request).await?)
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn blog() -> Value {
    json!({
        "project": "acme",
        "site": "blog",
        "content": "<h1>hello</h1>",
        "content404": "<h1>not here</h1>"
    })
}

#[tokio::test]
async fn health_reports_engine_and_store() -> Result<()> {
    let app = app();
    let response = send(&app, Method::GET, "/health", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-app"));
    assert!(response.headers().contains_key("x-request-id"));

    let body = json_body(response).await?;
    assert_eq!(body["name"], "sitestack");
    assert_eq!(body["provider"], "memory");
    assert_eq!(body["store"], "memory");
    Ok(())
}

#[tokio::test]
async fn request_id_is_propagated() -> Result<()> {
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "01J8ZQ3Y5X6V7W8T9S0R1Q2P3N")
        .body(Body::empty())?;
    let response = app().oneshot(request).await?;
    assert_eq!(
        response
            .headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("01J8ZQ3Y5X6V7W8T9S0R1Q2P3N")
    );
    Ok(())
}

#[tokio::test]
async fn site_crud_over_http() -> Result<()> {
    let app = app();

    let response = send(&app, Method::POST, "/v1/sites", Some(blog())).await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = json_body(response).await?;
    assert_eq!(created["name"], "blog");
    assert_eq!(created["status"], "active");
    assert_eq!(created["location"], "westeurope");
    let endpoint = created["endpoint"].clone();
    assert!(endpoint.as_str().is_some_and(|e| e.starts_with("https://")));

    let response = send(&app, Method::POST, "/v1/sites", Some(blog())).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await?["error"], "already_exists");

    let response = send(&app, Method::GET, "/v1/sites/acme/blog", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["endpoint"], endpoint);

    let response = send(&app, Method::GET, "/v1/sites/acme", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?.as_array().map(Vec::len), Some(1));

    let update = json!({"content": "<h1>v2</h1>", "content404": "<h1>gone</h1>"});
    let response = send(&app, Method::PUT, "/v1/sites/acme/blog", Some(update)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["endpoint"], endpoint);

    let response = send(&app, Method::POST, "/v1/sites/acme/blog/refresh", None).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let response = send(&app, Method::DELETE, "/v1/sites/acme/blog", None).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = send(&app, Method::GET, "/v1/sites/acme/blog", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await?["error"], "not_found");

    let response = send(&app, Method::GET, "/v1/sites/acme/blog/operations", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let operations = json_body(response).await?;
    let kinds: Vec<&str> = operations
        .as_array()
        .map(|ops| ops.iter().filter_map(|op| op["kind"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(
        kinds,
        vec!["create", "create", "read", "update", "refresh", "destroy", "read"]
    );
    assert_eq!(operations[1]["outcome"]["result"], "already_exists");
    Ok(())
}

#[tokio::test]
async fn invalid_spec_lists_fields() -> Result<()> {
    let app = app();
    let body = json!({
        "project": "Acme!",
        "site": "blog",
        "content": "",
        "content404": "<h1>not here</h1>"
    });
    let response = send(&app, Method::POST, "/v1/sites", Some(body)).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await?;
    assert_eq!(body["error"], "invalid_spec");
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .map(|f| f.iter().filter_map(|e| e["field"].as_str()).collect())
        .unwrap_or_default();
    assert!(fields.contains(&"project"));
    assert!(fields.contains(&"content"));
    Ok(())
}

#[tokio::test]
async fn unknown_project_and_site_are_404() -> Result<()> {
    let app = app();
    let response = send(&app, Method::GET, "/v1/sites/acme", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    for method in [Method::GET, Method::DELETE] {
        let response = send(&app, method, "/v1/sites/acme/blog", None).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
    let response = send(&app, Method::POST, "/v1/sites/acme/blog/refresh", None).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn busy_site_is_409() -> Result<()> {
    let app = api::app(service(
        MemoryProvider::new().with_latency(Duration::from_millis(300)),
    ));

    let creating = {
        let app = app.clone();
        tokio::spawn(async move { send(&app, Method::POST, "/v1/sites", Some(blog())).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let response = send(&app, Method::DELETE, "/v1/sites/acme/blog", None).await?;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(response).await?["error"], "conflict");

    assert_eq!(creating.await??.status(), StatusCode::CREATED);
    Ok(())
}

#[tokio::test]
async fn storage_failures_do_not_leak_detail() -> Result<()> {
    let app = api::app(service_on(MemoryProvider::new(), Arc::new(BrokenStore)));

    let response = send(&app, Method::GET, "/v1/sites/acme/blog", None).await?;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = json_body(response).await?;
    assert_eq!(body["error"], "internal");
    assert_eq!(body["message"], "internal error");

    let response = send(&app, Method::GET, "/v1/sites/acme/blog/operations", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let operations = json_body(response).await?;
    assert_eq!(operations[0]["outcome"]["result"], "failed");
    assert_eq!(operations[0]["outcome"]["reason"], "internal error");
    let raw = operations.to_string();
    assert!(!raw.contains("password"));
    assert!(!raw.contains("db.internal"));
    Ok(())
}

#[tokio::test]
async fn openapi_document_is_served() -> Result<()> {
    let app = app();
    let response = send(&app, Method::GET, "/api-docs/openapi.json", None).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let doc = json_body(response).await?;
    assert!(doc["paths"]["/v1/sites/{project}/{site}"].is_object());
    Ok(())
}

#[tokio::test]
async fn serves_over_tcp() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(api::serve(listener, service(MemoryProvider::new())));

    let response = reqwest::get(format!("http://{addr}/health")).await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await?;
    assert_eq!(body["provider"], "memory");

    server.abort();
    Ok(())
}
