#![allow(clippy::unwrap_used)]

//! Broker API tests driving the full router in process.

use std::collections::HashMap;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tower::ServiceExt;

use credbroker_core::model::FULL_ACCESS;
use credbroker_core::vault::{CredentialVault, MemoryVault};
use credbroker_server::config::ServerConfig;
use credbroker_server::routes::build_router;
use credbroker_server::state::AppState;
use credbroker_storage::MemoryBackend;

struct Harness {
    app: Router,
    state: Arc<AppState>,
    vault: Arc<MemoryVault>,
}

async fn harness() -> Harness {
    let vars: HashMap<&str, &str> = HashMap::from([
        ("BROKER_SERVICE_ID", "svc-id"),
        ("BROKER_PLAN_ID", "plan-id"),
        ("BROKER_BASE_URL", "https://broker.example.com"),
        ("BROKER_ADMIN_PASSWORD", "hunter2"),
    ]);
    let config = ServerConfig::from_lookup(|key| vars.get(key).map(|v| (*v).to_owned()));

    let vault = Arc::new(MemoryVault::new());
    let state = Arc::new(AppState::new(
        &config,
        Arc::new(MemoryBackend::new()),
        Arc::clone(&vault) as Arc<dyn CredentialVault>,
    ));
    assert!(state.users.initialize_users().await.unwrap());

    Harness {
        app: build_router(Arc::clone(&state)),
        state,
        vault,
    }
}

fn basic(username: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
}

fn broker_request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, basic("admin", "hunter2"))
        .header("X-Broker-API-Version", "2.14");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn bind_body(app_guid: &str) -> Value {
    json!({
        "service_id": "svc-id",
        "plan_id": "plan-id",
        "bind_resource": {"app_guid": app_guid},
        "parameters": {"purpose": "test"}
    })
}

#[tokio::test]
async fn health_and_usage_need_no_credentials() {
    let h = harness().await;

    let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "UP");

    let req = Request::builder().uri("/b-42").body(Body::empty()).unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], "b-42");
    assert_eq!(
        body["create-service"],
        "cf create-service credentialstore standard credhub-svc"
    );
    assert_eq!(body["bind-service"], "cf bind-service credhub-client credhub-svc");
}

#[tokio::test]
async fn broker_api_requires_admin_basic_auth() {
    let h = harness().await;

    let req = Request::builder()
        .uri("/v2/catalog")
        .header("X-Broker-API-Version", "2.14")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let req = Request::builder()
        .uri("/v2/catalog")
        .header("X-Broker-API-Version", "2.14")
        .header(header::AUTHORIZATION, basic("admin", "wrong"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");

    // A binding user is valid but lacks ADMIN.
    let user = h
        .state
        .users
        .create_user("b-1", &[FULL_ACCESS])
        .await
        .unwrap();
    let req = Request::builder()
        .uri("/v2/catalog")
        .header("X-Broker-API-Version", "2.14")
        .header(header::AUTHORIZATION, basic(&user.username, &user.password))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn broker_api_requires_version_header() {
    let h = harness().await;

    let req = Request::builder()
        .uri("/v2/catalog")
        .header(header::AUTHORIZATION, basic("admin", "hunter2"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&h.app, req).await;
    assert_eq!(status, StatusCode::PRECONDITION_FAILED);
}

#[tokio::test]
async fn catalog_lists_configured_offering() {
    let h = harness().await;

    let (status, body) = send(&h.app, broker_request("GET", "/v2/catalog", None)).await;
    assert_eq!(status, StatusCode::OK);

    let service = &body["services"][0];
    assert_eq!(service["id"], "svc-id");
    assert_eq!(service["name"], "credentialstore");
    assert_eq!(service["bindable"], true);
    assert_eq!(service["plans"][0]["id"], "plan-id");
    assert_eq!(service["plans"][0]["name"], "standard");
    assert_eq!(service["plans"][0]["free"], true);
}

#[tokio::test]
async fn provision_fetch_and_deprovision_instance() {
    let h = harness().await;
    let provision = json!({"service_id": "svc-id", "plan_id": "plan-id", "parameters": {"a": 1}});

    let (status, _) = send(
        &h.app,
        broker_request("PUT", "/v2/service_instances/i-1", Some(provision.clone())),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        &h.app,
        broker_request("PUT", "/v2/service_instances/i-1", Some(provision)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) =
        send(&h.app, broker_request("GET", "/v2/service_instances/i-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service_id"], "svc-id");
    assert_eq!(body["parameters"]["a"], 1);

    let (status, body) =
        send(&h.app, broker_request("DELETE", "/v2/service_instances/i-1", None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));

    let (status, _) =
        send(&h.app, broker_request("DELETE", "/v2/service_instances/i-1", None)).await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) =
        send(&h.app, broker_request("GET", "/v2/service_instances/i-1", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bind_returns_reference_and_unbind_cleans_up() {
    let h = harness().await;
    let uri = "/v2/service_instances/i-1/service_bindings/b-1";

    let (status, body) = send(&h.app, broker_request("PUT", uri, Some(bind_body("app-1")))).await;
    assert_eq!(status, StatusCode::CREATED);
    let credentials = body["credentials"].as_object().unwrap();
    assert_eq!(credentials.len(), 1);
    assert_eq!(credentials["credhub-ref"], "/c/i-1/plan-id/b-1/b-1");
    assert!(!body.to_string().contains("password"));
    assert_eq!(h.vault.len().await, 1);

    let (status, again) = send(&h.app, broker_request("PUT", uri, Some(bind_body("app-1")))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["credentials"], body["credentials"]);
    assert_eq!(h.vault.len().await, 1);

    let (status, fetched) = send(&h.app, broker_request("GET", uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["credentials"], body["credentials"]);
    assert_eq!(fetched["parameters"]["purpose"], "test");

    let unbind = format!("{uri}?service_id=svc-id&plan_id=plan-id");
    let (status, _) = send(&h.app, broker_request("DELETE", &unbind, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(h.vault.is_empty().await);
    assert!(h.state.users.find_by_username("b-1").await.unwrap().is_none());

    let (status, _) = send(&h.app, broker_request("DELETE", &unbind, None)).await;
    assert_eq!(status, StatusCode::GONE);

    let (status, _) = send(&h.app, broker_request("GET", uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn bind_named_after_admin_conflicts_and_keeps_admin() {
    let h = harness().await;
    let uri = "/v2/service_instances/i-1/service_bindings/admin";

    let (status, body) = send(&h.app, broker_request("PUT", uri, Some(bind_body("app-1")))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Conflict");
    assert!(h.vault.is_empty().await);

    // The admin still authenticates afterwards.
    let (status, _) = send(&h.app, broker_request("GET", "/v2/catalog", None)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bind_without_app_guid_is_bad_request() {
    let h = harness().await;
    let uri = "/v2/service_instances/i-1/service_bindings/b-1";

    let body = json!({"service_id": "svc-id", "plan_id": "plan-id"});
    let (status, body) = send(&h.app, broker_request("PUT", uri, Some(body))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "BadRequest");
    assert!(h.vault.is_empty().await);
}

#[tokio::test]
async fn unbind_without_plan_id_is_bad_request() {
    let h = harness().await;
    let uri = "/v2/service_instances/i-1/service_bindings/b-1?service_id=svc-id";

    let (status, _) = send(&h.app, broker_request("DELETE", uri, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn vault_outage_surfaces_as_internal_error() {
    let h = harness().await;
    h.vault.set_unavailable(true);

    let uri = "/v2/service_instances/i-1/service_bindings/b-1";
    let (status, body) = send(&h.app, broker_request("PUT", uri, Some(bind_body("app-1")))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "InternalError");

    let (status, _) = send(&h.app, broker_request("GET", uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
