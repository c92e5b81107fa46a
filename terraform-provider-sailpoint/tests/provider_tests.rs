//! End-to-end tests for the SailPoint provider
//!
//! Each test drives the provider through `handle_request` against a fake
//! Identity Security Cloud API served by axum on an ephemeral port.
//!
//! Run with: cargo test --test provider_tests

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use terraform_provider_sailpoint::client::{ClientConfig, SailPointClient};
use terraform_provider_sailpoint::SailPointProvider;

const CLIENT_ID: &str = "test-client";
const CLIENT_SECRET: &str = "test-secret";
const ACCESS_TOKEN: &str = "token-1";
const TOTAL_CLUSTERS: usize = 260;

struct FakeTenant {
    total_clusters: usize,
    expires_in: i64,
    token_status: StatusCode,
    token_requests: AtomicUsize,
    experimental_seen: AtomicBool,
    list_queries: Mutex<Vec<HashMap<String, String>>>,
}

impl Default for FakeTenant {
    fn default() -> Self {
        Self {
            total_clusters: TOTAL_CLUSTERS,
            expires_in: 749,
            token_status: StatusCode::OK,
            token_requests: AtomicUsize::new(0),
            experimental_seen: AtomicBool::new(false),
            list_queries: Mutex::new(Vec::new()),
        }
    }
}

fn cluster_json(id: &str) -> Value {
    json!({
        "id": id,
        "name": format!("Cluster {}", id),
        "pod": "megapod-useast1",
        "org": "denali",
        "type": "idn",
        "configuration": { "clusterExternalId": id },
        "keyPair": { "publicKeyThumbprint": "6CMlaJIV44-xJxcB3CJBjDUUn54" },
        "attributes": { "queue": { "name": "queue-1533", "region": "us-east-1" } },
        "redis": { "redisHost": "redis.cloud.sailpoint.com", "redisPort": 6379 },
        "clientType": "CCG",
        "ccgVersion": "v01",
        "pinnedConfig": false,
        "operational": true,
        "status": "NORMAL",
        "clientIds": ["1244"],
        "serviceCount": 2,
        "ccId": "1533",
        "createdAt": "2023-08-04T20:48:01.865Z"
    })
}

fn authorized(tenant: &FakeTenant, headers: &HeaderMap) -> bool {
    if headers.get("x-sailpoint-experimental").is_some() {
        tenant.experimental_seen.store(true, Ordering::SeqCst);
    }
    headers.get("authorization").and_then(|v| v.to_str().ok())
        == Some(&format!("Bearer {}", ACCESS_TOKEN)[..])
}

async fn issue_token(
    State(tenant): State<Arc<FakeTenant>>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    tenant.token_requests.fetch_add(1, Ordering::SeqCst);

    if tenant.token_status != StatusCode::OK {
        return (
            tenant.token_status,
            Json(json!({ "error": "invalid_request", "error_description": "Rejected" })),
        )
            .into_response();
    }

    let valid = form.get("grant_type").map(String::as_str) == Some("client_credentials")
        && form.get("client_id").map(String::as_str) == Some(CLIENT_ID)
        && form.get("client_secret").map(String::as_str) == Some(CLIENT_SECRET);

    if !valid {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "unauthorized", "error_description": "Bad credentials" })),
        )
            .into_response();
    }

    Json(json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "bearer",
        "expires_in": tenant.expires_in
    }))
    .into_response()
}

async fn get_cluster(
    State(tenant): State<Arc<FakeTenant>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !authorized(&tenant, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id == "no-id" {
        return Json(json!({ "name": "no id in body" })).into_response();
    }
    if id == "missing" {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "detailCode": "404 Not found", "messages": [{ "text": "The managed cluster was not found." }] })),
        )
            .into_response();
    }
    Json(cluster_json(&id)).into_response()
}

async fn list_clusters(
    State(tenant): State<Arc<FakeTenant>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !authorized(&tenant, &headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    tenant.list_queries.lock().unwrap().push(query.clone());

    if query.get("filters").map(String::as_str) == Some("name eq \"none\"") {
        return Json(json!([])).into_response();
    }

    let offset: usize = query.get("offset").and_then(|v| v.parse().ok()).unwrap_or(0);
    let limit: usize = query.get("limit").and_then(|v| v.parse().ok()).unwrap_or(250);
    let page: Vec<Value> = (offset..(offset + limit).min(tenant.total_clusters))
        .map(|i| cluster_json(&format!("cluster-{}", i)))
        .collect();

    Json(Value::Array(page)).into_response()
}

/// Start the fake tenant on its own runtime thread
fn start_tenant() -> (SocketAddr, Arc<FakeTenant>) {
    start_tenant_with(FakeTenant::default())
}

fn start_tenant_with(tenant: FakeTenant) -> (SocketAddr, Arc<FakeTenant>) {
    let tenant = Arc::new(tenant);
    let app = Router::new()
        .route("/oauth/token", post(issue_token))
        .route("/v2025/managed-clusters", get(list_clusters))
        .route("/v2025/managed-clusters/:id", get(get_cluster))
        .with_state(tenant.clone());

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Runtime::new().expect("Failed to create runtime");
        runtime.block_on(async move {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                .await
                .expect("Failed to bind fake tenant");
            tx.send(listener.local_addr().expect("No local address"))
                .expect("Failed to report address");
            axum::serve(listener, app).await.expect("Fake tenant failed");
        });
    });

    (rx.recv().expect("Fake tenant did not start"), tenant)
}

fn call(provider: &SailPointProvider, method: &str, params: Value) -> Value {
    let request = json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params });
    let response = provider.handle_request(&request.to_string());
    serde_json::from_str(&response).expect("Response is not JSON")
}

fn configured_provider(addr: SocketAddr, secret: &str, experimental: bool) -> SailPointProvider {
    let provider = SailPointProvider::new().expect("Failed to create provider");
    let response = call(
        &provider,
        "ConfigureProvider",
        json!({
            "config": {
                "base_url": format!("http://{}", addr),
                "client_id": CLIENT_ID,
                "client_secret": secret,
                "experimental": experimental
            }
        }),
    );
    assert_eq!(response["result"]["diagnostics"], json!([]), "configure failed: {}", response);
    provider
}

#[test]
fn test_read_managed_cluster() {
    let (addr, _tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "abc123" } }),
    );

    let state = &response["result"]["state"];
    assert_eq!(response["result"]["diagnostics"], json!([]));
    assert_eq!(state["id"], "abc123");
    assert_eq!(state["name"], "Cluster abc123");
    assert_eq!(state["client_type"], "CCG");
    assert_eq!(state["operational"], true);
    assert_eq!(state["service_count"], 2);
    assert_eq!(state["created_at"], "2023-08-04T20:48:01.865Z");
    assert_eq!(state["updated_at"], "");
    assert_eq!(state["description"], "");
    assert_eq!(state["configuration"], json!({ "clusterExternalId": "abc123" }));
    assert_eq!(state["key_pair"]["public_key"], Value::Null);
    assert_eq!(state["attributes"]["queue"]["region"], "us-east-1");
    assert_eq!(state["attributes"]["key_store"], Value::Null);
    assert_eq!(state["redis"]["redis_port"], 6379);
    assert_eq!(state["encryption_configuration"], json!({ "format": null }));
}

#[test]
fn test_read_keeps_configured_id() {
    let (addr, _tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "no-id" } }),
    );

    let state = &response["result"]["state"];
    assert_eq!(state["id"], "no-id");
    assert_eq!(state["name"], "no id in body");
}

#[test]
fn test_read_missing_managed_cluster() {
    let (addr, _tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "missing" } }),
    );

    let diagnostics = &response["result"]["diagnostics"];
    assert_eq!(diagnostics[0]["summary"], "Unable to Read Managed Cluster");
    assert!(diagnostics[0]["detail"]
        .as_str()
        .unwrap()
        .contains("Resource not found"));
    assert!(response["result"].get("state").is_none());
}

#[test]
fn test_read_with_empty_id() {
    let (addr, tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "" } }),
    );

    assert_eq!(response["result"]["diagnostics"][0]["detail"], "ID cannot be empty");
    assert_eq!(tenant.token_requests.load(Ordering::SeqCst), 0);
}

#[test]
fn test_list_managed_clusters_paginates() {
    let (addr, tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_clusters", "config": { "filters": null } }),
    );

    let state = &response["result"]["state"];
    let clusters = state["managed_clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), TOTAL_CLUSTERS);
    assert_eq!(clusters[0]["id"], "cluster-0");
    assert_eq!(clusters[TOTAL_CLUSTERS - 1]["id"], "cluster-259");
    assert_eq!(state["filters"], Value::Null);

    let queries = tenant.list_queries.lock().unwrap();
    assert_eq!(queries.len(), 2);
    assert_eq!(queries[0]["offset"], "0");
    assert_eq!(queries[1]["offset"], "250");
    assert_eq!(queries[1]["limit"], "250");
    assert!(!queries[0].contains_key("filters"));
}

#[test]
fn test_list_managed_clusters_full_last_page() {
    let (addr, tenant) = start_tenant_with(FakeTenant {
        total_clusters: 500,
        ..Default::default()
    });
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_clusters", "config": {} }),
    );

    let clusters = response["result"]["state"]["managed_clusters"].as_array().unwrap();
    assert_eq!(clusters.len(), 500);

    let queries = tenant.list_queries.lock().unwrap();
    let offsets: Vec<&str> = queries.iter().map(|q| q["offset"].as_str()).collect();
    assert_eq!(offsets, vec!["0", "250", "500"]);
}

#[tokio::test]
async fn test_list_managed_clusters_stops_at_item_cap() {
    let (addr, tenant) = start_tenant_with(FakeTenant {
        total_clusters: 100,
        ..Default::default()
    });
    let client = SailPointClient::new(ClientConfig {
        base_url: format!("http://{}", addr),
        client_id: CLIENT_ID.to_string(),
        client_secret: CLIENT_SECRET.to_string(),
        experimental: false,
    })
    .expect("Failed to create client")
    .with_pagination(10, 25);

    let clusters = client.list_managed_clusters(None).await.expect("Listing failed");

    assert_eq!(clusters.len(), 25);
    assert_eq!(clusters[24].id.as_deref(), Some("cluster-24"));
    assert_eq!(tenant.list_queries.lock().unwrap().len(), 3);
}

#[test]
fn test_list_managed_clusters_with_filters() {
    let (addr, tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_clusters", "config": { "filters": "name eq \"none\"" } }),
    );

    let state = &response["result"]["state"];
    assert_eq!(state["managed_clusters"], json!([]));
    assert_eq!(state["filters"], "name eq \"none\"");
    assert_eq!(
        tenant.list_queries.lock().unwrap()[0]["filters"],
        "name eq \"none\""
    );
}

#[test]
fn test_access_token_is_reused() {
    let (addr, tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    for id in ["a", "b", "c"] {
        let response = call(
            &provider,
            "ReadDataSource",
            json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": id } }),
        );
        assert_eq!(response["result"]["state"]["id"], id);
    }

    assert_eq!(tenant.token_requests.load(Ordering::SeqCst), 1);
    assert!(!tenant.experimental_seen.load(Ordering::SeqCst));
}

#[test]
fn test_short_lived_token_is_refreshed() {
    let (addr, tenant) = start_tenant_with(FakeTenant {
        expires_in: 30,
        ..Default::default()
    });
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    for id in ["a", "b"] {
        let response = call(
            &provider,
            "ReadDataSource",
            json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": id } }),
        );
        assert_eq!(response["result"]["state"]["id"], id);
    }

    assert_eq!(tenant.token_requests.load(Ordering::SeqCst), 2);
}

#[test]
fn test_oversized_token_lifetime() {
    let (addr, tenant) = start_tenant_with(FakeTenant {
        expires_in: i64::MAX,
        ..Default::default()
    });
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "abc" } }),
    );

    assert_eq!(response["result"]["state"]["id"], "abc");
    assert_eq!(tenant.token_requests.load(Ordering::SeqCst), 1);
}

#[test]
fn test_token_endpoint_bad_request() {
    let (addr, _tenant) = start_tenant_with(FakeTenant {
        token_status: StatusCode::BAD_REQUEST,
        ..Default::default()
    });
    let provider = configured_provider(addr, CLIENT_SECRET, false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "abc" } }),
    );

    let diagnostic = &response["result"]["diagnostics"][0];
    assert_eq!(diagnostic["summary"], "Unable to Read Managed Cluster");
    assert!(diagnostic["detail"]
        .as_str()
        .unwrap()
        .starts_with("Authentication failed"));
}

#[test]
fn test_experimental_header_sent() {
    let (addr, tenant) = start_tenant();
    let provider = configured_provider(addr, CLIENT_SECRET, true);

    call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_cluster", "config": { "id": "abc" } }),
    );

    assert!(tenant.experimental_seen.load(Ordering::SeqCst));
}

#[test]
fn test_bad_credentials() {
    let (addr, _tenant) = start_tenant();
    let provider = configured_provider(addr, "wrong-secret", false);

    let response = call(
        &provider,
        "ReadDataSource",
        json!({ "type_name": "sailpoint_managed_clusters", "config": {} }),
    );

    let diagnostic = &response["result"]["diagnostics"][0];
    assert_eq!(diagnostic["summary"], "Unable to Read Managed Clusters");
    assert!(diagnostic["detail"]
        .as_str()
        .unwrap()
        .starts_with("Authentication failed"));
}

#[test]
fn test_configure_with_unknown_values() {
    let provider = SailPointProvider::new().expect("Failed to create provider");

    let response = call(
        &provider,
        "ConfigureProvider",
        json!({
            "config": {
                "base_url": terraform_provider_sailpoint::schema::UNKNOWN_VALUE,
                "client_id": CLIENT_ID,
                "client_secret": CLIENT_SECRET
            }
        }),
    );

    let diagnostics = response["result"]["diagnostics"].as_array().unwrap();
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0]["summary"], "Unknown SailPoint API Base URL");
    assert_eq!(diagnostics[0]["attribute"], json!(["base_url"]));
}

#[test]
fn test_schema_lists_data_sources() {
    let provider = SailPointProvider::new().expect("Failed to create provider");
    let response = call(&provider, "GetProviderSchema", json!({}));

    let schemas = &response["result"]["data_source_schemas"];
    assert_eq!(
        schemas["sailpoint_managed_cluster"]["block"]["attributes"]["id"]["required"],
        true
    );
    assert_eq!(
        schemas["sailpoint_managed_clusters"]["block"]["attributes"]["filters"]["optional"],
        true
    );
    assert_eq!(response["result"]["resource_schemas"], json!({}));
}
