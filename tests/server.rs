//! HTTP API tests: the router is served on an ephemeral port and driven
//! with a real client, entirely in mock mode.

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::{json, Value};

use adaptive_rag::capability::CapabilityState;
use adaptive_rag::config::{Config, Credentials};
use adaptive_rag::orchestrator::Orchestrator;
use adaptive_rag::server::{build_router, AppState};

async fn spawn_server() -> SocketAddr {
    let orchestrator = Orchestrator::with_capabilities(
        &Config::default(),
        &Credentials::default(),
        CapabilityState::all_mock(),
    )
    .unwrap();
    let app = build_router(AppState::new(Arc::new(orchestrator), "test"));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn test_health_reports_mock_mode() {
    let addr = spawn_server().await;
    let resp = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);

    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "test");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    let mock_mode = body["mock_mode"].as_object().unwrap();
    assert!(!mock_mode.is_empty());
    assert!(mock_mode.values().all(|v| v == true));
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_query_and_analytics() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/v1/query", addr))
        .json(&json!({ "query": "What are the types of agent memory?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["source"], "vector");
    assert_eq!(body["mock"], true);
    assert!(body["id"].as_str().unwrap().starts_with("query-"));
    assert!(!body["sources"].as_array().unwrap().is_empty());

    let resp = client
        .post(format!("http://{}/api/v1/query", addr))
        .json(&json!({
            "query": "Who is Elon Musk?",
            "source": "wikipedia",
            "options": { "top_k": 1 }
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["routing_reason"], "explicit source requested: wikipedia");
    assert_eq!(body["sources"].as_array().unwrap().len(), 1);

    let analytics: Value = client
        .get(format!("http://{}/api/v1/analytics", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(analytics["total_queries"], 2);
    assert_eq!(analytics["errors"], 0);
    assert_eq!(analytics["by_source"]["vector"], 1);
    assert_eq!(analytics["by_source"]["wikipedia"], 1);
    assert_eq!(analytics["recent"][0]["query"], "Who is Elon Musk?");
}

#[tokio::test]
async fn test_validation_errors_use_envelope() {
    let addr = spawn_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("http://{}/api/v1/query", addr))
        .json(&json!({ "query": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "validation_error");
    assert_eq!(body["error"]["message"], "query must not be empty");

    let resp = client
        .post(format!("http://{}/api/v1/query", addr))
        .json(&json!({ "query": "agent memory", "source": "library" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 422);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], "validation_error");

    let analytics: Value = client
        .get(format!("http://{}/api/v1/analytics", addr))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    // Malformed bodies never reach the orchestrator.
    assert_eq!(analytics["total_queries"], 1);
    assert_eq!(analytics["errors"], 1);
}
