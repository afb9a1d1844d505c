//! HTTP authority and webhook notifier against a local server.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tc_hash_chain::{
    ChainConfig, ChainError, HashChainApi, HashChainDependencies, HashChainService,
    InMemoryKVStore, ManualTimeSource, PublishOutcome, TimestampAuthority,
};
use tc_node::adapters::{HttpTimestampAuthority, WebhookNotifier};
use tc_node::AuthorityConfig;

#[derive(Debug, Clone)]
struct Captured {
    path: &'static str,
    authorization: Option<String>,
    body: Value,
}

type Captures = Arc<Mutex<Vec<Captured>>>;

fn capture(captures: &Captures, path: &'static str, headers: &HeaderMap, body: Value) {
    captures.lock().push(Captured {
        path,
        authorization: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
}

async fn spawn_server() -> (SocketAddr, Captures) {
    let captures: Captures = Arc::default();
    let app = Router::new()
        .route(
            "/anchor",
            post(|State(c): State<Captures>, headers: HeaderMap, Json(body): Json<Value>| async move {
                capture(&c, "/anchor", &headers, body);
                Json(json!({ "data": { "hash_string": "receipt-1" } }))
            }),
        )
        .route(
            "/broken",
            post(|State(c): State<Captures>, headers: HeaderMap, Json(body): Json<Value>| async move {
                capture(&c, "/broken", &headers, body);
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        )
        .route(
            "/mail",
            post(|State(c): State<Captures>, headers: HeaderMap, Json(body): Json<Value>| async move {
                capture(&c, "/mail", &headers, body);
                StatusCode::NO_CONTENT
            }),
        )
        .with_state(captures.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, captures)
}

fn authority_at(addr: SocketAddr, path: &str) -> HttpTimestampAuthority {
    HttpTimestampAuthority::new(
        AuthorityConfig {
            name: "OriginStamp".to_string(),
            url: format!("http://{}{}", addr, path),
            api_key: "secret-key".to_string(),
        },
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_authority_posts_digest_with_api_key() {
    let (addr, captures) = spawn_server().await;
    let authority = authority_at(addr, "/anchor");

    let receipt = authority.submit("ABCDEF").await.unwrap();

    assert_eq!(receipt.receipt_id.as_deref(), Some("receipt-1"));
    let seen = captures.lock().clone();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].authorization.as_deref(), Some("secret-key"));
    assert_eq!(seen[0].body, json!({ "hash": "ABCDEF" }));
}

#[tokio::test]
async fn test_authority_error_status_is_upstream_unavailable() {
    let (addr, _captures) = spawn_server().await;
    let authority = authority_at(addr, "/broken");

    let err = authority.submit("ABCDEF").await.unwrap_err();

    match err {
        ChainError::UpstreamUnavailable { service, reason } => {
            assert_eq!(service, "OriginStamp");
            assert!(reason.contains("500"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_authority_is_upstream_unavailable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = authority_at(addr, "/anchor").submit("ABCDEF").await.unwrap_err();
    assert!(matches!(err, ChainError::UpstreamUnavailable { .. }));
}

#[tokio::test]
async fn test_publish_over_http_sends_report_to_webhook() {
    let (addr, captures) = spawn_server().await;
    let notifier = WebhookNotifier::new(
        format!("http://{}/mail", addr),
        Some("ops@example.org".to_string()),
        true,
        Duration::from_secs(5),
    )
    .unwrap();

    let service = HashChainService::new(
        HashChainDependencies {
            kv_store: InMemoryKVStore::new(),
            time_source: ManualTimeSource::new(1_704_067_200),
            notifier: Arc::new(notifier),
        },
        ChainConfig::default(),
    )
    .with_authority(Arc::new(authority_at(addr, "/anchor")));

    service.submit("AAAA").await.unwrap();
    service.submit("BBBB").await.unwrap();
    service.process_pending().await.unwrap();
    let outcome = service.publish_tip("OriginStamp").await.unwrap();
    assert_eq!(outcome, PublishOutcome::Published { position: 2 });

    let status = service.status().await.unwrap();
    let seen = captures.lock().clone();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].path, "/anchor");
    assert_eq!(seen[0].body["hash"].as_str(), status.tip_digest.as_deref());

    let mail = &seen[1];
    assert_eq!(mail.path, "/mail");
    assert_eq!(mail.body["to"], "ops@example.org");
    assert!(mail.body["subject"].as_str().is_some());
    assert_eq!(mail.body["report"]["anchoredPosition"], 2);
    assert_eq!(mail.body["report"]["lines"].as_array().map(Vec::len), Some(2));
}
