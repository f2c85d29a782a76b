use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderValue, Method, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use sibyl_core::agents::{AgentError, SqlAuthor, SqlExecutor, TableSelector};
use sibyl_core::catalog::{Catalog, TableSchema};
use sibyl_core::resolver::QueryResolver;
use sibyl_core::response::{ExecutionResult, Scalar};
use sibyl_core::store::MemoryStore;
use sibyl_core::validate::{AllowedTableSet, SafeSql};
use sibyl_server::config::ServerConfig;
use sibyl_server::http;
use sibyl_server::metrics::Metrics;
use sibyl_server::server::ServerState;

struct StubSelector {
    tables: Vec<String>,
    empty_first: AtomicBool,
}

#[async_trait]
impl TableSelector for StubSelector {
    async fn select(&self, _question: &str, _top_k: usize) -> Result<Vec<String>, AgentError> {
        if self.empty_first.swap(false, Ordering::SeqCst) {
            return Ok(Vec::new());
        }
        Ok(self.tables.clone())
    }
}

struct StubAuthor {
    sql: String,
}

#[async_trait]
impl SqlAuthor for StubAuthor {
    async fn author(
        &self,
        _question: &str,
        _allowed: &AllowedTableSet,
        _schema_context: &str,
    ) -> Result<String, AgentError> {
        Ok(self.sql.clone())
    }

    async fn repair(
        &self,
        _bad_sql: &str,
        _allowed: &AllowedTableSet,
        _schema_context: &str,
    ) -> Result<Option<String>, AgentError> {
        Ok(None)
    }
}

struct StubExecutor;

#[async_trait]
impl SqlExecutor for StubExecutor {
    async fn execute(&self, _sql: &SafeSql) -> Result<ExecutionResult, AgentError> {
        Ok(ExecutionResult::new(
            vec!["count".to_string()],
            vec![vec![Scalar::Int(12)]],
        ))
    }
}

fn catalog() -> Arc<Catalog> {
    Arc::new(
        Catalog::new(vec![
            TableSchema::new("orders", vec!["id", "amount"]),
            TableSchema::new("customers", vec!["id", "name"]),
        ])
        .unwrap(),
    )
}

fn build_state(configured: bool, empty_selection_first: bool) -> Arc<ServerState> {
    let config = ServerConfig::default();
    let catalog = catalog();
    let store = Arc::new(MemoryStore::new());
    let resolver = configured.then(|| {
        Arc::new(QueryResolver::new(
            catalog.clone(),
            Arc::new(StubSelector {
                tables: vec!["orders".to_string()],
                empty_first: AtomicBool::new(empty_selection_first),
            }),
            Arc::new(StubAuthor {
                sql: "SELECT COUNT(*) FROM orders".to_string(),
            }),
            Arc::new(StubExecutor),
            store.clone(),
        ))
    });
    let metrics = Metrics::new().expect("metrics");
    Arc::new(ServerState {
        config,
        catalog,
        store,
        resolver,
        metrics,
    })
}

async fn send_json(
    router: axum::Router,
    method: Method,
    path: &str,
    body: Value,
    headers: &[(&str, &str)],
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut request = Request::builder()
        .method(method)
        .uri(path)
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request");
    for (name, value) in headers {
        let header_name = axum::http::HeaderName::from_bytes(name.as_bytes()).expect("header name");
        request.headers_mut().insert(
            header_name,
            HeaderValue::from_str(value).expect("header value"),
        );
    }
    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, headers, value)
}

async fn send_empty(
    router: axum::Router,
    method: Method,
    path: &str,
) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let request = Request::builder()
        .method(method)
        .uri(path)
        .body(Body::empty())
        .expect("request");
    let response = router.oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = hyper::body::to_bytes(response.into_body())
        .await
        .expect("body");
    (status, headers, body.to_vec())
}

#[tokio::test]
async fn liveness_reports_running() {
    let state = build_state(true, false);
    let router = http::router(state);
    let (status, _, body) = send_empty(router, Method::GET, "/").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({"status": "running"})
    );
}

#[tokio::test]
async fn ask_answers_via_rule_engine() {
    let state = build_state(true, false);
    let router = http::router(state);
    let (status, _, body) = send_json(
        router,
        Method::POST,
        "/ask",
        json!({"question": "how many orders"}),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["source"], "rule_engine");
    assert_eq!(body["sql_used"], "SELECT COUNT(*) FROM orders LIMIT 1000;");
    assert_eq!(body["answer"]["type"], "text");
    assert_eq!(body["answer"]["message"], "The result is 12.");
}

#[tokio::test]
async fn ask_serves_repeat_questions_from_cache() {
    let state = build_state(true, false);
    let router = http::router(state);
    let (_, _, first) = send_json(
        router.clone(),
        Method::POST,
        "/ask",
        json!({"question": "how many orders"}),
        &[],
    )
    .await;
    assert_eq!(first["source"], "rule_engine");

    let (status, _, second) = send_json(
        router,
        Method::POST,
        "/ask",
        json!({"question": "How Many Orders"}),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(second["source"], "cache");
    assert_eq!(second["answer"]["message"], "The result is 12.");
    assert!(second.get("sql_used").is_none());
}

#[tokio::test]
async fn ask_without_question_is_a_business_error() {
    let state = build_state(true, false);
    let router = http::router(state);
    let (status, _, body) = send_json(router, Method::POST, "/ask", json!({}), &[]).await;
    // The API never raises transport-level failures for business errors.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "Question is required");
}

#[tokio::test]
async fn ask_reports_agent_not_configured() {
    let state = build_state(false, false);
    let router = http::router(state);
    let (status, _, body) = send_json(
        router,
        Method::POST,
        "/ask",
        json!({"question": "weekly revenue"}),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"], "agent not configured");
    assert_eq!(body["source"], "agent_not_configured");
}

#[tokio::test]
async fn clarify_then_followup_round_trip() {
    let state = build_state(true, true);
    let router = http::router(state);

    let (status, _, clarify) = send_json(
        router.clone(),
        Method::POST,
        "/ask",
        json!({"question": "numbers please"}),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(clarify["clarify"], true);
    assert_eq!(clarify["source"], "deep_agent");
    assert_eq!(clarify["options"], json!(["orders", "customers"]));
    let conversation_id = clarify["conversation_id"].as_str().unwrap().to_string();

    let (status, _, answer) = send_json(
        router,
        Method::POST,
        "/ask",
        json!({
            "question": "numbers please",
            "conversation_id": conversation_id,
            "followup": "orders"
        }),
        &[],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answer["source"], "deep_agent");
    assert_eq!(answer["tables_used"], json!(["orders"]));
    assert_eq!(answer["answer"]["message"], "The result is 12.");
}

#[tokio::test]
async fn correlation_id_header_is_echoed() {
    let state = build_state(true, false);
    let router = http::router(state);
    let (_, headers, _) = send_json(
        router,
        Method::POST,
        "/ask",
        json!({"question": "how many orders"}),
        &[("x-correlation-id", "test-correlation-42")],
    )
    .await;
    assert_eq!(
        headers.get("x-correlation-id").unwrap(),
        "test-correlation-42"
    );
}

#[tokio::test]
async fn admin_healthz_status_and_metrics() {
    let state = build_state(true, false);

    // Drive one question through the API so the counters move.
    let api = http::router(state.clone());
    let _ = send_json(
        api,
        Method::POST,
        "/ask",
        json!({"question": "how many orders"}),
        &[],
    )
    .await;

    let admin = http::admin_router(state);
    let (status, _, _) = send_empty(admin.clone(), Method::GET, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, body) = send_empty(admin.clone(), Method::GET, "/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        serde_json::from_slice::<Value>(&body).unwrap(),
        json!({"status": "ok"})
    );

    let (status, _, body) = send_empty(admin, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("question_count"));
}

#[tokio::test]
async fn metrics_endpoint_disabled_by_config() {
    let mut config = ServerConfig::default();
    config.metrics_enabled = false;
    let catalog = catalog();
    let state = Arc::new(ServerState {
        config,
        catalog,
        store: Arc::new(MemoryStore::new()),
        resolver: None,
        metrics: Metrics::new().expect("metrics"),
    });
    let admin = http::admin_router(state);
    let (status, _, _) = send_empty(admin, Method::GET, "/metrics").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
