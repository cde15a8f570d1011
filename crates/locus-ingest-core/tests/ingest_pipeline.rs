use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use locus_backend::{BackendClient, TransportError};
use locus_config::{ApiKey, AppConfig, BackendConfig, ChunkFailurePolicy};
use locus_ingest_core::source::parse_jsonl_samples;
use locus_ingest_core::{ingest_batched, ingest_single, IngestError, Ingestor};
use serde_json::{json, Value};

const TEST_KEY: &str = "pipeline-key";

#[derive(Default)]
struct MockState {
    keys: Mutex<HashSet<(String, String)>>,
    batch_sizes: Mutex<Vec<usize>>,
    single_calls: Mutex<usize>,
    fail_batch_call: Option<usize>,
}

impl MockState {
    fn upsert(&self, row: &Value) -> &'static str {
        let key = (
            row["source"].as_str().unwrap_or_default().to_string(),
            row["external_id"].as_str().unwrap_or_default().to_string(),
        );
        if self.keys.lock().expect("keys lock").insert(key) {
            "inserted"
        } else {
            "updated"
        }
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == TEST_KEY)
}

async fn spawn_mock_backend(state: Arc<MockState>) -> String {
    async fn single(
        State(state): State<Arc<MockState>>,
        headers: HeaderMap,
        Json(row): Json<Value>,
    ) -> (StatusCode, String) {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, "invalid api key".to_string());
        }
        *state.single_calls.lock().expect("single lock") += 1;
        if row["type"] != "location.gps" {
            return (StatusCode::UNPROCESSABLE_ENTITY, "bad type".to_string());
        }
        let status = state.upsert(&row);
        (
            StatusCode::OK,
            json!({"id": row["external_id"], "status": status}).to_string(),
        )
    }

    async fn batch(
        State(state): State<Arc<MockState>>,
        headers: HeaderMap,
        Json(rows): Json<Vec<Value>>,
    ) -> (StatusCode, String) {
        if !authorized(&headers) {
            return (StatusCode::UNAUTHORIZED, "invalid api key".to_string());
        }
        let call = {
            let mut sizes = state.batch_sizes.lock().expect("batch lock");
            sizes.push(rows.len());
            sizes.len() - 1
        };
        if state.fail_batch_call == Some(call) {
            return (StatusCode::INTERNAL_SERVER_ERROR, "database is down".to_string());
        }

        let (mut inserted, mut updated) = (0, 0);
        for row in &rows {
            match state.upsert(row) {
                "inserted" => inserted += 1,
                _ => updated += 1,
            }
        }
        (
            StatusCode::OK,
            json!({"inserted": inserted, "updated": updated, "errors": 0}).to_string(),
        )
    }

    let app = Router::new()
        .route("/v1/entity", post(single))
        .route("/v1/entities/batch", post(batch))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test listener");
    let addr = listener.local_addr().expect("listener addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    format!("http://{}", addr)
}

fn test_config(url: String, batch_size: usize, policy: ChunkFailurePolicy) -> AppConfig {
    let mut cfg = AppConfig {
        backend: BackendConfig {
            url,
            credentials_file: String::new(),
            timeout_seconds: 5.0,
            dispatch_timeout_seconds: 5.0,
        },
        ..AppConfig::default()
    };
    cfg.ingest.batch_size = batch_size;
    cfg.ingest.chunk_failure_policy = policy;
    cfg
}

fn jsonl(count: usize) -> String {
    let mut out = String::new();
    for i in 0..count {
        out.push_str(
            &json!({
                "location": {
                    "timestamp": format!("2024-03-01 08:{:02}:{:02}.125", i / 60, i % 60),
                    "latitude": 34.0 + i as f64 / 1000.0,
                    "longitude": -118.2
                },
                "activity": "walking"
            })
            .to_string(),
        );
        out.push('\n');
    }
    out
}

#[tokio::test(flavor = "multi_thread")]
async fn batched_run_upserts_and_reingest_updates() {
    let state = Arc::new(MockState::default());
    let url = spawn_mock_backend(state.clone()).await;
    let cfg = test_config(url, 4, ChunkFailurePolicy::Abort);
    let ingestor = Ingestor::from_config(&cfg).expect("ingestor");
    let client = BackendClient::new(cfg.backend.clone(), ApiKey::new(TEST_KEY)).expect("client");

    let mut input = jsonl(10);
    input.push_str("{}\n{\"location\": {\"timestamp\": \"yesterday\", \"latitude\": 1, \"longitude\": 2}}\n");

    let first = ingest_batched(parse_jsonl_samples(&input), &ingestor, &client)
        .await
        .expect("first run");
    assert_eq!(first.built, 10);
    assert_eq!(first.skipped, 1);
    assert_eq!(first.build_errors, 1);
    assert_eq!(first.inserted, 10);
    assert_eq!(first.updated, 0);
    assert!(first.reconciles());
    assert_eq!(*state.batch_sizes.lock().unwrap(), vec![4, 4, 2]);

    let second = ingest_batched(parse_jsonl_samples(&input), &ingestor, &client)
        .await
        .expect("second run");
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 10);
}

#[tokio::test(flavor = "multi_thread")]
async fn batch_failure_aborts_and_keeps_prior_counts() {
    let state = Arc::new(MockState {
        fail_batch_call: Some(1),
        ..MockState::default()
    });
    let url = spawn_mock_backend(state.clone()).await;
    let cfg = test_config(url, 3, ChunkFailurePolicy::Abort);
    let ingestor = Ingestor::from_config(&cfg).expect("ingestor");
    let client = BackendClient::new(cfg.backend.clone(), ApiKey::new(TEST_KEY)).expect("client");

    let err = ingest_batched(parse_jsonl_samples(&jsonl(9)), &ingestor, &client)
        .await
        .expect_err("second chunk fails");

    let stats = err.partial_stats().copied().expect("partial stats");
    assert_eq!(stats.inserted, 3);
    assert_eq!(stats.flushed, 3);
    assert_eq!(*state.batch_sizes.lock().unwrap(), vec![3, 3]);

    let IngestError::Aborted { failure, .. } = err else {
        panic!("expected aborted run");
    };
    assert!(matches!(
        failure.source,
        TransportError::Status { status: 500, ref body } if body == "database is down"
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn single_item_run_rejected_key_is_counted_not_fatal() {
    let state = Arc::new(MockState::default());
    let url = spawn_mock_backend(state.clone()).await;
    let cfg = test_config(url, 500, ChunkFailurePolicy::Abort);
    let ingestor = Ingestor::from_config(&cfg).expect("ingestor");

    let good = BackendClient::new(cfg.backend.clone(), ApiKey::new(TEST_KEY)).expect("client");
    let stats = ingest_single(parse_jsonl_samples(&jsonl(3)), &ingestor, &good).await;
    assert_eq!(stats.inserted, 3);
    assert_eq!(*state.single_calls.lock().unwrap(), 3);

    let bad = BackendClient::new(cfg.backend.clone(), ApiKey::new("wrong")).expect("client");
    let stats = ingest_single(parse_jsonl_samples(&jsonl(2)), &ingestor, &bad).await;
    assert_eq!(stats.built, 2);
    assert_eq!(stats.dispatch_errors, 2);
    assert_eq!(stats.processed(), 0);
}
