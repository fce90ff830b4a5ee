//! Round-trip tests for the catalog and counter clients against an
//! in-process HTTP backend.

use axum::extract::{Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use signage_proto::catalog::{CatalogClient, Orientation};
use signage_proto::counter::{CounterClient, CounterMode, TelemetryError};
use signage_proto::queue::{self, OrientationSelector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

/// Bind an ephemeral port, serve the router, return the base URL.
async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

// ── catalog ───────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct CatalogState {
    seen_filter: Arc<Mutex<Option<String>>>,
    body: Arc<Mutex<Value>>,
}

async fn catalog_handler(
    State(state): State<CatalogState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    *state.seen_filter.lock().unwrap() = params.get("filter_code").cloned();
    Json(state.body.lock().unwrap().clone())
}

#[tokio::test]
async fn catalog_fetch_object_envelope_and_filter_code() {
    let state = CatalogState {
        seen_filter: Arc::new(Mutex::new(None)),
        body: Arc::new(Mutex::new(json!({
            "videos": [
                { "id": 1, "url": "http://media/a.mp4", "orientation": "landscape" },
                { "id": 2, "url": "http://media/b.mp4", "orientation": "portrait" },
                { "id": 3, "url": "http://media/c.mp4" }
            ]
        }))),
    };
    let app = Router::new()
        .route("/videos", get(catalog_handler))
        .with_state(state.clone());
    let base = serve(app).await;

    let client = CatalogClient::new(reqwest::Client::new(), base);
    let snapshot = client.fetch(Some(42)).await;

    assert!(snapshot.ok);
    assert_eq!(snapshot.records.len(), 3);
    assert_eq!(state.seen_filter.lock().unwrap().as_deref(), Some("42"));

    // End to end: the landscape selector keeps landscape + unspecified.
    let q = queue::build(&snapshot.records, OrientationSelector::Landscape);
    let ids: Vec<i64> = q.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3]);
    assert_eq!(q.get(1).unwrap().orientation, Orientation::Unspecified);
}

#[tokio::test]
async fn catalog_fetch_bare_array_drops_invalid_records() {
    let state = CatalogState {
        seen_filter: Arc::new(Mutex::new(None)),
        body: Arc::new(Mutex::new(json!([
            { "id": 1, "url": "http://media/a.mp4" },
            { "id": 2 },
            { "id": 0, "url": "http://media/zero.mp4" },
            { "id": 3, "url": "http://media/c.mp4" }
        ]))),
    };
    let app = Router::new()
        .route("/videos", get(catalog_handler))
        .with_state(state.clone());
    let base = serve(app).await;

    let client = CatalogClient::new(reqwest::Client::new(), base);
    let snapshot = client.fetch(None).await;

    assert!(snapshot.ok);
    let ids: Vec<i64> = snapshot.records.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![1, 3]);
    // No filter configured → no filter_code sent.
    assert!(state.seen_filter.lock().unwrap().is_none());
}

#[tokio::test]
async fn catalog_fetch_unexpected_shape_is_not_ok() {
    let state = CatalogState {
        seen_filter: Arc::new(Mutex::new(None)),
        body: Arc::new(Mutex::new(json!({ "items": [] }))),
    };
    let app = Router::new()
        .route("/videos", get(catalog_handler))
        .with_state(state);
    let base = serve(app).await;

    let client = CatalogClient::new(reqwest::Client::new(), base);
    let snapshot = client.fetch(None).await;

    assert!(!snapshot.ok);
    assert!(snapshot.records.is_empty());
}

#[tokio::test]
async fn catalog_fetch_transport_failure_is_not_ok() {
    // Nothing is listening here.
    let client = CatalogClient::new(reqwest::Client::new(), "http://127.0.0.1:9");
    let snapshot = client.fetch(None).await;
    assert!(!snapshot.ok);
    assert!(snapshot.records.is_empty());
}

// ── non-atomic counter (read-then-set) ────────────────────────────────────────

#[derive(Clone)]
struct CounterBackend {
    get_body: Arc<Mutex<Value>>,
    posts: Arc<Mutex<Vec<(Option<String>, Value)>>>,
}

async fn counter_get(State(state): State<CounterBackend>) -> Json<Value> {
    Json(state.get_body.lock().unwrap().clone())
}

async fn counter_post(
    State(state): State<CounterBackend>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .posts
        .lock()
        .unwrap()
        .push((params.get("video_id").cloned(), body));
    Json(json!({ "ok": true }))
}

#[tokio::test]
async fn read_then_set_posts_count_plus_one() {
    let backend = CounterBackend {
        get_body: Arc::new(Mutex::new(json!({ "video": { "views": 3 } }))),
        posts: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/videos", get(counter_get).post(counter_post))
        .with_state(backend.clone());
    let base = serve(app).await;

    let client = CounterClient::new(reqwest::Client::new(), base, CounterMode::ReadThenSet);
    let views = client.increment(5).await.unwrap();
    assert_eq!(views, 4);

    let posts = backend.posts.lock().unwrap();
    assert_eq!(posts.len(), 1);
    let (video_id, body) = &posts[0];
    assert_eq!(video_id.as_deref(), Some("5"));
    assert_eq!(body["action"], "set");
    assert_eq!(body["views"], 4);
}

#[tokio::test]
async fn read_then_set_list_shape_matches_id() {
    let backend = CounterBackend {
        get_body: Arc::new(Mutex::new(json!({ "videos": [
            { "id": 1, "views": 10 },
            { "id": 2, "views": 20 }
        ]}))),
        posts: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/videos", get(counter_get).post(counter_post))
        .with_state(backend.clone());
    let base = serve(app).await;

    let client = CounterClient::new(reqwest::Client::new(), base, CounterMode::ReadThenSet);
    let views = client.increment(2).await.unwrap();
    assert_eq!(views, 21);
    assert_eq!(backend.posts.lock().unwrap()[0].1["views"], 21);
}

#[tokio::test]
async fn unparsable_get_sends_no_post() {
    let backend = CounterBackend {
        get_body: Arc::new(Mutex::new(json!({}))),
        posts: Arc::new(Mutex::new(Vec::new())),
    };
    let app = Router::new()
        .route("/videos", get(counter_get).post(counter_post))
        .with_state(backend.clone());
    let base = serve(app).await;

    let client = CounterClient::new(reqwest::Client::new(), base, CounterMode::ReadThenSet);
    let err = client.increment(5).await.unwrap_err();
    assert!(matches!(err, TelemetryError::UnreadableCount));

    // The increment was abandoned before anything was written.
    assert!(backend.posts.lock().unwrap().is_empty());
}

// ── atomic counter ────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct AtomicBackend {
    views: Arc<Mutex<HashMap<String, i64>>>,
}

async fn atomic_increment(
    State(state): State<AtomicBackend>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    let key = params.get("video_id").cloned().unwrap_or_default();
    let mut views = state.views.lock().unwrap();
    let count = views.entry(key).or_insert(0);
    *count += 1;
    Json(json!({ "views": *count }))
}

#[tokio::test]
async fn atomic_increment_returns_new_value() {
    let backend = AtomicBackend::default();
    let app = Router::new()
        .route("/counters/increment", post(atomic_increment))
        .with_state(backend.clone());
    let base = serve(app).await;

    let client = CounterClient::new(reqwest::Client::new(), base, CounterMode::Atomic);
    assert_eq!(client.increment(9).await.unwrap(), 1);
    assert_eq!(client.increment(9).await.unwrap(), 2);
    assert_eq!(client.increment(4).await.unwrap(), 1);

    assert_eq!(backend.views.lock().unwrap().get("9"), Some(&2));
}
