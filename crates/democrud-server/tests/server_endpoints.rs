use std::sync::Arc;

use democrud_db_memory::InMemoryRecordStore;
use democrud_server::{
    AppConfig, AppState, CacheBackend, UserService, UserServiceOptions, build_app,
};
use democrud_storage::DynRecordStore;
use serde_json::{Value, json};
use tokio::task::JoinHandle;

async fn start_server() -> (String, tokio::sync::oneshot::Sender<()>, JoinHandle<()>) {
    let store: DynRecordStore = Arc::new(InMemoryRecordStore::new());
    let users = UserService::new(store, CacheBackend::new_local(), UserServiceOptions::default());
    let app = build_app(&AppConfig::default(), AppState { users });

    // Bind to an ephemeral port
    let listener = tokio::net::TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = rx.await;
            })
            .await;
    });

    (format!("http://{addr}"), tx, server)
}

#[tokio::test]
async fn server_endpoints_work() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    // GET /
    let resp = client.get(format!("{base}/")).send().await.unwrap();
    assert!(resp.status().is_success());
    assert!(resp.headers().contains_key("x-request-id"));
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["service"], "demo-crud");
    assert_eq!(body["status"], "ok");

    // GET /healthz
    let resp = client.get(format!("{base}/healthz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    // GET /readyz
    let resp = client.get(format!("{base}/readyz")).send().await.unwrap();
    assert!(resp.status().is_success());
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ready");
    assert_eq!(body["store"]["backend"], "memory");
    assert_eq!(body["cache"]["backend"], "local");

    // GET /users on an empty store
    let resp = client.get(format!("{base}/users")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([]));

    // POST /users
    let resp = client
        .post(format!("{base}/users"))
        .json(&json!({"name": "K6 User 1", "email": "k1@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: Value = resp.json().await.unwrap();
    assert_eq!(
        created,
        json!({"id": 1, "name": "K6 User 1", "email": "k1@example.com"})
    );

    // GET /users sees the new record despite the earlier cached empty list
    let resp = client.get(format!("{base}/users")).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([created]));

    // GET /error
    let resp = client.get(format!("{base}/error")).send().await.unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Forced error!");

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn invalid_create_requests_are_rejected() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    // Missing email
    let resp = client
        .post(format!("{base}/users"))
        .json(&json!({"name": "No Email"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("email"));

    // Blank name
    let resp = client
        .post(format!("{base}/users"))
        .json(&json!({"name": "   ", "email": "blank@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Malformed JSON
    let resp = client
        .post(format!("{base}/users"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert!(body["error"].is_string());

    // Nothing was created
    let resp = client.get(format!("{base}/users")).send().await.unwrap();
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body, json!([]));

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

#[tokio::test]
async fn request_id_is_propagated() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .get(format!("{base}/healthz"))
        .header("x-request-id", "trace-me-123")
        .send()
        .await
        .unwrap();
    assert_eq!(
        resp.headers()
            .get("x-request-id")
            .and_then(|v| v.to_str().ok()),
        Some("trace-me-123")
    );

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}

/// Mirrors the load script: virtual users repeatedly hit home, create, list.
#[tokio::test]
async fn load_rounds_keep_every_user_visible() {
    let (base, shutdown_tx, handle) = start_server().await;
    let client = reqwest::Client::new();

    const VIRTUAL_USERS: usize = 10;
    const ROUNDS: usize = 5;

    let mut tasks = Vec::new();
    for vu in 1..=VIRTUAL_USERS {
        let client = client.clone();
        let base = base.clone();
        tasks.push(tokio::spawn(async move {
            for round in 0..ROUNDS {
                let resp = client.get(format!("{base}/")).send().await.unwrap();
                assert_eq!(resp.status(), 200);

                let resp = client
                    .post(format!("{base}/users"))
                    .json(&json!({
                        "name": format!("K6 User {vu}"),
                        "email": format!("k6user{vu}-{round}@example.com"),
                    }))
                    .send()
                    .await
                    .unwrap();
                assert_eq!(resp.status(), 201);

                let resp = client.get(format!("{base}/users")).send().await.unwrap();
                assert_eq!(resp.status(), 200);
            }
        }));
    }
    for result in futures_util::future::join_all(tasks).await {
        result.expect("virtual user task");
    }

    // A final write invalidates whatever snapshot the load left behind
    let resp = client
        .post(format!("{base}/users"))
        .json(&json!({"name": "Final", "email": "final@example.com"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    let resp = client.get(format!("{base}/users")).send().await.unwrap();
    let users: Vec<Value> = resp.json().await.unwrap();
    assert_eq!(users.len(), VIRTUAL_USERS * ROUNDS + 1);
    let ids: Vec<i64> = users.iter().map(|u| u["id"].as_i64().unwrap()).collect();
    let expected: Vec<i64> = (1..=(VIRTUAL_USERS * ROUNDS + 1) as i64).collect();
    assert_eq!(ids, expected);

    let _ = shutdown_tx.send(());
    let _ = handle.await;
}
