//! Candy machine REST endpoints against an in-memory SQLite database.

mod common;

use axum::http::StatusCode;
use common::{UNREACHABLE_URL, app_with_database, file_database, send_json, test_app};
use serde_json::{Value, json};
use tempfile::TempDir;

async fn app() -> axum::Router {
    test_app(UNREACHABLE_URL, UNREACHABLE_URL).await.0
}

/// App over a pooled SQLite file so requests really run in parallel.
async fn pooled_app(connections: u32) -> (axum::Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let database = file_database(&dir.path().join("forge.db"), connections).await;
    let (app, _) = app_with_database(database, UNREACHABLE_URL, UNREACHABLE_URL);
    (app, dir)
}

/// Fires `count` copies of a request at once and collects every response.
async fn send_concurrently(
    app: &axum::Router,
    count: usize,
    request: impl Fn(usize) -> (&'static str, String, Option<Value>),
) -> Vec<(StatusCode, Value)> {
    let handles: Vec<_> = (0..count)
        .map(|index| {
            let app = app.clone();
            let (method, uri, body) = request(index);
            tokio::spawn(async move { send_json(&app, method, &uri, body).await })
        })
        .collect();
    let mut responses = Vec::with_capacity(count);
    for handle in handles {
        responses.push(handle.await.unwrap());
    }
    responses
}

#[tokio::test]
async fn create_returns_persisted_record() {
    let app = app().await;

    let (status, created) = send_json(
        &app,
        "POST",
        "/api/candy-machines",
        Some(json!({
            "candyMachineId": "CM1",
            "creatorAddress": "Creator1",
            "name": "Space Cats",
            "itemsMinted": 99,
            "status": "ended"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created["candyMachineId"], "CM1");
    assert_eq!(created["itemsMinted"], 0);
    assert_eq!(created["status"], "active");
    assert_eq!(created["name"], "Space Cats");
    assert!(created["_id"].is_string());
    assert!(created["createdAt"].is_string());

    let (status, fetched) = send_json(&app, "GET", "/api/candy-machines/CM1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);
}

#[tokio::test]
async fn create_requires_unique_identifier() {
    let app = app().await;

    let (status, body) = send_json(&app, "POST", "/api/candy-machines", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let payload = json!({"candyMachineId": "CM2"});
    let (status, _) = send_json(&app, "POST", "/api/candy-machines", Some(payload.clone())).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, body) = send_json(&app, "POST", "/api/candy-machines", Some(payload)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("already exists"));
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let app = app().await;
    let response = tower::ServiceExt::oneshot(
        app,
        axum::http::Request::builder()
            .method("POST")
            .uri("/api/candy-machines")
            .header("content-type", "application/json")
            .body(axum::body::Body::from("{not json"))
            .unwrap(),
    )
    .await
    .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_machine_is_not_found() {
    let app = app().await;

    for (method, uri, body) in [
        ("GET", "/api/candy-machines/missing", None),
        ("PUT", "/api/candy-machines/missing", Some(json!({"name": "x"}))),
        ("POST", "/api/candy-machines/missing/mint", None),
        (
            "PUT",
            "/api/candy-machines/missing/status",
            Some(json!({"status": "paused"})),
        ),
    ] {
        let (status, response) = send_json(&app, method, uri, body).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{method} {uri}");
        assert_eq!(response["error"], "Candy machine not found");
    }
}

#[tokio::test]
async fn mint_increments_counter() {
    let app = app().await;
    send_json(
        &app,
        "POST",
        "/api/candy-machines",
        Some(json!({"candyMachineId": "CM3"})),
    )
    .await;

    for expected in 1..=3 {
        let (status, body) = send_json(&app, "POST", "/api/candy-machines/CM3/mint", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["itemsMinted"], expected);
    }
}

#[tokio::test]
async fn status_transitions_and_active_listing() {
    let app = app().await;
    for id in ["CM4", "CM5"] {
        send_json(
            &app,
            "POST",
            "/api/candy-machines",
            Some(json!({"candyMachineId": id})),
        )
        .await;
    }

    let (status, body) = send_json(
        &app,
        "PUT",
        "/api/candy-machines/CM4/status",
        Some(json!({"status": "bogus"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid status");

    let (status, body) = send_json(
        &app,
        "PUT",
        "/api/candy-machines/CM4/status",
        Some(json!({"status": "paused"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "paused");

    let (status, listed) = send_json(&app, "GET", "/api/candy-machines", None).await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|machine| machine["candyMachineId"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec!["CM5"]);
}

#[tokio::test]
async fn collection_and_nft_uris_are_validated() {
    let app = app().await;
    send_json(
        &app,
        "POST",
        "/api/candy-machines",
        Some(json!({"candyMachineId": "CM6"})),
    )
    .await;

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/candy-machines/CM6/collection",
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Collection URI is required");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/candy-machines/CM6/collection",
        Some(json!({"collectionUri": "ipfs://collection"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["collectionUri"], "ipfs://collection");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/candy-machines/CM6/nfts",
        Some(json!({"nftUris": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "NFT URIs array is required");

    let (status, body) = send_json(
        &app,
        "POST",
        "/api/candy-machines/CM6/nfts",
        Some(json!({"nftUris": ["ipfs://1", "ipfs://2"]})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nftUris"], json!(["ipfs://1", "ipfs://2"]));
}

#[tokio::test]
async fn update_merges_fields_and_protects_counters() {
    let app = app().await;
    send_json(
        &app,
        "POST",
        "/api/candy-machines",
        Some(json!({"candyMachineId": "CM7", "name": "Old", "symbol": "OLD"})),
    )
    .await;

    let (status, body) = send_json(
        &app,
        "PUT",
        "/api/candy-machines/CM7",
        Some(json!({"itemsMinted": 50})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send_json(
        &app,
        "PUT",
        "/api/candy-machines/CM7",
        Some(json!({"name": "New", "symbol": null, "creatorAddress": "Creator7"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["name"], "New");
    assert!(body.get("symbol").is_none());
    assert_eq!(body["creatorAddress"], "Creator7");
    assert_eq!(body["itemsMinted"], 0);
}

#[tokio::test]
async fn lists_machines_by_creator() {
    let app = app().await;
    for (id, creator) in [("CM8", "alice"), ("CM9", "bob"), ("CM10", "alice")] {
        send_json(
            &app,
            "POST",
            "/api/candy-machines",
            Some(json!({"candyMachineId": id, "creatorAddress": creator})),
        )
        .await;
    }

    let (status, listed) = send_json(&app, "GET", "/api/candy-machines/creator/alice", None).await;
    assert_eq!(status, StatusCode::OK);
    let mut ids: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|machine| machine["candyMachineId"].as_str().unwrap())
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["CM10", "CM8"]);
}

#[tokio::test]
async fn health_endpoints_report_status() {
    let app = app().await;

    let (status, body) = send_json(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = send_json(&app, "GET", "/health/ready", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ready");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn racing_creates_yield_one_record_and_bad_requests() {
    let (app, _dir) = pooled_app(8).await;

    let responses = send_concurrently(&app, 8, |_| {
        (
            "POST",
            "/api/candy-machines".to_string(),
            Some(json!({"candyMachineId": "RACE"})),
        )
    })
    .await;

    let created = responses
        .iter()
        .filter(|(status, _)| *status == StatusCode::CREATED)
        .count();
    assert_eq!(created, 1);
    for (status, body) in responses.iter().filter(|(status, _)| *status != StatusCode::CREATED) {
        assert_eq!(*status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(body["error"], "Candy machine RACE already exists");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_updates_keep_every_field() {
    let (app, _dir) = pooled_app(8).await;
    send_json(
        &app,
        "POST",
        "/api/candy-machines",
        Some(json!({"candyMachineId": "CM11", "name": "Base"})),
    )
    .await;

    let responses = send_concurrently(&app, 8, |index| {
        (
            "PUT",
            "/api/candy-machines/CM11".to_string(),
            Some(json!({format!("k{index}"): index})),
        )
    })
    .await;
    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::OK, "{body}");
    }

    let (status, stored) = send_json(&app, "GET", "/api/candy-machines/CM11", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored["name"], "Base");
    for index in 0..8 {
        assert_eq!(stored[format!("k{index}")], index, "k{index} lost");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_mints_are_all_counted() {
    let (app, _dir) = pooled_app(8).await;
    send_json(
        &app,
        "POST",
        "/api/candy-machines",
        Some(json!({"candyMachineId": "CM12"})),
    )
    .await;

    let responses = send_concurrently(&app, 16, |_| {
        ("POST", "/api/candy-machines/CM12/mint".to_string(), None)
    })
    .await;
    for (status, body) in &responses {
        assert_eq!(*status, StatusCode::OK, "{body}");
    }

    let (_, stored) = send_json(&app, "GET", "/api/candy-machines/CM12", None).await;
    assert_eq!(stored["itemsMinted"], 16);
}
