#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use forge_api::config::{CacheConfig, CorsConfig, LlmConfig, PinataConfig, RelayConfig};
use forge_api::llm::LlmClient;
use forge_api::pinata::PinataClient;
use forge_api::state::{ApiCache, AppState};
use http_body_util::BodyExt;
use migration::MigratorTrait;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use serde_json::Value;
use tokio::net::TcpListener;
use tower::util::ServiceExt;

/// Nothing listens here; requests against it fail fast.
pub const UNREACHABLE_URL: &str = "http://127.0.0.1:9";

pub async fn memory_database() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    // Every SQLite memory connection is its own database
    options
        .max_connections(1)
        .min_connections(1)
        .sqlx_logging(false);
    let database = Database::connect(options)
        .await
        .expect("Failed to create in-memory database");
    migration::Migrator::up(&database, None)
        .await
        .expect("Failed to run migrations");
    database
}

/// File-backed SQLite with a real connection pool, for concurrency tests.
pub async fn file_database(path: &std::path::Path, connections: u32) -> DatabaseConnection {
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(connections)
        .min_connections(1)
        .sqlx_logging(false);
    let database = Database::connect(options)
        .await
        .expect("Failed to open SQLite file database");
    migration::Migrator::up(&database, None)
        .await
        .expect("Failed to run migrations");
    database
}

pub fn llm_config(base_url: &str) -> LlmConfig {
    LlmConfig {
        base_url: base_url.to_string(),
        api_key: "test-key".to_string(),
        chat_model: "test-chat".to_string(),
        image_model: "test-image".to_string(),
        image_size: "256x256".to_string(),
        request_timeout_ms: 5_000,
        min_request_interval_ms: 0,
    }
}

pub fn pinata_config(base_url: &str) -> PinataConfig {
    PinataConfig {
        base_url: base_url.to_string(),
        api_key: "pin-key".to_string(),
        api_secret: "pin-secret".to_string(),
        request_timeout_ms: 5_000,
    }
}

pub async fn test_app(llm_url: &str, pinata_url: &str) -> (Router, AppState) {
    app_with_database(memory_database().await, llm_url, pinata_url)
}

pub fn app_with_database(
    database: DatabaseConnection,
    llm_url: &str,
    pinata_url: &str,
) -> (Router, AppState) {
    let llm = LlmClient::new(&llm_config(llm_url)).expect("LLM client");
    let pinata = PinataClient::new(&pinata_config(pinata_url)).expect("Pinata client");
    let cache = Arc::new(ApiCache::new(&CacheConfig::default()));
    let state = AppState::new(database, cache, llm, pinata, &RelayConfig::default());
    let router = forge_api::http::router(state.clone(), &CorsConfig::default());
    (router, state)
}

/// Sends one request and returns the status with the body parsed as JSON
/// (`Value::Null` for an empty body).
pub async fn send_json(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&value).unwrap())
        }
        None => Body::empty(),
    };
    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| {
            Value::String(String::from_utf8_lossy(&bytes).into_owned())
        })
    };
    (status, json)
}

/// Serves `router` on an ephemeral local port and returns its base URL.
pub async fn spawn_stub(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        width,
        height,
        image::Rgb([12, 34, 56]),
    ));
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}
