use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;
use tokio::sync::broadcast;

use crate::config::{CacheConfig, RelayConfig};
use crate::llm::LlmClient;
use crate::pinata::PinataClient;

pub const MODELS_CACHE_KEY: &str = "models";

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub cache: Arc<ApiCache>,
    pub llm: LlmClient,
    pub pinata: PinataClient,
    /// Fan-out channel behind the WebSocket relay
    pub relay: broadcast::Sender<String>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        cache: Arc<ApiCache>,
        llm: LlmClient,
        pinata: PinataClient,
        relay_config: &RelayConfig,
    ) -> Self {
        assert!(
            relay_config.channel_capacity > 0,
            "Relay channel capacity must be positive"
        );
        let (relay, _) = broadcast::channel(relay_config.channel_capacity);
        Self {
            database,
            cache,
            llm,
            pinata,
            relay,
            start_time: Instant::now(),
        }
    }
}

pub struct ApiCache {
    pub models: Cache<String, Arc<Vec<String>>>,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(
            config.models_max_capacity > 0,
            "Model cache capacity threshold"
        );

        let models = Cache::builder()
            .max_capacity(config.models_max_capacity)
            .time_to_live(Duration::from_secs(config.models_ttl_seconds))
            .build();

        Self { models }
    }
}
