pub mod candy_machine;
pub mod config;
pub mod entities;
pub mod generate;
pub mod http;
pub mod llm;
pub mod metadata;
pub mod models;
pub mod pinata;
pub mod preprocess;
pub mod scraper;
pub mod state;

use tracing_subscriber::EnvFilter;

/// Installs the compact `tracing` subscriber shared by the server and tools.
pub fn init_tracing() {
    let default_filter = "info";
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());
    assert!(!filter.is_empty(), "Tracing filter must not be empty");
    assert!(filter.len() < 256, "Tracing filter length exceeds bounds");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(false)
        .compact()
        .init();
}
