use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub pinata: PinataConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("FORGE_API_CONFIG").unwrap_or_else(|_| "config/api.toml".to_string());
        assert!(
            !configured_path.is_empty(),
            "Configuration path must be non-empty"
        );
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(true));

        if let Ok(env_override) = std::env::var("FORGE_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        // Secrets come from the environment, e.g. FORGE_API__LLM__API_KEY
        builder = builder.add_source(Environment::with_prefix("FORGE_API").separator("__"));

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        Self::from_settings(settings)
    }

    /// Deserializes and validates an already assembled configuration.
    pub fn from_settings(settings: Config) -> Result<Self> {
        let mut config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            bail!("Database URL must be specified");
        }
        if self.server.port == 0 {
            bail!("Server port must be greater than zero");
        }
        if let Some(min) = self.database.min_connections {
            if min > self.database.max_connections {
                bail!("Max connections must be >= min connections");
            }
        }
        if self.database.max_connections == 0 || self.database.max_connections > 128 {
            bail!("Database max_connections must be within 1..=128");
        }
        if self.llm.base_url.trim().is_empty() {
            bail!("LLM base_url must be specified");
        }
        if self.pinata.base_url.trim().is_empty() {
            bail!("Pinata base_url must be specified");
        }
        check_timeout("llm.request_timeout_ms", self.llm.request_timeout_ms)?;
        check_timeout("pinata.request_timeout_ms", self.pinata.request_timeout_ms)?;
        self.cache.ensure_bounds()?;
        if self.relay.channel_capacity == 0 {
            bail!("relay.channel_capacity must be positive");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    pub port: u16,
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

/// OpenAI-compatible endpoint used for images, chat completions and model listing.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "LlmConfig::default_chat_model")]
    pub chat_model: String,
    #[serde(default = "LlmConfig::default_image_model")]
    pub image_model: String,
    #[serde(default = "LlmConfig::default_image_size")]
    pub image_size: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "LlmConfig::default_min_request_interval_ms")]
    pub min_request_interval_ms: u64,
}

impl LlmConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    fn default_chat_model() -> String {
        "grok-2-1212".to_string()
    }

    fn default_image_model() -> String {
        "grok-2-vision-1212".to_string()
    }

    fn default_image_size() -> String {
        "256x256".to_string()
    }

    const fn default_min_request_interval_ms() -> u64 {
        1_000
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PinataConfig {
    #[serde(default = "PinataConfig::default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub api_secret: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl PinataConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn default_base_url() -> String {
        "https://api.pinata.cloud".to_string()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CorsConfig {
    /// Empty means any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    pub models_max_capacity: u64,
    pub models_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            models_max_capacity: 16,
            models_ttl_seconds: 300,
        }
    }
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        if self.models_max_capacity == 0 {
            bail!("Model cache capacity must be positive");
        }
        if self.models_ttl_seconds > 86_400 {
            bail!("Model cache TTL cannot exceed one day");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

const fn default_request_timeout_ms() -> u64 {
    60_000
}

fn check_timeout(label: &str, millis: u64) -> Result<()> {
    if !(100..=120_000).contains(&millis) {
        bail!("{label} must be between 100ms and 120s, got {millis}ms");
    }
    Ok(())
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}
