use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Result, ServerError};

/// Server configuration options.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// HTTP bind address.
    pub http_bind: SocketAddr,
    /// Admin bind address (healthz/status/metrics).
    pub admin_bind: SocketAddr,
    /// Allowlist for the admin API when non-loopback.
    pub admin_allowlist: Vec<IpAddr>,
    /// API prefix for HTTP routes.
    pub api_prefix: String,
    /// Path to the table catalog metadata file.
    pub catalog_path: PathBuf,
    /// Postgres connection string; empty leaves the agent unconfigured.
    pub database_url: String,
    /// LLM endpoint settings.
    pub llm: LlmSettings,
    /// TTL for memoized answers.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// TTL for conversation state.
    #[serde(with = "humantime_serde")]
    pub conversation_ttl: Duration,
    /// Interval of the expired-entry sweep task.
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
    /// Tables requested from the selector per question.
    pub top_k: usize,
    /// Bound on the generate/validate/repair loop.
    pub max_iterations: u32,
    /// Row bound enforced on unbounded queries.
    pub max_rows: u32,
    /// Max request size in bytes.
    pub max_request_size: usize,
    /// Max response size in bytes.
    pub max_response_size: usize,
    /// Max concurrent connections.
    pub max_connections: usize,
    /// Enable Prometheus metrics.
    pub metrics_enabled: bool,
    /// Enable tracing.
    pub tracing_enabled: bool,
}

/// Settings for the OpenAI-compatible endpoint.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub base_url: String,
    pub api_key: String,
    pub chat_model: String,
    pub embed_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        let defaults = sibyl_agents::llm::LlmConfig::default();
        Self {
            base_url: defaults.base_url,
            api_key: defaults.api_key,
            chat_model: defaults.chat_model,
            embed_model: defaults.embed_model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            timeout: defaults.timeout,
        }
    }
}

impl LlmSettings {
    /// The LLM path needs credentials to be usable at all.
    pub fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    pub fn to_client_config(&self) -> sibyl_agents::llm::LlmConfig {
        sibyl_agents::llm::LlmConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            chat_model: self.chat_model.clone(),
            embed_model: self.embed_model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_bind: "127.0.0.1:8080".parse().unwrap(),
            admin_bind: "127.0.0.1:8081".parse().unwrap(),
            admin_allowlist: Vec::new(),
            api_prefix: String::new(),
            catalog_path: PathBuf::from("./schema_metadata.json"),
            database_url: String::new(),
            llm: LlmSettings::default(),
            cache_ttl: Duration::from_secs(3600),
            conversation_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            top_k: 2,
            max_iterations: 3,
            max_rows: 1000,
            max_request_size: 1024 * 1024,
            max_response_size: 100 * 1024 * 1024,
            max_connections: 1000,
            metrics_enabled: true,
            tracing_enabled: true,
        }
    }
}

impl ServerConfig {
    /// Load config from TOML and environment variables.
    ///
    /// Environment variables use `SIBYL__` prefix with `__` separators.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        } else {
            builder = builder.add_source(config::File::with_name("sibyl").required(false));
        }
        builder = builder.add_source(config::Environment::with_prefix("SIBYL").separator("__"));
        let mut config: ServerConfig = builder
            .build()
            .map_err(|err| ServerError::InvalidConfig(err.to_string()))?
            .try_deserialize()
            .map_err(|err| ServerError::InvalidConfig(err.to_string()))?;
        config.normalize()?;
        Ok(config)
    }

    /// Validate config invariants.
    pub fn validate(&self) -> Result<()> {
        if !self.admin_bind.ip().is_loopback() && self.admin_allowlist.is_empty() {
            return Err(ServerError::InvalidConfig(
                "admin_allowlist is required for non-loopback admin_bind".into(),
            ));
        }
        if !self.api_prefix.is_empty() && !self.api_prefix.starts_with('/') {
            return Err(ServerError::InvalidConfig(
                "api_prefix must start with '/' or be empty".into(),
            ));
        }
        if self.top_k == 0 {
            return Err(ServerError::InvalidConfig(
                "top_k must be greater than 0".into(),
            ));
        }
        if self.max_iterations == 0 {
            return Err(ServerError::InvalidConfig(
                "max_iterations must be greater than 0".into(),
            ));
        }
        if self.max_rows == 0 {
            return Err(ServerError::InvalidConfig(
                "max_rows must be greater than 0".into(),
            ));
        }
        if self.max_request_size == 0 {
            return Err(ServerError::InvalidConfig(
                "max_request_size must be greater than 0".into(),
            ));
        }
        if self.max_response_size == 0 {
            return Err(ServerError::InvalidConfig(
                "max_response_size must be greater than 0".into(),
            ));
        }
        if self.max_connections == 0 {
            return Err(ServerError::InvalidConfig(
                "max_connections must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    fn normalize(&mut self) -> Result<()> {
        if self.api_prefix == "/" {
            self.api_prefix.clear();
        } else {
            while self.api_prefix.ends_with('/') {
                self.api_prefix.pop();
            }
        }
        self.validate()
    }
}
