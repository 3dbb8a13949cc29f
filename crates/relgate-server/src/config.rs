use std::path::{Path, PathBuf};
use std::time::Duration;

use relgate_core::{AclStrategy, ExtractorConfig};
use serde::Deserialize;

use crate::engine::DefaultPolicy;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub grpc: GrpcConfig,
    pub rest: RestConfig,
    pub store: StoreConfig,
    pub decision: DecisionConfig,
    pub cache: CacheConfig,
    pub shadow: ShadowConfig,
    pub admin: AdminConfig,
    pub log: LogConfig,
    pub tracing: TracingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RestConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    pub key_prefix: String,
    pub seed_file: Option<PathBuf>,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DecisionConfig {
    pub revocation_check_enabled: bool,
    pub shadow_mode_enabled: bool,
    pub query_param_enabled: bool,
    pub query_param_name: String,
    pub cookie_enabled: bool,
    pub cookie_name: String,
    pub default_policy: DefaultPolicy,
    pub acl_strategy: AclStrategy,
    pub max_credential_lifetime_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ShadowConfig {
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    pub key_hash: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub format: LogFormat,
    pub level: String,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub enabled: bool,
    pub otlp_endpoint: String,
    pub service_name: String,
    pub sample_rate: f64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 50051,
        }
    }
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: String::new(),
            seed_file: None,
            timeout_ms: 200,
        }
    }
}

impl Default for DecisionConfig {
    fn default() -> Self {
        Self {
            revocation_check_enabled: true,
            shadow_mode_enabled: false,
            query_param_enabled: false,
            query_param_name: "access_token".to_string(),
            cookie_enabled: false,
            cookie_name: "access_token".to_string(),
            default_policy: DefaultPolicy::Deny,
            acl_strategy: AclStrategy::Any,
            max_credential_lifetime_secs: 86_400,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
        }
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Json,
            level: "info".to_string(),
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: "http://localhost:4317".to_string(),
            service_name: "relgate".to_string(),
            sample_rate: 1.0,
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            let contents = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::ReadFile(path.display().to_string(), e.to_string()))?;
            toml::from_str::<AppConfig>(&contents)
                .map_err(|e| ConfigError::ParseToml(e.to_string()))?
        } else {
            AppConfig::default()
        };

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("RELGATE_GRPC_HOST") {
            self.grpc.host = v;
        }
        if let Ok(v) = std::env::var("RELGATE_GRPC_PORT")
            && let Ok(port) = v.parse()
        {
            self.grpc.port = port;
        }
        if let Ok(v) = std::env::var("RELGATE_REST_HOST") {
            self.rest.host = v;
        }
        if let Ok(v) = std::env::var("RELGATE_REST_PORT")
            && let Ok(port) = v.parse()
        {
            self.rest.port = port;
        }
        if let Ok(v) = std::env::var("RELGATE_STORE_BACKEND") {
            match v.as_str() {
                "memory" => self.store.backend = StoreBackend::Memory,
                "redis" => self.store.backend = StoreBackend::Redis,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("RELGATE_REDIS_URL") {
            self.store.redis_url = v;
        }
        if let Ok(v) = std::env::var("RELGATE_STORE_TIMEOUT_MS")
            && let Ok(n) = v.parse()
        {
            self.store.timeout_ms = n;
        }
        if let Ok(v) = std::env::var("RELGATE_REVOCATION_CHECK_ENABLED")
            && let Ok(b) = v.parse()
        {
            self.decision.revocation_check_enabled = b;
        }
        if let Ok(v) = std::env::var("RELGATE_SHADOW_MODE_ENABLED")
            && let Ok(b) = v.parse()
        {
            self.decision.shadow_mode_enabled = b;
        }
        if let Ok(v) = std::env::var("RELGATE_DEFAULT_POLICY") {
            match v.as_str() {
                "deny" => self.decision.default_policy = DefaultPolicy::Deny,
                "allow" => self.decision.default_policy = DefaultPolicy::Allow,
                _ => {}
            }
        }
        if let Ok(v) = std::env::var("RELGATE_CACHE_POLL_INTERVAL_MS")
            && let Ok(n) = v.parse()
        {
            self.cache.poll_interval_ms = n;
        }
        if let Ok(v) = std::env::var("RELGATE_ADMIN_KEY_HASH") {
            self.admin.key_hash = Some(v);
        }
        if let Ok(v) = std::env::var("RELGATE_LOG_LEVEL") {
            self.log.level = v;
        }
        if let Ok(v) = std::env::var("RELGATE_LOG_FORMAT") {
            match v.as_str() {
                "json" => self.log.format = LogFormat::Json,
                "pretty" => self.log.format = LogFormat::Pretty,
                _ => {}
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.grpc.port == 0 {
            return Err(ConfigError::Validation(
                "grpc.port must be non-zero".to_string(),
            ));
        }
        if self.rest.port == 0 {
            return Err(ConfigError::Validation(
                "rest.port must be non-zero".to_string(),
            ));
        }
        if self.store.timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.cache.poll_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "cache.poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if self.shadow.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "shadow.queue_capacity must be non-zero".to_string(),
            ));
        }
        if self.decision.max_credential_lifetime_secs == 0 {
            return Err(ConfigError::Validation(
                "decision.max_credential_lifetime_secs must be non-zero".to_string(),
            ));
        }
        if self.decision.query_param_enabled && self.decision.query_param_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "decision.query_param_name must be set when query_param_enabled".to_string(),
            ));
        }
        if self.decision.cookie_enabled && self.decision.cookie_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "decision.cookie_name must be set when cookie_enabled".to_string(),
            ));
        }
        Ok(())
    }

    pub fn to_extractor_config(&self) -> ExtractorConfig {
        ExtractorConfig {
            query_param: self
                .decision
                .query_param_enabled
                .then(|| self.decision.query_param_name.clone()),
            cookie: self
                .decision
                .cookie_enabled
                .then(|| self.decision.cookie_name.clone()),
        }
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.cache.poll_interval_ms)
    }

    pub fn max_credential_lifetime(&self) -> Duration {
        Duration::from_secs(self.decision.max_credential_lifetime_secs)
    }

    pub fn grpc_addr(&self) -> String {
        format!("{}:{}", self.grpc.host, self.grpc.port)
    }

    pub fn rest_addr(&self) -> String {
        format!("{}:{}", self.rest.host, self.rest.port)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{0}': {1}")]
    ReadFile(String, String),

    #[error("failed to parse TOML config: {0}")]
    ParseToml(String),

    #[error("config validation failed: {0}")]
    Validation(String),
}
