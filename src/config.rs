use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Service configuration
    pub service: ServiceConfig,
    /// Proxy client configuration (publisher-to-relay hop)
    pub proxy: ProxyConfig,
    /// Relay configuration (relay-to-provider hop)
    pub relay: RelayConfig,
    /// Catalog fetch/publish configuration
    pub fetch: FetchConfig,
    /// Object storage configuration
    pub storage: StorageConfig,
    /// API configuration
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging/metrics
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Configuration for the proxy client hop (publisher -> relay)
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Base URL of the relay that holds the provider credential
    pub base_url: String,
    /// Shared secret sent in the X-Internal-Secret header
    pub internal_secret: String,
    /// Request timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

/// Configuration for the relay hop (relay -> upstream provider)
///
/// Both credential fields are optional so a misconfigured relay can answer
/// requests with a 500 instead of failing service startup; the publisher and
/// readers do not depend on the relay being configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RelayConfig {
    /// Base URL of the true upstream device-data provider
    #[serde(default = "default_provider_base_url")]
    pub provider_base_url: String,
    /// Provider API key, sent as `Authorization: Token <key>` upstream only
    #[serde(default)]
    pub provider_api_key: Option<String>,
    /// Shared secret the relay requires from callers
    #[serde(default)]
    pub internal_secret: Option<String>,
}

/// Catalog fetch and publish configuration
#[derive(Debug, Clone, Deserialize)]
pub struct FetchConfig {
    /// Page size for the manufacturer listing
    #[serde(default = "default_manufacturer_limit")]
    pub manufacturer_limit: u32,
    /// Maximum number of manufacturers processed per run (rate-limit guard)
    #[serde(default = "default_manufacturer_cap")]
    pub manufacturer_cap: usize,
    /// Page size for per-manufacturer device listings
    #[serde(default = "default_device_limit")]
    pub device_limit: u32,
    /// Fixed delay before each device fetch in milliseconds
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Additional upload attempts after the initial one
    #[serde(default = "default_upload_max_retries")]
    pub upload_max_retries: u32,
    /// Fixed delay between upload attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Interval between scheduled publisher runs in seconds
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    /// Run the publisher immediately on startup
    #[serde(default = "default_true")]
    pub run_on_start: bool,
    /// Object key of the persisted catalog
    #[serde(default = "default_catalog_key")]
    pub catalog_key: String,
    /// Provenance label written into catalog metadata
    #[serde(default = "default_source_label")]
    pub source_label: String,
    /// Catalog format version written into catalog metadata
    #[serde(default = "default_catalog_version")]
    pub catalog_version: String,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Bucket name for the catalog artifact
    pub bucket: String,
    /// Region
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint URL (for S3-compatible stores)
    pub endpoint_url: Option<String>,
    /// Force path-style access (required for MinIO and friends)
    #[serde(default)]
    pub force_path_style: bool,
}

/// API configuration for the catalog reader endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,
    /// Local snapshot served when the object store is unreachable
    #[serde(default = "default_fallback_snapshot_path")]
    pub fallback_snapshot_path: String,
    /// Cache lifetime for catalog responses served from storage, in seconds
    #[serde(default = "default_primary_cache_secs")]
    pub primary_cache_secs: u64,
    /// Cache lifetime for fallback snapshot responses, in seconds
    #[serde(default = "default_fallback_cache_secs")]
    pub fallback_cache_secs: u64,
}

// Default value functions
fn default_service_name() -> String {
    "catalog-service".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_provider_base_url() -> String {
    "https://api.techspecs.example".to_string()
}

fn default_manufacturer_limit() -> u32 {
    200
}

fn default_manufacturer_cap() -> usize {
    50
}

fn default_device_limit() -> u32 {
    100
}

fn default_throttle_ms() -> u64 {
    1000
}

fn default_upload_max_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_schedule_interval_secs() -> u64 {
    21600 // Every 6 hours
}

fn default_catalog_key() -> String {
    "device-catalog.json".to_string()
}

fn default_source_label() -> String {
    "device-data-api".to_string()
}

fn default_catalog_version() -> String {
    "1.0".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_fallback_snapshot_path() -> String {
    "data/catalog-fallback.json".to_string()
}

fn default_primary_cache_secs() -> u64 {
    3600
}

fn default_fallback_cache_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from environment and config files
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            // Start with default values
            .set_default("service.name", "catalog-service")?
            .set_default("service.log_level", "info")?
            .set_default("service.metrics_port", 9090)?
            // Add config file if present
            .add_source(config::File::with_name("config/catalog").required(false))
            .add_source(config::File::with_name("/etc/catalog-service/catalog").required(false))
            // Override with environment variables
            // CATALOG__PROXY__BASE_URL -> proxy.base_url
            .add_source(
                config::Environment::with_prefix("CATALOG")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize().map_err(Into::into)
    }

    /// Get the proxy request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.request_timeout_secs)
    }

    /// Get the per-manufacturer throttle delay as Duration
    pub fn throttle_delay(&self) -> Duration {
        Duration::from_millis(self.fetch.throttle_ms)
    }

    /// Get the upload retry delay as Duration
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.fetch.retry_delay_ms)
    }

    /// Get the publish schedule interval as Duration
    pub fn schedule_interval(&self) -> Duration {
        Duration::from_secs(self.fetch.schedule_interval_secs)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            manufacturer_limit: default_manufacturer_limit(),
            manufacturer_cap: default_manufacturer_cap(),
            device_limit: default_device_limit(),
            throttle_ms: default_throttle_ms(),
            upload_max_retries: default_upload_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            schedule_interval_secs: default_schedule_interval_secs(),
            run_on_start: true,
            catalog_key: default_catalog_key(),
            source_label: default_source_label(),
            catalog_version: default_catalog_version(),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_port: default_metrics_port(),
        }
    }
}
