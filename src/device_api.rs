//! Upstream device-data API client.
//!
//! All requests go through the internal relay, which holds the real provider
//! credential. This client only ever authenticates to the relay with the
//! shared internal secret; the provider API key never enters this process's
//! request path.

use crate::config::ProxyConfig;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

/// Relay endpoint that forwards catalog requests upstream
pub const RELAY_FETCH_PATH: &str = "/api/internal/fetch-catalog-data";

/// Header carrying the shared secret for the relay hop
pub const INTERNAL_SECRET_HEADER: &str = "X-Internal-Secret";

/// Errors that can occur while talking to the device-data API
#[derive(Error, Debug)]
pub enum ApiError {
    /// Non-success HTTP status from the relay or upstream provider
    #[error("Request for {endpoint} failed: {status} {status_text}: {body}")]
    Transport {
        endpoint: String,
        status: u16,
        status_text: String,
        body: String,
    },

    /// The relay could not be reached at all
    #[error("Failed to reach catalog relay: {0}")]
    Connection(#[from] reqwest::Error),

    /// The response body was not the JSON shape we expect
    #[error("Malformed response for {endpoint}: {source}")]
    Parse {
        endpoint: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A manufacturer as listed by the upstream provider.
///
/// The id is treated as an opaque iteration key; only `name` is used when
/// building the catalog.
#[derive(Debug, Clone, Deserialize)]
pub struct ManufacturerRecord {
    #[serde(default)]
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub website_url: Option<String>,
}

/// Nested brand reference on a device record
#[derive(Debug, Clone, Deserialize)]
pub struct BrandRef {
    #[serde(default)]
    pub name: Option<String>,
}

/// A raw device record from the upstream provider.
///
/// The provider schema is heterogeneous across device classes; fields we do
/// not recognize are kept in `extra` instead of being silently dropped.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceRecord {
    #[serde(default)]
    pub id: Value,
    #[serde(default)]
    pub name: String,
    /// Nested brand object, when the provider sends one
    #[serde(default)]
    pub brand: Option<BrandRef>,
    /// Flat manufacturer name field
    #[serde(default)]
    pub manufacturer: Option<String>,
    /// Flat brand name field
    #[serde(default)]
    pub brand_name: Option<String>,
    /// Comma-separated storage capacity descriptor, e.g. "128GB, 256GB"
    #[serde(default)]
    pub storage: Option<String>,
    /// Provider-specific fields we do not model explicitly
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// Listing operations against the upstream device-data provider
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DeviceApi: Send + Sync {
    /// List manufacturers, single page capped at `limit`
    async fn list_manufacturers(&self, limit: u32) -> Result<Vec<ManufacturerRecord>, ApiError>;

    /// List devices for one manufacturer, single page capped at `limit`
    async fn list_devices(
        &self,
        manufacturer: &str,
        limit: u32,
    ) -> Result<Vec<DeviceRecord>, ApiError>;
}

/// Client for the device-data provider, authenticated via the internal relay
pub struct ProxyClient {
    http: reqwest::Client,
    base_url: String,
    internal_secret: String,
}

impl ProxyClient {
    /// Create a new proxy client from configuration
    pub fn new(config: &ProxyConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            internal_secret: config.internal_secret.clone(),
        })
    }

    /// Issue one upstream request through the relay and return the raw JSON.
    ///
    /// `endpoint` is the provider path (absolute URLs pass through the relay
    /// unchanged). The secret travels only in the header, and neither the
    /// secret nor the raw header set is ever logged.
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    pub async fn request(&self, endpoint: &str) -> Result<Value, ApiError> {
        let url = format!("{}{}", self.base_url, RELAY_FETCH_PATH);

        let response = self
            .http
            .post(&url)
            .header(INTERNAL_SECRET_HEADER, &self.internal_secret)
            .json(&serde_json::json!({ "endpoint": endpoint }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Transport {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or("Unknown").to_string(),
                body,
            });
        }

        let value = response.json::<Value>().await?;
        debug!("Relay request succeeded");
        Ok(value)
    }

    /// Parse a relay response into a typed record list
    fn parse_list<T: serde::de::DeserializeOwned>(
        endpoint: &str,
        value: Value,
    ) -> Result<Vec<T>, ApiError> {
        serde_json::from_value(value).map_err(|source| ApiError::Parse {
            endpoint: endpoint.to_string(),
            source,
        })
    }
}

#[async_trait]
impl DeviceApi for ProxyClient {
    async fn list_manufacturers(&self, limit: u32) -> Result<Vec<ManufacturerRecord>, ApiError> {
        let endpoint = format!("/manufacturers/?limit={limit}");
        let value = self.request(&endpoint).await?;
        Self::parse_list(&endpoint, value)
    }

    async fn list_devices(
        &self,
        manufacturer: &str,
        limit: u32,
    ) -> Result<Vec<DeviceRecord>, ApiError> {
        let endpoint = format!(
            "/devices/by-manufacturer/?manufacturer={}&limit={limit}",
            urlencoding::encode(manufacturer)
        );
        let value = self.request(&endpoint).await?;
        Self::parse_list(&endpoint, value)
    }
}
