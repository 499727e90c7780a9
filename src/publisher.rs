//! Catalog publisher pipeline.
//!
//! One invocation fetches the manufacturer list, walks the first N
//! manufacturers with a fixed-rate throttle, normalizes every device into the
//! catalog, and uploads the serialized result with bounded retry. A single
//! manufacturer's failure is logged and skipped; a failed manufacturer-list
//! fetch or exhausted upload retries fail the whole run.
//!
//! The pipeline is strictly sequential by design: parallel fan-out across
//! manufacturers would defeat the upstream rate limit the throttle exists for.

use crate::catalog::{Catalog, CatalogStats};
use crate::config::FetchConfig;
use crate::device_api::{ApiError, DeviceApi};
use crate::normalizer::normalize;
use crate::object_store::{ObjectStore, StoreError};
use metrics::counter;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Content type of the published artifact
const CATALOG_CONTENT_TYPE: &str = "application/json";

/// Errors that terminate a publisher run
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Manufacturer list fetch failed: {0}")]
    ManufacturerFetch(#[source] ApiError),

    #[error("Upstream returned no manufacturers")]
    EmptyManufacturerList,

    #[error("Failed to serialize catalog: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Catalog upload failed after {attempts} attempts: {source}")]
    UploadExhausted {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

/// Outcome of a successful publisher run
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Identifier correlating all log events of this invocation
    pub run_id: Uuid,
    /// Manufacturers whose devices were folded into the catalog
    pub manufacturers_processed: usize,
    /// Manufacturers skipped after a failed or empty device fetch
    pub manufacturers_skipped: usize,
    /// Final catalog counts
    pub stats: CatalogStats,
}

/// Orchestrates one fetch → normalize → publish cycle per invocation
pub struct CatalogPublisher {
    api: Arc<dyn DeviceApi>,
    store: Arc<dyn ObjectStore>,
    config: FetchConfig,
}

impl CatalogPublisher {
    /// Create a new publisher
    pub fn new(api: Arc<dyn DeviceApi>, store: Arc<dyn ObjectStore>, config: FetchConfig) -> Self {
        Self { api, store, config }
    }

    /// Run one full publish cycle
    #[instrument(skip(self), fields(run_id))]
    pub async fn run(&self) -> Result<RunSummary, PublishError> {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));

        info!(
            manufacturer_limit = self.config.manufacturer_limit,
            manufacturer_cap = self.config.manufacturer_cap,
            "Starting catalog publish run"
        );

        let manufacturers = self
            .api
            .list_manufacturers(self.config.manufacturer_limit)
            .await
            .map_err(PublishError::ManufacturerFetch)?;

        if manufacturers.is_empty() {
            return Err(PublishError::EmptyManufacturerList);
        }

        info!(count = manufacturers.len(), "Fetched manufacturer list");

        let mut catalog = Catalog::new(
            self.config.catalog_version.clone(),
            self.config.source_label.clone(),
        );
        let mut processed = 0usize;
        let mut skipped = 0usize;

        for manufacturer in manufacturers.iter().take(self.config.manufacturer_cap) {
            // Fixed-rate throttle ahead of every device request
            tokio::time::sleep(Duration::from_millis(self.config.throttle_ms)).await;

            match self
                .api
                .list_devices(&manufacturer.name, self.config.device_limit)
                .await
            {
                Ok(devices) if devices.is_empty() => {
                    warn!(manufacturer = %manufacturer.name, "No devices returned, skipping");
                    counter!("catalog_manufacturers_skipped_total").increment(1);
                    skipped += 1;
                }
                Ok(devices) => {
                    for device in &devices {
                        let normalized = normalize(device, &manufacturer.name);
                        catalog.add_device(&normalized);
                    }
                    counter!("catalog_devices_normalized_total").increment(devices.len() as u64);
                    processed += 1;
                }
                Err(e) => {
                    // Non-fatal: one manufacturer's failure never aborts the run
                    warn!(
                        manufacturer = %manufacturer.name,
                        error = %e,
                        "Device fetch failed, skipping manufacturer"
                    );
                    counter!("catalog_manufacturers_skipped_total").increment(1);
                    skipped += 1;
                }
            }
        }

        let stats = catalog.stats();
        info!(
            categories = stats.categories,
            brands = stats.brands,
            models = stats.models,
            variants = stats.variants,
            manufacturers_processed = processed,
            manufacturers_skipped = skipped,
            "Catalog built, publishing"
        );

        let body = catalog.to_pretty_json()?.into_bytes();
        self.upload_with_retry(body).await?;
        counter!("catalog_publish_success_total").increment(1);

        Ok(RunSummary {
            run_id,
            manufacturers_processed: processed,
            manufacturers_skipped: skipped,
            stats,
        })
    }

    /// Upload the catalog, retrying on failure with a fixed delay.
    ///
    /// One initial attempt plus `upload_max_retries` retries; exhaustion
    /// reports the last attempt's error.
    async fn upload_with_retry(&self, body: Vec<u8>) -> Result<(), PublishError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match self
                .store
                .put(&self.config.catalog_key, body.clone(), CATALOG_CONTENT_TYPE)
                .await
            {
                Ok(()) => {
                    info!(
                        key = %self.config.catalog_key,
                        size_bytes = body.len(),
                        attempt,
                        "Catalog uploaded"
                    );
                    return Ok(());
                }
                Err(e) if attempt > self.config.upload_max_retries => {
                    counter!("catalog_publish_failure_total").increment(1);
                    return Err(PublishError::UploadExhausted {
                        attempts: attempt,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Catalog upload failed, retrying");
                    counter!("catalog_upload_retries_total").increment(1);
                    tokio::time::sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device_api::{DeviceRecord, ManufacturerRecord, MockDeviceApi};
    use crate::object_store::MockObjectStore;
    use serde_json::Value;
    use std::sync::Mutex;

    fn manufacturer(name: &str) -> ManufacturerRecord {
        ManufacturerRecord {
            id: Value::Null,
            name: name.to_string(),
            website_url: None,
        }
    }

    fn device(name: &str, storage: &str) -> DeviceRecord {
        DeviceRecord {
            name: name.to_string(),
            storage: Some(storage.to_string()),
            ..Default::default()
        }
    }

    fn transport_error(endpoint: &str) -> ApiError {
        ApiError::Transport {
            endpoint: endpoint.to_string(),
            status: 502,
            status_text: "Bad Gateway".to_string(),
            body: "boom".to_string(),
        }
    }

    fn test_config() -> FetchConfig {
        FetchConfig::default()
    }

    fn publisher(api: MockDeviceApi, store: MockObjectStore) -> CatalogPublisher {
        CatalogPublisher::new(Arc::new(api), Arc::new(store), test_config())
    }

    #[tokio::test(start_paused = true)]
    async fn failed_manufacturer_is_skipped_and_run_succeeds() {
        let mut api = MockDeviceApi::new();
        api.expect_list_manufacturers()
            .returning(|_| Ok(vec![manufacturer("Acme"), manufacturer("Samsung")]));
        api.expect_list_devices()
            .withf(|name, _| name == "Acme")
            .returning(|name, _| Err(transport_error(name)));
        api.expect_list_devices()
            .withf(|name, _| name == "Samsung")
            .returning(|_, _| Ok(vec![device("Samsung Galaxy S21", "128GB, 256GB")]));

        let uploaded = Arc::new(Mutex::new(Vec::new()));
        let sink = uploaded.clone();
        let mut store = MockObjectStore::new();
        store.expect_put().times(1).returning(move |_, bytes, _| {
            *sink.lock().unwrap() = bytes;
            Ok(())
        });

        let summary = publisher(api, store).run().await.unwrap();
        assert_eq!(summary.manufacturers_processed, 1);
        assert_eq!(summary.manufacturers_skipped, 1);

        let catalog: Value = serde_json::from_slice(&uploaded.lock().unwrap()).unwrap();
        let models = &catalog["categories"]["phone"]["brands"]["Samsung"]["models"];
        assert_eq!(models["Galaxy S21"]["variants"], serde_json::json!(["128GB", "256GB"]));
        assert!(catalog["categories"]["phone"]["brands"].get("Acme").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn manufacturer_list_failure_is_fatal() {
        let mut api = MockDeviceApi::new();
        api.expect_list_manufacturers()
            .returning(|_| Err(transport_error("/manufacturers/?limit=200")));

        let mut store = MockObjectStore::new();
        store.expect_put().times(0);

        let err = publisher(api, store).run().await.unwrap_err();
        assert!(matches!(err, PublishError::ManufacturerFetch(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn empty_manufacturer_list_is_fatal() {
        let mut api = MockDeviceApi::new();
        api.expect_list_manufacturers().returning(|_| Ok(vec![]));

        let mut store = MockObjectStore::new();
        store.expect_put().times(0);

        let err = publisher(api, store).run().await.unwrap_err();
        assert!(matches!(err, PublishError::EmptyManufacturerList));
    }

    #[tokio::test(start_paused = true)]
    async fn upload_exhaustion_reports_last_attempt_error() {
        let mut api = MockDeviceApi::new();
        api.expect_list_manufacturers()
            .returning(|_| Ok(vec![manufacturer("Samsung")]));
        api.expect_list_devices()
            .returning(|_, _| Ok(vec![device("Samsung Galaxy S21", "128GB")]));

        let attempt_counter = Arc::new(Mutex::new(0u32));
        let recorder = attempt_counter.clone();
        let mut store = MockObjectStore::new();
        store.expect_put().times(4).returning(move |key, _, _| {
            let mut n = recorder.lock().unwrap();
            *n += 1;
            Err(StoreError::Upload {
                key: key.to_string(),
                message: format!("attempt {} failed", n),
            })
        });

        let err = publisher(api, store).run().await.unwrap_err();
        match err {
            PublishError::UploadExhausted { attempts, source } => {
                assert_eq!(attempts, 4); // 1 initial + 3 retries
                assert!(source.to_string().contains("attempt 4 failed"));
            }
            other => panic!("expected UploadExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn manufacturer_cap_bounds_device_fetches() {
        let mut api = MockDeviceApi::new();
        api.expect_list_manufacturers().returning(|_| {
            Ok(vec![
                manufacturer("A"),
                manufacturer("B"),
                manufacturer("C"),
            ])
        });
        api.expect_list_devices()
            .times(2)
            .returning(|_, _| Ok(vec![device("Pixel 8", "128GB")]));

        let mut store = MockObjectStore::new();
        store.expect_put().times(1).returning(|_, _, _| Ok(()));

        let mut config = test_config();
        config.manufacturer_cap = 2;
        let publisher = CatalogPublisher::new(Arc::new(api), Arc::new(store), config);

        let summary = publisher.run().await.unwrap();
        assert_eq!(summary.manufacturers_processed, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_device_list_counts_as_skipped() {
        let mut api = MockDeviceApi::new();
        api.expect_list_manufacturers()
            .returning(|_| Ok(vec![manufacturer("Ghost"), manufacturer("Apple")]));
        api.expect_list_devices()
            .withf(|name, _| name == "Ghost")
            .returning(|_, _| Ok(vec![]));
        api.expect_list_devices()
            .withf(|name, _| name == "Apple")
            .returning(|_, _| Ok(vec![device("Apple iPad Pro", "256GB")]));

        let mut store = MockObjectStore::new();
        store.expect_put().times(1).returning(|_, _, _| Ok(()));

        let summary = publisher(api, store).run().await.unwrap();
        assert_eq!(summary.manufacturers_processed, 1);
        assert_eq!(summary.manufacturers_skipped, 1);
        assert_eq!(summary.stats.categories, 1);
    }
}
