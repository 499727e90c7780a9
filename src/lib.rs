//! Catalog Service
//!
//! Maintains the device catalog behind the repair pricing wizard. A scheduled
//! publisher job lists manufacturers and devices from an upstream device-data
//! provider (through an authenticated internal relay), normalizes the
//! heterogeneous records into a category → brand → model → variants taxonomy,
//! and publishes the result as one JSON artifact in object storage. Readers
//! are pull-based and independent of the publisher.
//!
//! ## Features
//!
//! - **Credential isolation**: the provider API key lives only on the relay
//!   hop; the publisher authenticates to the relay with a shared internal
//!   secret carried in a header
//! - **Heuristic normalization**: category classification and brand / storage
//!   / color token stripping as pure, testable functions with named
//!   vocabularies
//! - **Resilient publishing**: per-manufacturer failures are skipped, the
//!   final upload retries with a fixed delay, and the artifact is rebuilt
//!   from scratch every run
//! - **Dual-source reads**: the API falls back to a bundled snapshot with an
//!   explicit source marker when the object store is unreachable
//!
//! ## Architecture
//!
//! ```text
//! Provider API              Relay                    Publisher
//! ┌──────────────┐   Token  ┌──────────────┐ secret ┌──────────────┐
//! │ /manufactur… │◀─────────│ /api/internal│◀───────│ ProxyClient  │
//! │ /devices/…   │          │ /fetch-cat…  │        └──────┬───────┘
//! └──────────────┘          └──────────────┘               │
//!                                                          ▼
//!                           ┌──────────────┐        ┌──────────────┐
//!                           │ Object store │◀───────│ Normalizer + │
//!                           │ catalog.json │ upload │ Catalog fold │
//!                           └──────┬───────┘        └──────────────┘
//!                                  │
//!                                  ▼
//!                           ┌──────────────┐        ┌──────────────┐
//!                           │ Reader API   │───────▶│ Fallback     │
//!                           │ /api/v1/…    │ on err │ snapshot     │
//!                           └──────────────┘        └──────────────┘
//! ```

pub mod catalog;
pub mod catalog_api;
pub mod config;
pub mod device_api;
pub mod normalizer;
pub mod object_store;
pub mod publisher;

pub use catalog::{Catalog, CatalogMetadata, CatalogStats};
pub use catalog_api::{AppState, CatalogSource, ReaderError};
pub use config::Config;
pub use device_api::{ApiError, DeviceApi, DeviceRecord, ManufacturerRecord, ProxyClient};
pub use normalizer::{normalize, DeviceCategory, NormalizedDevice};
pub use object_store::{ObjectStore, S3CatalogStore, StoreError};
pub use publisher::{CatalogPublisher, PublishError, RunSummary};
