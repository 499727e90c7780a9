//! The catalog document and its builder.
//!
//! The catalog is the sole persisted artifact: a three-level taxonomy
//! category → brand → model → variants, plus a provenance stamp. It is
//! rebuilt from scratch on every publisher run; there is no incremental merge
//! with a previously stored version.

use crate::normalizer::NormalizedDevice;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Provenance stamp, overwritten on every successful run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogMetadata {
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    pub version: String,
    pub source: String,
}

/// Models for one brand
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrandEntry {
    pub models: IndexMap<String, ModelEntry>,
}

/// Variant list for one model.
///
/// Never empty: a model key is only created in the same step that appends its
/// first variant. Variant order is first-seen order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelEntry {
    pub variants: Vec<String>,
}

/// Brands for one category
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryEntry {
    pub brands: IndexMap<String, BrandEntry>,
}

/// The device catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub metadata: CatalogMetadata,
    pub categories: IndexMap<String, CategoryEntry>,
}

/// Summary counts logged when a run finalizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub categories: usize,
    pub brands: usize,
    pub models: usize,
    pub variants: usize,
}

impl Catalog {
    /// Create an empty catalog stamped with the current time
    pub fn new(version: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            metadata: CatalogMetadata {
                last_updated: Utc::now(),
                version: version.into(),
                source: source.into(),
            },
            categories: IndexMap::new(),
        }
    }

    /// Fold one normalized device into the taxonomy.
    ///
    /// Category/brand/model entries are created lazily on first encounter;
    /// re-adding an existing tuple is a no-op. Variants are appended in
    /// first-seen order with case-sensitive deduplication. An empty variant
    /// list leaves the taxonomy untouched so no model entry ever exists
    /// without at least one variant.
    pub fn add_device(&mut self, device: &NormalizedDevice) {
        if device.variants.is_empty() {
            return;
        }

        let model = self
            .categories
            .entry(device.category.as_str().to_string())
            .or_default()
            .brands
            .entry(device.brand.clone())
            .or_default()
            .models
            .entry(device.model.clone())
            .or_default();

        for variant in &device.variants {
            if !model.variants.contains(variant) {
                model.variants.push(variant.clone());
            }
        }
    }

    /// Count entries at every level of the taxonomy
    pub fn stats(&self) -> CatalogStats {
        let mut stats = CatalogStats {
            categories: self.categories.len(),
            brands: 0,
            models: 0,
            variants: 0,
        };

        for category in self.categories.values() {
            stats.brands += category.brands.len();
            for brand in category.brands.values() {
                stats.models += brand.models.len();
                for model in brand.models.values() {
                    stats.variants += model.variants.len();
                }
            }
        }

        stats
    }

    /// Serialize with 2-space indentation.
    ///
    /// Formatting is cosmetic; readers must not depend on it. Key order
    /// follows insertion order at every level.
    pub fn to_pretty_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
