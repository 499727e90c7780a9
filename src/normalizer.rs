//! Device record normalization.
//!
//! Pure functions that map one raw upstream device record to a
//! (category, brand, model, variants) tuple. All classification is heuristic
//! string matching; the token vocabularies are named constants so they can be
//! extended without touching the control flow.

use crate::device_api::DeviceRecord;
use serde::Serialize;
use std::fmt;

/// Storage capacity tokens stripped from the end of device names
pub const STORAGE_SIZE_TOKENS: &[&str] =
    &["16GB", "32GB", "64GB", "128GB", "256GB", "512GB", "1TB"];

/// Color tokens stripped from the end of device names
pub const COLOR_TOKENS: &[&str] = &[
    "Black", "White", "Blue", "Red", "Gold", "Silver", "Space Gray", "Titanium",
];

/// Name fragments that classify a device as a tablet
const TABLET_MARKERS: &[&str] = &["tablet", "ipad", "tab"];

/// Name fragments that classify a device as a smartwatch
const WATCH_MARKERS: &[&str] = &["watch", "band"];

/// Device category in the catalog taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    Phone,
    Tablet,
    Smartwatch,
}

impl DeviceCategory {
    /// Catalog key for this category
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceCategory::Phone => "phone",
            DeviceCategory::Tablet => "tablet",
            DeviceCategory::Smartwatch => "smartwatch",
        }
    }
}

impl fmt::Display for DeviceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device record reduced to its catalog tuple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDevice {
    pub category: DeviceCategory,
    pub brand: String,
    pub model: String,
    pub variants: Vec<String>,
}

/// Classify a device name into a category.
///
/// Case-insensitive substring match; tablet markers are checked before watch
/// markers, and phone is the default.
pub fn categorize(name: &str) -> DeviceCategory {
    let lower = name.to_lowercase();

    if TABLET_MARKERS.iter().any(|m| lower.contains(m)) {
        DeviceCategory::Tablet
    } else if WATCH_MARKERS.iter().any(|m| lower.contains(m)) {
        DeviceCategory::Smartwatch
    } else {
        DeviceCategory::Phone
    }
}

/// Extract a model name from a device name.
///
/// Strips a case-insensitive leading brand prefix, then trailing storage-size
/// and color tokens (whitespace-delimited), and trims. Falls back to the
/// original device name if stripping leaves nothing.
pub fn extract_model_name(device_name: &str, brand: &str) -> String {
    let original = device_name.trim();
    let mut model = original;

    if !brand.is_empty()
        && model.len() >= brand.len()
        && model.is_char_boundary(brand.len())
        && model[..brand.len()].eq_ignore_ascii_case(brand)
    {
        model = model[brand.len()..].trim_start();
    }

    // Device names commonly end in "<size> <color>"; strip until neither
    // vocabulary matches the tail.
    loop {
        if let Some(stripped) = strip_trailing_token(model, STORAGE_SIZE_TOKENS) {
            model = stripped;
            continue;
        }
        if let Some(stripped) = strip_trailing_token(model, COLOR_TOKENS) {
            model = stripped;
            continue;
        }
        break;
    }

    let model = model.trim();
    if model.is_empty() {
        original.to_string()
    } else {
        model.to_string()
    }
}

/// Strip one trailing vocabulary token, requiring whitespace before it
fn strip_trailing_token<'a>(name: &'a str, vocabulary: &[&str]) -> Option<&'a str> {
    for token in vocabulary {
        if name.len() <= token.len() {
            continue;
        }
        let split_at = name.len() - token.len();
        if !name.is_char_boundary(split_at) {
            continue;
        }
        let (head, tail) = name.split_at(split_at);
        if tail.eq_ignore_ascii_case(token)
            && head.chars().last().is_some_and(char::is_whitespace)
        {
            return Some(head.trim_end());
        }
    }
    None
}

/// Split a comma-separated storage descriptor into variant tokens.
///
/// Absent or empty descriptors yield an empty list.
pub fn extract_storage_variants(storage: Option<&str>) -> Vec<String> {
    match storage {
        Some(field) => field
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(String::from)
            .collect(),
        None => Vec::new(),
    }
}

/// Resolve the brand for a device record.
///
/// Precedence: nested brand name, manufacturer field, flat brand-name field,
/// then the manufacturer currently being iterated. Blank values are treated
/// as absent at every step.
pub fn resolve_brand(device: &DeviceRecord, current_manufacturer: &str) -> String {
    let nested = device.brand.as_ref().and_then(|b| b.name.as_deref());

    non_blank(nested)
        .or_else(|| non_blank(device.manufacturer.as_deref()))
        .or_else(|| non_blank(device.brand_name.as_deref()))
        .unwrap_or_else(|| current_manufacturer.trim())
        .to_string()
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Normalize one raw device record into its catalog tuple.
///
/// When the record carries no comma-separated storage list, a single
/// synthetic variant `"{model} {rawStorageOrEmpty}"` (trimmed) stands in;
/// with no storage info at all this degrades to the bare model name, which
/// the catalog treats as the "no storage info" sentinel.
pub fn normalize(device: &DeviceRecord, current_manufacturer: &str) -> NormalizedDevice {
    let brand = resolve_brand(device, current_manufacturer);
    let category = categorize(&device.name);
    let model = extract_model_name(&device.name, &brand);

    let mut variants = extract_storage_variants(device.storage.as_deref());
    if variants.is_empty() {
        let synthetic = format!("{} {}", model, device.storage.as_deref().unwrap_or(""))
            .trim()
            .to_string();
        if !synthetic.is_empty() {
            variants.push(synthetic);
        }
    }

    NormalizedDevice {
        category,
        brand,
        model,
        variants,
    }
}
