//! Ground-truth inventory sources
//!
//! An inventory yields [`GroundTruthAsset`]s tagged with a source identifier.
//! Loading is asynchronous so file- or network-backed inventories load
//! concurrently; a failed load drops that inventory only.
//!
//! # JSON record format
//! ```json
//! [{ "id": "P-1", "lat": 47.61, "lon": -122.33,
//!    "inspection_date": "2025-04-01", "status": "in_service", "source": "utility" }]
//! ```
//! `inspection_date`, `status` and `source` are optional; a missing `source`
//! falls back to the inventory's name. Rows with out-of-range coordinates are
//! skipped and counted in [`LoadReport::rejected`].

use crate::error::{FusionError, Result};
use crate::geodesy::GeoPoint;
use crate::types::GroundTruthAsset;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// A ground-truth inventory
#[async_trait::async_trait]
pub trait InventorySource: Send + Sync {
    /// Inventory name for logs, events and the default source tag
    fn name(&self) -> &str;

    /// Load every valid asset
    ///
    /// # Errors
    /// `SourceLoad` when the inventory cannot be read or parsed.
    async fn load(&self) -> Result<LoadReport>;
}

/// Outcome of loading one inventory
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadReport {
    pub assets: Vec<GroundTruthAsset>,
    /// Rows present in the source but dropped as invalid
    pub rejected: usize,
}

impl LoadReport {
    pub fn complete(assets: Vec<GroundTruthAsset>) -> Self {
        Self { assets, rejected: 0 }
    }
}

/// Inventory held in memory
#[derive(Debug, Clone)]
pub struct InMemoryInventory {
    name: String,
    assets: Vec<GroundTruthAsset>,
}

impl InMemoryInventory {
    pub fn new(name: impl Into<String>, assets: Vec<GroundTruthAsset>) -> Self {
        Self {
            name: name.into(),
            assets,
        }
    }
}

#[async_trait::async_trait]
impl InventorySource for InMemoryInventory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<LoadReport> {
        Ok(LoadReport::complete(self.assets.clone()))
    }
}

/// One row of a JSON inventory file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub inspection_date: Option<NaiveDate>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl InventoryRecord {
    /// Convert to an asset, tagging with `default_source` when the row has none
    pub fn into_asset(self, default_source: &str) -> Result<GroundTruthAsset> {
        let location = GeoPoint::new(self.lat, self.lon)?;
        Ok(GroundTruthAsset {
            id: self.id,
            location,
            inspection_date: self.inspection_date,
            status: self.status,
            source: self.source.unwrap_or_else(|| default_source.to_string()),
        })
    }
}

/// Inventory stored as a JSON array of [`InventoryRecord`]s
#[derive(Debug, Clone)]
pub struct JsonInventory {
    name: String,
    path: PathBuf,
}

impl JsonInventory {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    fn load_error(&self, message: impl std::fmt::Display) -> FusionError {
        FusionError::SourceLoad {
            source_name: self.name.clone(),
            message: format!("{}: {}", self.path.display(), message),
        }
    }
}

#[async_trait::async_trait]
impl InventorySource for JsonInventory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn load(&self) -> Result<LoadReport> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| self.load_error(e))?;
        let records: Vec<InventoryRecord> =
            serde_json::from_slice(&bytes).map_err(|e| self.load_error(e))?;

        let total = records.len();
        let assets: Vec<GroundTruthAsset> = records
            .into_iter()
            .filter_map(|record| {
                let id = record.id.clone();
                match record.into_asset(&self.name) {
                    Ok(asset) => Some(asset),
                    Err(e) => {
                        warn!(source = %self.name, record = %id, error = %e, "Skipping invalid inventory record");
                        None
                    }
                }
            })
            .collect();

        let rejected = total - assets.len();
        debug!(source = %self.name, records = total, valid = assets.len(), rejected, "Inventory file parsed");
        Ok(LoadReport { assets, rejected })
    }
}
