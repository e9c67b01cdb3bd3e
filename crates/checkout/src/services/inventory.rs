//! Inventory batch access.
//!
//! Stock lives in dated batches owned by the inventory service. On a
//! confirmed payment the orchestrator reads a variant's active batches,
//! orders them by expiry date, and writes back reduced quantities.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use common::{BatchId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the inventory collaborator.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// The inventory service could not be reached or gave a bad response.
    #[error("inventory service unavailable: {0}")]
    Unavailable(String),

    /// A batch quantity write was rejected.
    #[error("batch update failed for batch {batch_id}")]
    UpdateFailed { batch_id: BatchId },
}

/// One dated stock batch for a variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub batch_id: BatchId,
    pub qty: u32,
    pub exp_date: NaiveDate,
}

/// Read and write access to batch stock.
#[async_trait]
pub trait InventoryService: Send + Sync {
    /// Returns the active batches holding stock for a variant, in no
    /// particular order.
    async fn active_batches(&self, variant_id: VariantId) -> Result<Vec<Batch>, InventoryError>;

    /// Sets a batch's remaining quantity.
    async fn set_batch_quantity(&self, batch_id: BatchId, qty: u32) -> Result<(), InventoryError>;
}

/// HTTP client for the inventory service.
pub struct HttpInventoryService {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct BatchQuantityUpdate {
    qty: u32,
}

impl HttpInventoryService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, InventoryError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl InventoryService for HttpInventoryService {
    async fn active_batches(&self, variant_id: VariantId) -> Result<Vec<Batch>, InventoryError> {
        let url = format!(
            "{}/batches?variant={}&is_active=true",
            self.base_url,
            variant_id.value()
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InventoryError::Unavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))
    }

    async fn set_batch_quantity(&self, batch_id: BatchId, qty: u32) -> Result<(), InventoryError> {
        let url = format!("{}/batches/{}", self.base_url, batch_id.value());
        let response = self
            .client
            .patch(&url)
            .json(&BatchQuantityUpdate { qty })
            .send()
            .await
            .map_err(|e| InventoryError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(InventoryError::UpdateFailed { batch_id });
        }
        Ok(())
    }
}

/// In-memory inventory for tests, with failure injection.
#[derive(Default)]
pub struct InMemoryInventoryService {
    batches: RwLock<HashMap<i64, Vec<Batch>>>,
    fail_list: RwLock<bool>,
    fail_update_for: RwLock<Option<BatchId>>,
}

impl InMemoryInventoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_batch(&self, variant_id: VariantId, batch: Batch) {
        self.batches
            .write()
            .unwrap()
            .entry(variant_id.value())
            .or_default()
            .push(batch);
    }

    /// Current quantity of a batch, if it exists.
    pub fn batch_qty(&self, batch_id: BatchId) -> Option<u32> {
        self.batches
            .read()
            .unwrap()
            .values()
            .flatten()
            .find(|b| b.batch_id == batch_id)
            .map(|b| b.qty)
    }

    pub fn set_fail_list(&self, fail: bool) {
        *self.fail_list.write().unwrap() = fail;
    }

    /// Makes quantity writes to one specific batch fail.
    pub fn set_fail_update_for(&self, batch_id: Option<BatchId>) {
        *self.fail_update_for.write().unwrap() = batch_id;
    }
}

#[async_trait]
impl InventoryService for InMemoryInventoryService {
    async fn active_batches(&self, variant_id: VariantId) -> Result<Vec<Batch>, InventoryError> {
        if *self.fail_list.read().unwrap() {
            return Err(InventoryError::Unavailable("injected failure".to_string()));
        }
        Ok(self
            .batches
            .read()
            .unwrap()
            .get(&variant_id.value())
            .map(|batches| batches.iter().filter(|b| b.qty > 0).cloned().collect())
            .unwrap_or_default())
    }

    async fn set_batch_quantity(&self, batch_id: BatchId, qty: u32) -> Result<(), InventoryError> {
        if *self.fail_update_for.read().unwrap() == Some(batch_id) {
            return Err(InventoryError::UpdateFailed { batch_id });
        }
        let mut batches = self.batches.write().unwrap();
        let batch = batches
            .values_mut()
            .flatten()
            .find(|b| b.batch_id == batch_id)
            .ok_or(InventoryError::UpdateFailed { batch_id })?;
        batch.qty = qty;
        Ok(())
    }
}
