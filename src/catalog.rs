//! Read-only view of the org's master data.
//!
//! Matching and detection work on snapshots: a `Vec` fetched once per
//! document, so a catalog sync landing mid-run never changes results
//! within a single document.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::MatchError;

/// One sellable article of the org's catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogSku {
    pub org_id: String,
    pub sku: String,
    pub description: String,
}

/// A known customer of the org, as synced from the ERP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub email: Option<String>,
    pub erp_number: Option<String>,
    pub address: Option<String>,
}

/// Snapshot access to customers and catalog SKUs, scoped by org.
pub trait CatalogReader: Send + Sync {
    fn customers(&self, org_id: &str) -> Result<Vec<Customer>, MatchError>;
    fn skus(&self, org_id: &str) -> Result<Vec<CatalogSku>, MatchError>;
}

/// Catalog held in memory; the production path syncs it from the ERP,
/// tests fill it directly.
#[derive(Default)]
pub struct InMemoryCatalog {
    customers: RwLock<HashMap<String, Vec<Customer>>>,
    skus: RwLock<HashMap<String, Vec<CatalogSku>>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_customer(&self, customer: Customer) {
        let mut map = self.customers.write().unwrap_or_else(|e| e.into_inner());
        map.entry(customer.org_id.clone()).or_default().push(customer);
    }

    pub fn add_sku(&self, sku: CatalogSku) {
        let mut map = self.skus.write().unwrap_or_else(|e| e.into_inner());
        map.entry(sku.org_id.clone()).or_default().push(sku);
    }
}

impl CatalogReader for InMemoryCatalog {
    fn customers(&self, org_id: &str) -> Result<Vec<Customer>, MatchError> {
        let map = self.customers.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(org_id).cloned().unwrap_or_default())
    }

    fn skus(&self, org_id: &str) -> Result<Vec<CatalogSku>, MatchError> {
        let map = self.skus.read().unwrap_or_else(|e| e.into_inner());
        Ok(map.get(org_id).cloned().unwrap_or_default())
    }
}
