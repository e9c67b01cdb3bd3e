//! Catalog lookups.
//!
//! The catalog owns product and variant data; the cart never trusts
//! client-supplied names or prices. Every add-to-cart resolves the
//! variant here and snapshots what the catalog returned.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use common::{ProductId, VariantId};
use domain::Money;
use serde::Deserialize;
use thiserror::Error;

/// Errors from the catalog collaborator.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog service could not be reached or returned a server error.
    #[error("catalog service unavailable: {0}")]
    Unavailable(String),

    /// The catalog responded but the payload could not be decoded.
    #[error("malformed catalog response: {0}")]
    Malformed(String),

    /// The requested product or variant does not exist.
    #[error("catalog entry not found: {0}")]
    NotFound(String),
}

/// A sellable variant as the catalog describes it.
#[derive(Debug, Clone, Deserialize)]
pub struct Variant {
    pub id: VariantId,
    pub name: String,
    pub sku: String,
    pub price: Money,
}

/// Product identity for a variant's parent.
#[derive(Debug, Clone, Deserialize)]
pub struct Product {
    pub product_id: ProductId,
    pub product_name: String,
}

/// Read access to the catalog service.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Resolves a variant's current name, SKU, and price.
    async fn resolve_variant(&self, variant_id: VariantId) -> Result<Variant, CatalogError>;

    /// Resolves the product a slug refers to.
    async fn resolve_product(&self, slug: &str) -> Result<Product, CatalogError>;
}

/// HTTP client for the catalog service.
pub struct HttpCatalogService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCatalogService {
    pub fn new(base_url: impl Into<String>) -> Result<Self, CatalogError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        missing: &str,
    ) -> Result<T, CatalogError> {
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(missing.to_string()));
        }
        if !response.status().is_success() {
            return Err(CatalogError::Unavailable(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| CatalogError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl CatalogService for HttpCatalogService {
    async fn resolve_variant(&self, variant_id: VariantId) -> Result<Variant, CatalogError> {
        let url = format!("{}/variants/{}", self.base_url, variant_id.value());
        self.get_json(url, &format!("variant {}", variant_id.value()))
            .await
    }

    async fn resolve_product(&self, slug: &str) -> Result<Product, CatalogError> {
        let url = format!("{}/products/{slug}", self.base_url);
        self.get_json(url, &format!("product {slug}")).await
    }
}

/// In-memory catalog for tests, with failure injection.
#[derive(Default)]
pub struct InMemoryCatalogService {
    variants: RwLock<HashMap<i64, Variant>>,
    products: RwLock<HashMap<String, Product>>,
    fail_lookups: RwLock<bool>,
}

impl InMemoryCatalogService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_variant(&self, variant: Variant) {
        self.variants
            .write()
            .unwrap()
            .insert(variant.id.value(), variant);
    }

    pub fn insert_product(&self, slug: &str, product: Product) {
        self.products
            .write()
            .unwrap()
            .insert(slug.to_string(), product);
    }

    /// Makes all subsequent lookups fail as unavailable.
    pub fn set_fail_lookups(&self, fail: bool) {
        *self.fail_lookups.write().unwrap() = fail;
    }

    fn check_available(&self) -> Result<(), CatalogError> {
        if *self.fail_lookups.read().unwrap() {
            return Err(CatalogError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogService for InMemoryCatalogService {
    async fn resolve_variant(&self, variant_id: VariantId) -> Result<Variant, CatalogError> {
        self.check_available()?;
        self.variants
            .read()
            .unwrap()
            .get(&variant_id.value())
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("variant {}", variant_id.value())))
    }

    async fn resolve_product(&self, slug: &str) -> Result<Product, CatalogError> {
        self.check_available()?;
        self.products
            .read()
            .unwrap()
            .get(slug)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("product {slug}")))
    }
}
