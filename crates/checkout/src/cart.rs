//! Cart mutations.

use std::sync::Arc;

use common::{CartItemId, UserId, VariantId};
use domain::{Cart, NewItem};
use store::Store;
use tracing::instrument;

use crate::error::Result;
use crate::services::catalog::CatalogService;

/// Per-user cart operations.
///
/// All line data comes from the catalog at add-time; the shopper only
/// names a variant and a quantity. Re-adding a variant already in the
/// cart merges quantities and refreshes the snapshotted price.
pub struct CartService<S> {
    store: S,
    catalog: Arc<dyn CatalogService>,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S, catalog: Arc<dyn CatalogService>) -> Self {
        Self { store, catalog }
    }

    /// Returns the user's active cart, creating an empty one if needed.
    #[instrument(skip(self))]
    pub async fn active_cart(&self, user_id: UserId) -> Result<Cart> {
        Ok(self.store.get_or_create_active_cart(user_id).await?)
    }

    /// Adds a catalog variant to the user's active cart.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: UserId,
        product_slug: &str,
        variant_id: VariantId,
        quantity: u32,
    ) -> Result<Cart> {
        let variant = self.catalog.resolve_variant(variant_id).await?;
        let product = self.catalog.resolve_product(product_slug).await?;

        let mut cart = self.store.get_or_create_active_cart(user_id).await?;
        cart.add_item(NewItem {
            product_id: product.product_id,
            variant_id: variant.id,
            product_name: product.product_name,
            variant_name: variant.name,
            sku: variant.sku,
            price: variant.price,
            quantity,
        })?;
        self.store.save_cart(&cart).await?;

        tracing::debug!(
            cart_id = %cart.id,
            variant_id = variant_id.value(),
            quantity,
            "added cart item"
        );
        Ok(cart)
    }

    /// Changes the quantity of a line already in the cart.
    #[instrument(skip(self))]
    pub async fn update_item_quantity(
        &self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<Cart> {
        let mut cart = self.store.get_or_create_active_cart(user_id).await?;
        cart.update_item_quantity(item_id, quantity)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Removes a line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(&self, user_id: UserId, item_id: CartItemId) -> Result<Cart> {
        let mut cart = self.store.get_or_create_active_cart(user_id).await?;
        cart.remove_item(item_id)?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{InMemoryCatalogService, Product, Variant};
    use common::ProductId;
    use domain::{CartError, Money};
    use store::InMemoryStore;

    fn catalog_with_tea() -> Arc<InMemoryCatalogService> {
        let catalog = InMemoryCatalogService::new();
        catalog.insert_variant(Variant {
            id: VariantId::new(11),
            name: "250g".to_string(),
            sku: "TEA-250".to_string(),
            price: Money::from_cents(850),
        });
        catalog.insert_product(
            "green-tea",
            Product {
                product_id: ProductId::new(1),
                product_name: "Green Tea".to_string(),
            },
        );
        Arc::new(catalog)
    }

    #[tokio::test]
    async fn add_item_snapshots_catalog_data() {
        let service = CartService::new(InMemoryStore::new(), catalog_with_tea());
        let user_id = UserId::new();

        let cart = service
            .add_item(user_id, "green-tea", VariantId::new(11), 2)
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        let item = &cart.items[0];
        assert_eq!(item.product_name, "Green Tea");
        assert_eq!(item.sku, "TEA-250");
        assert_eq!(item.price.cents(), 850);
        assert_eq!(cart.total_amount.cents(), 1700);
    }

    #[tokio::test]
    async fn re_adding_a_variant_merges_and_refreshes_price() {
        let catalog = catalog_with_tea();
        let service = CartService::new(InMemoryStore::new(), catalog.clone());
        let user_id = UserId::new();

        service
            .add_item(user_id, "green-tea", VariantId::new(11), 1)
            .await
            .unwrap();

        // Price changes upstream between adds
        catalog.insert_variant(Variant {
            id: VariantId::new(11),
            name: "250g".to_string(),
            sku: "TEA-250".to_string(),
            price: Money::from_cents(900),
        });

        let cart = service
            .add_item(user_id, "green-tea", VariantId::new(11), 2)
            .await
            .unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 3);
        assert_eq!(cart.items[0].price.cents(), 900);
        assert_eq!(cart.total_amount.cents(), 2700);
    }

    #[tokio::test]
    async fn update_and_remove_persist() {
        let service = CartService::new(InMemoryStore::new(), catalog_with_tea());
        let user_id = UserId::new();

        let cart = service
            .add_item(user_id, "green-tea", VariantId::new(11), 2)
            .await
            .unwrap();
        let item_id = cart.items[0].id;

        let updated = service
            .update_item_quantity(user_id, item_id, 5)
            .await
            .unwrap();
        assert_eq!(updated.items[0].quantity, 5);
        assert_eq!(updated.total_amount.cents(), 4250);

        let emptied = service.remove_item(user_id, item_id).await.unwrap();
        assert!(emptied.is_empty());

        let reloaded = service.active_cart(user_id).await.unwrap();
        assert!(reloaded.is_empty());
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let service = CartService::new(InMemoryStore::new(), catalog_with_tea());

        let result = service
            .add_item(UserId::new(), "green-tea", VariantId::new(11), 0)
            .await;
        assert!(matches!(
            result,
            Err(crate::CheckoutError::Cart(CartError::InvalidQuantity { .. }))
        ));
    }

    #[tokio::test]
    async fn catalog_outage_surfaces_as_catalog_error() {
        let catalog = catalog_with_tea();
        catalog.set_fail_lookups(true);
        let service = CartService::new(InMemoryStore::new(), catalog);

        let result = service
            .add_item(UserId::new(), "green-tea", VariantId::new(11), 1)
            .await;
        assert!(matches!(result, Err(crate::CheckoutError::Catalog(_))));
    }
}
