//! Cart aggregate: a mutable per-user collection of prospective purchase
//! lines with a derived total.

use chrono::{DateTime, Utc};
use common::{CartId, CartItemId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

/// Errors raised by cart mutations.
#[derive(Debug, Error)]
pub enum CartError {
    /// Quantity must be a positive integer.
    #[error("invalid quantity: {quantity}")]
    InvalidQuantity { quantity: u32 },

    /// The referenced line does not belong to this cart.
    #[error("cart item not found: {item_id}")]
    ItemNotFound { item_id: CartItemId },
}

/// One line per distinct variant within a cart.
///
/// Name, SKU, and price are denormalized snapshots of the catalog at
/// add-time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    /// Unit price at the moment the line was last added.
    pub price: Money,
    pub quantity: u32,
    pub created_at: DateTime<Utc>,
}

impl CartItem {
    /// Returns `price * quantity` for this line.
    pub fn subtotal(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// A resolved catalog line ready to be merged into a cart.
#[derive(Debug, Clone)]
pub struct NewItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub price: Money,
    pub quantity: u32,
}

/// The per-user cart. At most one active cart exists per user; checkout
/// deactivates it rather than deleting it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    pub id: CartId,
    pub user_id: UserId,
    /// Derived: always `Σ item.price * item.quantity`. Maintained by the
    /// mutation methods below, never left stale.
    pub total_amount: Money,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub items: Vec<CartItem>,
}

impl Cart {
    /// Creates an empty active cart for a user.
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            id: CartId::new(),
            user_id,
            total_amount: Money::zero(),
            is_active: true,
            created_at: now,
            updated_at: now,
            items: Vec::new(),
        }
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up a line by id.
    pub fn item(&self, item_id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    /// Inserts a new line, or merges into the existing line for the same
    /// variant: quantity is incremented and the price refreshed to the
    /// newly resolved one. Returns the id of the affected line.
    pub fn add_item(&mut self, new: NewItem) -> Result<CartItemId, CartError> {
        if new.quantity == 0 {
            return Err(CartError::InvalidQuantity {
                quantity: new.quantity,
            });
        }

        let id = if let Some(existing) = self
            .items
            .iter_mut()
            .find(|i| i.variant_id == new.variant_id)
        {
            existing.quantity += new.quantity;
            existing.price = new.price;
            existing.id
        } else {
            let item = CartItem {
                id: CartItemId::new(),
                product_id: new.product_id,
                variant_id: new.variant_id,
                product_name: new.product_name,
                variant_name: new.variant_name,
                sku: new.sku,
                price: new.price,
                quantity: new.quantity,
                created_at: Utc::now(),
            };
            let id = item.id;
            self.items.push(item);
            id
        };

        self.recompute_total();
        Ok(id)
    }

    /// Replaces the quantity on an existing line.
    pub fn update_item_quantity(
        &mut self,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let item = self
            .items
            .iter_mut()
            .find(|i| i.id == item_id)
            .ok_or(CartError::ItemNotFound { item_id })?;
        item.quantity = quantity;

        self.recompute_total();
        Ok(())
    }

    /// Deletes a line.
    pub fn remove_item(&mut self, item_id: CartItemId) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.id != item_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound { item_id });
        }

        self.recompute_total();
        Ok(())
    }

    /// Recomputes the derived total from the current lines and bumps
    /// `updated_at`. Called after every line mutation.
    pub fn recompute_total(&mut self) {
        self.total_amount = self.items.iter().map(CartItem::subtotal).sum();
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn widget(variant: i64, price: i64, quantity: u32) -> NewItem {
        NewItem {
            product_id: ProductId::new(1),
            variant_id: VariantId::new(variant),
            product_name: "Widget".to_string(),
            variant_name: format!("Widget v{variant}"),
            sku: format!("WID-{variant}"),
            price: Money::from_cents(price),
            quantity,
        }
    }

    #[test]
    fn new_cart_is_active_and_empty() {
        let cart = Cart::new(UserId::new());
        assert!(cart.is_active);
        assert!(cart.is_empty());
        assert_eq!(cart.total_amount, Money::zero());
    }

    #[test]
    fn add_item_recomputes_total() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 500, 2)).unwrap();
        cart.add_item(widget(2, 300, 1)).unwrap();

        assert_eq!(cart.items.len(), 2);
        assert_eq!(cart.total_amount.cents(), 1300);
    }

    #[test]
    fn add_same_variant_merges_and_refreshes_price() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 500, 2)).unwrap();
        cart.add_item(widget(1, 450, 3)).unwrap();

        assert_eq!(cart.items.len(), 1);
        let item = &cart.items[0];
        assert_eq!(item.quantity, 5);
        assert_eq!(item.price.cents(), 450);
        assert_eq!(cart.total_amount.cents(), 2250);
    }

    #[test]
    fn add_zero_quantity_rejected() {
        let mut cart = Cart::new(UserId::new());
        let result = cart.add_item(widget(1, 500, 0));
        assert!(matches!(result, Err(CartError::InvalidQuantity { .. })));
        assert!(cart.is_empty());
    }

    #[test]
    fn update_quantity_recomputes_total() {
        let mut cart = Cart::new(UserId::new());
        let item_id = cart.add_item(widget(1, 500, 2)).unwrap();

        cart.update_item_quantity(item_id, 4).unwrap();
        assert_eq!(cart.total_amount.cents(), 2000);
    }

    #[test]
    fn update_quantity_to_zero_rejected() {
        let mut cart = Cart::new(UserId::new());
        let item_id = cart.add_item(widget(1, 500, 2)).unwrap();

        let result = cart.update_item_quantity(item_id, 0);
        assert!(matches!(result, Err(CartError::InvalidQuantity { .. })));
        assert_eq!(cart.total_amount.cents(), 1000);
    }

    #[test]
    fn update_unknown_item_rejected() {
        let mut cart = Cart::new(UserId::new());
        let result = cart.update_item_quantity(CartItemId::new(), 2);
        assert!(matches!(result, Err(CartError::ItemNotFound { .. })));
    }

    #[test]
    fn remove_item_recomputes_total() {
        let mut cart = Cart::new(UserId::new());
        let first = cart.add_item(widget(1, 500, 2)).unwrap();
        cart.add_item(widget(2, 300, 1)).unwrap();

        cart.remove_item(first).unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total_amount.cents(), 300);
    }

    #[test]
    fn remove_unknown_item_rejected() {
        let mut cart = Cart::new(UserId::new());
        cart.add_item(widget(1, 500, 1)).unwrap();
        let result = cart.remove_item(CartItemId::new());
        assert!(matches!(result, Err(CartError::ItemNotFound { .. })));
        assert_eq!(cart.items.len(), 1);
    }

    #[test]
    fn total_invariant_holds_across_mutation_sequences() {
        let mut cart = Cart::new(UserId::new());
        let a = cart.add_item(widget(1, 199, 3)).unwrap();
        let b = cart.add_item(widget(2, 999, 1)).unwrap();
        cart.update_item_quantity(a, 1).unwrap();
        cart.add_item(widget(1, 249, 2)).unwrap();
        cart.remove_item(b).unwrap();

        let expected: i64 = cart
            .items
            .iter()
            .map(|i| i.price.cents() * i64::from(i.quantity))
            .sum();
        assert_eq!(cart.total_amount.cents(), expected);
    }
}
