//! The storage contract shared by all backends.

use async_trait::async_trait;
use common::{CartId, OrderId, ProductId, UserId};
use domain::{Cart, Order, OrderStatus};

use crate::error::Result;

/// Storage for carts and orders.
///
/// Mutating operations are atomic units: `save_cart` replaces a cart and
/// its lines together, `checkout` commits the order insert and the cart
/// deactivation as one, and `transition_order` is a compare-and-set on the
/// stored status.
#[async_trait]
pub trait Store: Send + Sync {
    /// Returns the single active cart for a user, creating an empty one if
    /// none exists. Idempotent.
    async fn get_or_create_active_cart(&self, user_id: UserId) -> Result<Cart>;

    /// Replaces the cart row and all of its lines atomically.
    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    /// Commits a checkout: inserts the order with its items and flips the
    /// source cart inactive, all-or-nothing. The deactivation is
    /// conditional on the cart still being active, so of two concurrent
    /// checkouts exactly one succeeds; the loser gets
    /// [`StoreError::CartNotActive`](crate::StoreError::CartNotActive).
    async fn checkout(&self, cart_id: CartId, order: &Order) -> Result<()>;

    /// Loads an order by id regardless of owner (staff/webhook path).
    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Loads an order only if it belongs to the given user.
    async fn get_user_order(&self, order_id: OrderId, user_id: UserId) -> Result<Option<Order>>;

    /// Lists a user's orders, newest first.
    async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Lists every order, newest first (staff path).
    async fn list_all_orders(&self) -> Result<Vec<Order>>;

    /// Stores the external payment-session reference on an order.
    async fn set_payment_session(&self, order_id: OrderId, session_id: &str) -> Result<()>;

    /// Compare-and-set status transition. Succeeds only when the stored
    /// status equals `expected`; stamps `paid_at` when moving to `PAID` and
    /// `delivered_at` when moving to `DELIVERED`. Returns the updated
    /// order, or [`StoreError::StatusConflict`](crate::StoreError::StatusConflict)
    /// with the actual status when the CAS loses.
    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order>;

    /// Records that a paid order needs manual stock reconciliation.
    async fn record_reconciliation(&self, order_id: OrderId, note: &str) -> Result<()>;

    /// Returns true if the user has a `DELIVERED` order containing the
    /// product.
    async fn has_delivered_product(&self, user_id: UserId, product_id: ProductId) -> Result<bool>;
}
