use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, OrderId, ProductId, UserId};
use domain::{Cart, Order, OrderStatus};
use tokio::sync::RwLock;

use crate::error::{Result, StoreError};
use crate::store::Store;

#[derive(Default)]
struct Inner {
    carts: HashMap<CartId, Cart>,
    /// Index of each user's active cart.
    active: HashMap<UserId, CartId>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory store for tests and local runs.
///
/// All compare-and-set semantics are provided by performing the check and
/// the write under a single write lock.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn get_or_create_active_cart(&self, user_id: UserId) -> Result<Cart> {
        let mut inner = self.inner.write().await;

        if let Some(cart_id) = inner.active.get(&user_id)
            && let Some(cart) = inner.carts.get(cart_id)
        {
            return Ok(cart.clone());
        }

        let cart = Cart::new(user_id);
        inner.active.insert(user_id, cart.id);
        inner.carts.insert(cart.id, cart.clone());
        Ok(cart)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut inner = self.inner.write().await;
        if cart.is_active {
            inner.active.insert(cart.user_id, cart.id);
        }
        inner.carts.insert(cart.id, cart.clone());
        Ok(())
    }

    async fn checkout(&self, cart_id: CartId, order: &Order) -> Result<()> {
        let mut inner = self.inner.write().await;

        let cart = inner
            .carts
            .get_mut(&cart_id)
            .filter(|c| c.is_active)
            .ok_or(StoreError::CartNotActive { cart_id })?;
        cart.is_active = false;
        cart.updated_at = Utc::now();
        let user_id = cart.user_id;

        inner.active.remove(&user_id);
        inner.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.inner.read().await.orders.get(&order_id).cloned())
    }

    async fn get_user_order(&self, order_id: OrderId, user_id: UserId) -> Result<Option<Order>> {
        Ok(self
            .inner
            .read()
            .await
            .orders
            .get(&order_id)
            .filter(|o| o.user_id == user_id)
            .cloned())
    }

    async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>> {
        let inner = self.inner.read().await;
        let mut orders: Vec<Order> = inner.orders.values().cloned().collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn set_payment_session(&self, order_id: OrderId, session_id: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound { order_id })?;
        order.payment_session_id = Some(session_id.to_string());
        Ok(())
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound { order_id })?;

        if order.status != expected {
            return Err(StoreError::StatusConflict {
                expected,
                actual: order.status,
            });
        }

        order.status = next;
        match next {
            OrderStatus::Paid => order.paid_at = Some(Utc::now()),
            OrderStatus::Delivered => order.delivered_at = Some(Utc::now()),
            _ => {}
        }
        Ok(order.clone())
    }

    async fn record_reconciliation(&self, order_id: OrderId, note: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        let order = inner
            .orders
            .get_mut(&order_id)
            .ok_or(StoreError::OrderNotFound { order_id })?;
        order.reconciliation_note = Some(note.to_string());
        Ok(())
    }

    async fn has_delivered_product(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let inner = self.inner.read().await;
        Ok(inner.orders.values().any(|o| {
            o.user_id == user_id
                && o.status == OrderStatus::Delivered
                && o.items.iter().any(|i| i.product_id == product_id)
        }))
    }
}
