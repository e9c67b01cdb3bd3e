//! Order aggregate: the immutable checkout snapshot of a cart, tracked
//! through payment and fulfillment.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId, VariantId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::cart::Cart;
use crate::money::Money;
use crate::status::OrderStatus;

/// Errors raised by order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// Checkout requires at least one cart line.
    #[error("cart is empty")]
    EmptyCart,

    /// The order has left `PENDING` and no longer accepts this operation.
    #[error("order already processed (status {status})")]
    AlreadyProcessed { status: OrderStatus },

    /// The requested status change is not in the transition table.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Staff updates only accept fulfillment statuses.
    #[error("invalid fulfillment target: {target}")]
    InvalidFulfillmentTarget { target: OrderStatus },
}

/// An immutable line snapshot copied from a cart item at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    pub product_id: ProductId,
    pub variant_id: VariantId,
    pub product_name: String,
    pub variant_name: String,
    pub sku: String,
    pub price: Money,
    pub quantity: u32,
}

impl OrderItem {
    /// Returns `price * quantity` for this line.
    pub fn subtotal(&self) -> Money {
        self.price.multiply(self.quantity)
    }
}

/// The unit of payment and fulfillment tracking.
///
/// The total is copied from the cart at snapshot time and never recomputed
/// from items afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    /// Human-readable unique reference, `ORD-` plus 8 hex chars.
    pub order_number: String,
    pub status: OrderStatus,
    pub total_amount: Money,
    /// External payment-session reference, set when a payment attempt
    /// starts.
    pub payment_session_id: Option<String>,
    /// Set when a confirmed payment could not fully deduct stock; carries
    /// the detail needed for manual reconciliation.
    pub reconciliation_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub items: Vec<OrderItem>,
}

impl Order {
    /// Snapshots a cart into a new `PENDING` order.
    ///
    /// Copies every line into an independent [`OrderItem`] and the cart
    /// total into `total_amount`. The cart itself is untouched; the caller
    /// is responsible for deactivating it in the same storage transaction.
    pub fn from_cart(cart: &Cart) -> Result<Self, OrderError> {
        if cart.is_empty() {
            return Err(OrderError::EmptyCart);
        }

        let items = cart
            .items
            .iter()
            .map(|item| OrderItem {
                product_id: item.product_id,
                variant_id: item.variant_id,
                product_name: item.product_name.clone(),
                variant_name: item.variant_name.clone(),
                sku: item.sku.clone(),
                price: item.price,
                quantity: item.quantity,
            })
            .collect();

        Ok(Self {
            id: OrderId::new(),
            user_id: cart.user_id,
            order_number: generate_order_number(),
            status: OrderStatus::Pending,
            total_amount: cart.total_amount,
            payment_session_id: None,
            reconciliation_note: None,
            created_at: Utc::now(),
            paid_at: None,
            delivered_at: None,
            items,
        })
    }

    /// Returns true if the order still awaits a payment outcome.
    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

/// Generates a collision-resistant human-readable order number.
fn generate_order_number() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("ORD-{}", hex[..8].to_uppercase())
}
