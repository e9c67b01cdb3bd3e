//! Store error types.

use common::{CartId, OrderId};
use domain::OrderStatus;
use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The cart was already checked out (or never active); the conditional
    /// deactivation found no active row.
    #[error("cart {cart_id} is not active")]
    CartNotActive { cart_id: CartId },

    /// No order exists with the given id (within the caller's scope).
    #[error("order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    /// The compare-and-set on order status lost: the stored status did not
    /// match the expected one.
    #[error("order status is {actual}, expected {expected}")]
    StatusConflict {
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored value could not be interpreted (e.g. an unknown status
    /// string written by a newer schema).
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

/// Convenience alias for store results.
pub type Result<T> = std::result::Result<T, StoreError>;
