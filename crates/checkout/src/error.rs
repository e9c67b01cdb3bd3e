//! Checkout error types.

use common::OrderId;
use domain::{CartError, OrderError};
use store::StoreError;
use thiserror::Error;

use crate::services::catalog::CatalogError;
use crate::services::inventory::InventoryError;
use crate::services::payment::PaymentError;

/// Errors that can occur during cart and checkout operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A cart mutation was rejected.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// An order operation was rejected.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Storage error, including checkout and status-transition conflicts.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Catalog collaborator error.
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Inventory collaborator error.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// Payment processor error.
    #[error(transparent)]
    Payment(#[from] PaymentError),

    /// The order does not exist within the caller's scope.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),
}

/// Convenience alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
