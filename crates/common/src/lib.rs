//! Shared identifier types used across the cart-and-order service.

mod types;

pub use types::{BatchId, CartId, CartItemId, OrderId, ProductId, UserId, VariantId};
