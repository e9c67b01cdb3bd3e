//! Domain layer for the cart-and-order service.
//!
//! This crate provides the core aggregates:
//! - `Cart`/`CartItem` — the mutable per-user cart with derived total
//! - `Order`/`OrderItem` — the immutable checkout snapshot
//! - `OrderStatus` — the payment/fulfillment state machine
//!
//! It performs no I/O; persistence and orchestration live in the `store`
//! and `checkout` crates.

pub mod cart;
pub mod money;
pub mod order;
pub mod status;

pub use cart::{Cart, CartError, CartItem, NewItem};
pub use money::Money;
pub use order::{Order, OrderError, OrderItem};
pub use status::OrderStatus;
