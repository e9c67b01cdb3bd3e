//! Persistence layer for carts and orders.
//!
//! The [`Store`] trait is the single seam between the orchestration layer
//! and storage. Two implementations are provided: [`InMemoryStore`] for
//! tests and local runs, and [`PostgresStore`] for deployments.
//!
//! Status changes go through [`Store::transition_order`], a compare-and-set
//! on the current status. That CAS is the serialization point that keeps
//! concurrent webhook deliveries from both observing `PENDING`.

mod error;
mod memory;
mod postgres;
mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use store::Store;
