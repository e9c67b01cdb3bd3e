//! Outbound collaborators.
//!
//! Each collaborator is a trait with an HTTP implementation used in
//! production and an in-memory implementation for tests. The in-memory
//! implementations support failure injection so orchestration paths can
//! be exercised without a network.

pub mod catalog;
pub mod inventory;
pub mod payment;
