//! Checkout orchestration for the cart-and-order service.
//!
//! This crate drives the cart → order → payment → inventory sequence:
//! - [`CartService`] mutates the per-user cart, resolving prices through
//!   the catalog collaborator at add-time
//! - [`CheckoutOrchestrator`] snapshots carts into orders, opens payment
//!   sessions, applies payment outcomes, and deducts batch stock
//!   first-expiring-first-out on confirmed payment
//! - [`WebhookIngestor`] verifies and dispatches the processor's signed
//!   asynchronous payment events
//!
//! Outbound collaborators are traits ([`CatalogService`],
//! [`InventoryService`], [`PaymentGateway`]) with reqwest-backed HTTP
//! implementations and in-memory implementations for tests.

pub mod cart;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod webhook;

pub use cart::CartService;
pub use error::{CheckoutError, Result};
pub use orchestrator::{CheckoutOrchestrator, ConfirmOutcome, PaymentRedirects};
pub use services::catalog::{CatalogError, CatalogService, HttpCatalogService, InMemoryCatalogService, Product, Variant};
pub use services::inventory::{
    Batch, HttpInventoryService, InMemoryInventoryService, InventoryError, InventoryService,
};
pub use services::payment::{
    CheckoutSession, CreateSessionRequest, HttpPaymentGateway, InMemoryPaymentGateway,
    PaymentError, PaymentGateway, SessionLineItem,
};
pub use webhook::{SignatureVerifier, WebhookError, WebhookIngestor};
