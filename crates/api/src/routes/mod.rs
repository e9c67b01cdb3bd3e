//! Route handlers and shared application state.

pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod webhook;

use std::sync::Arc;

use checkout::{CartService, CheckoutOrchestrator, WebhookIngestor};
use store::Store;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub carts: CartService<S>,
    pub orchestrator: Arc<CheckoutOrchestrator<S>>,
    pub webhooks: WebhookIngestor<S>,
    pub store: S,
}
