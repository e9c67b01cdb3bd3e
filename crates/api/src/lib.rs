//! HTTP API server with observability for the cart-and-order service.
//!
//! Provides REST endpoints for cart management, checkout, payment, and
//! fulfillment, with structured logging (tracing) and Prometheus
//! metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use checkout::{
    CartService, CheckoutOrchestrator, InMemoryCatalogService, InMemoryInventoryService,
    InMemoryPaymentGateway, PaymentRedirects, SignatureVerifier, WebhookIngestor,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::{InMemoryStore, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/cart", get(routes::cart::get::<S>))
        .route("/cart/items", post(routes::cart::add_item::<S>))
        .route("/cart/items/{id}", patch(routes::cart::update_item::<S>))
        .route("/cart/items/{id}", delete(routes::cart::remove_item::<S>))
        .route("/checkout", post(routes::orders::checkout::<S>))
        .route("/orders", get(routes::orders::list::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/pay", post(routes::orders::pay::<S>))
        .route("/orders/{id}/pay/status", get(routes::orders::pay_status::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/webhooks/payment", post(routes::webhook::receive::<S>))
        .route("/admin/orders", get(routes::orders::admin_list::<S>))
        .route(
            "/admin/orders/{id}/status",
            patch(routes::orders::admin_set_status::<S>),
        )
        .route(
            "/verify-purchase/{user_id}/{product_id}",
            get(routes::orders::verify_purchase::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// In-memory application state plus handles to its collaborators, for
/// tests and local development.
pub struct DefaultState {
    pub state: Arc<AppState<InMemoryStore>>,
    pub catalog: Arc<InMemoryCatalogService>,
    pub inventory: Arc<InMemoryInventoryService>,
    pub gateway: Arc<InMemoryPaymentGateway>,
}

/// Creates application state backed entirely by in-memory
/// implementations.
pub fn create_default_state(webhook_secret: &str) -> DefaultState {
    let store = InMemoryStore::new();
    let catalog = Arc::new(InMemoryCatalogService::new());
    let inventory = Arc::new(InMemoryInventoryService::new());
    let gateway = Arc::new(InMemoryPaymentGateway::new());

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        inventory.clone(),
        gateway.clone(),
        PaymentRedirects {
            success_url: "http://localhost:3000/pay/success".to_string(),
            cancel_url: "http://localhost:3000/pay/cancel".to_string(),
        },
    ));

    let state = Arc::new(AppState {
        carts: CartService::new(store.clone(), catalog.clone()),
        webhooks: WebhookIngestor::new(
            SignatureVerifier::new(webhook_secret),
            orchestrator.clone(),
        ),
        orchestrator,
        store,
    });

    DefaultState {
        state,
        catalog,
        inventory,
        gateway,
    }
}
