//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::routes::AppState;
use checkout::{
    CartService, CheckoutOrchestrator, HttpCatalogService, HttpInventoryService,
    HttpPaymentGateway, PaymentRedirects, SignatureVerifier, WebhookIngestor,
};
use store::InMemoryStore;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Wire storage and collaborators
    let store = InMemoryStore::new();
    let catalog = Arc::new(
        HttpCatalogService::new(config.catalog_url.clone()).expect("catalog client build failed"),
    );
    let inventory = Arc::new(
        HttpInventoryService::new(config.inventory_url.clone())
            .expect("inventory client build failed"),
    );
    let gateway = Arc::new(
        HttpPaymentGateway::new(config.payment_url.clone(), config.payment_secret_key.clone())
            .expect("payment client build failed"),
    );

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        inventory,
        gateway,
        PaymentRedirects {
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
        },
    ));

    let state = Arc::new(AppState {
        carts: CartService::new(store.clone(), catalog),
        webhooks: WebhookIngestor::new(
            SignatureVerifier::new(config.webhook_secret.clone()),
            orchestrator.clone(),
        ),
        orchestrator,
        store,
    });

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("server shut down gracefully");
}
