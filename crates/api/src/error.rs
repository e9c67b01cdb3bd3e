//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CatalogError, CheckoutError, WebhookError};
use domain::{CartError, OrderError};
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or unusable caller identity.
    Unauthorized,
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// Checkout pipeline error.
    Checkout(CheckoutError),
    /// Webhook delivery error.
    Webhook(WebhookError),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "missing or invalid X-User-Id header".to_string(),
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Checkout(err) => checkout_error_to_response(err),
            ApiError::Webhook(err) => webhook_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn checkout_error_to_response(err: CheckoutError) -> (StatusCode, String) {
    let status = match &err {
        CheckoutError::Cart(CartError::InvalidQuantity { .. }) => StatusCode::BAD_REQUEST,
        CheckoutError::Cart(CartError::ItemNotFound { .. }) => StatusCode::NOT_FOUND,
        CheckoutError::Order(order_err) => match order_err {
            OrderError::EmptyCart | OrderError::InvalidFulfillmentTarget { .. } => {
                StatusCode::BAD_REQUEST
            }
            OrderError::AlreadyProcessed { .. } | OrderError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
        },
        CheckoutError::Store(store_err) => match store_err {
            StoreError::CartNotActive { .. } | StoreError::StatusConflict { .. } => {
                StatusCode::CONFLICT
            }
            StoreError::OrderNotFound { .. } => StatusCode::NOT_FOUND,
            StoreError::Database(_) | StoreError::Corrupt(_) => {
                tracing::error!(error = %store_err, "storage failure");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
        CheckoutError::Catalog(catalog_err) => match catalog_err {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            CatalogError::Malformed(_) => StatusCode::BAD_GATEWAY,
        },
        CheckoutError::Inventory(_) => StatusCode::SERVICE_UNAVAILABLE,
        CheckoutError::Payment(_) => StatusCode::BAD_GATEWAY,
        CheckoutError::OrderNotFound(_) => StatusCode::NOT_FOUND,
    };
    (status, err.to_string())
}

fn webhook_error_to_response(err: WebhookError) -> (StatusCode, String) {
    match &err {
        WebhookError::InvalidSignature | WebhookError::MalformedPayload(_) => {
            (StatusCode::BAD_REQUEST, err.to_string())
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        ApiError::Checkout(err)
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::Checkout(CheckoutError::Store(err))
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        ApiError::Webhook(err)
    }
}
