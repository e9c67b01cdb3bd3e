//! Checkout, order, and fulfillment endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{OrderId, ProductId, UserId};
use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};
use store::Store;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize, Default)]
pub struct PayRequest {
    pub success_url: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Serialize)]
pub struct PaymentStartedResponse {
    pub order_id: OrderId,
    /// Where to send the shopper to complete payment.
    pub redirect_url: String,
}

#[derive(Serialize)]
pub struct PayStatusResponse {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub payment_session_id: Option<String>,
}

#[derive(Deserialize)]
pub struct FulfillmentRequest {
    pub status: OrderStatus,
}

#[derive(Serialize)]
pub struct PurchaseVerificationResponse {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub has_purchased: bool,
}

/// POST /checkout — snapshot the active cart into a PENDING order.
#[tracing::instrument(skip(state))]
pub async fn checkout<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<(axum::http::StatusCode, Json<Order>), ApiError> {
    let order = state.orchestrator.checkout(user_id).await?;
    Ok((axum::http::StatusCode::CREATED, Json(order)))
}

/// GET /orders — the caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state.store.list_user_orders(user_id).await?;
    Ok(Json(orders))
}

/// GET /orders/:id — one of the caller's orders.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<Order>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let order = state
        .store
        .get_user_order(order_id, user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("order {order_id} not found")))?;
    Ok(Json(order))
}

/// POST /orders/:id/pay — open a hosted payment session. The body may
/// override the configured success/cancel redirect URLs.
#[tracing::instrument(skip(state, req))]
pub async fn pay<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
    req: Option<Json<PayRequest>>,
) -> Result<Json<PaymentStartedResponse>, ApiError> {
    let order_id = OrderId::from_uuid(id);
    let Json(req) = req.unwrap_or_default();
    let redirect_url = state
        .orchestrator
        .start_payment(user_id, order_id, req.success_url, req.cancel_url)
        .await?;
    Ok(Json(PaymentStartedResponse {
        order_id,
        redirect_url,
    }))
}

/// GET /orders/:id/pay/status — payment state of an order.
#[tracing::instrument(skip(state))]
pub async fn pay_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<PayStatusResponse>, ApiError> {
    let order = state
        .orchestrator
        .pay_status(user_id, OrderId::from_uuid(id))
        .await?;
    Ok(Json(PayStatusResponse {
        order_id: order.id,
        status: order.status,
        payment_session_id: order.payment_session_id,
    }))
}

/// POST /orders/:id/cancel — cancel a PENDING order.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(id): Path<uuid::Uuid>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .orchestrator
        .cancel(user_id, OrderId::from_uuid(id))
        .await?;
    Ok(Json(order))
}

/// GET /admin/orders — every order in the system, newest first.
#[tracing::instrument(skip(state))]
pub async fn admin_list<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let orders = state.store.list_all_orders().await?;
    Ok(Json(orders))
}

/// PATCH /admin/orders/:id/status — advance fulfillment to SHIPPED or
/// DELIVERED.
#[tracing::instrument(skip(state, req))]
pub async fn admin_set_status<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<uuid::Uuid>,
    Json(req): Json<FulfillmentRequest>,
) -> Result<Json<Order>, ApiError> {
    let order = state
        .orchestrator
        .advance_fulfillment(OrderId::from_uuid(id), req.status)
        .await?;
    Ok(Json(order))
}

/// GET /verify-purchase/:user_id/:product_id — whether a delivered
/// order of the user contains the product.
#[tracing::instrument(skip(state))]
pub async fn verify_purchase<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Path((user_id, product_id)): Path<(uuid::Uuid, i64)>,
) -> Result<Json<PurchaseVerificationResponse>, ApiError> {
    let user_id = UserId::from_uuid(user_id);
    let product_id = ProductId::new(product_id);
    let has_purchased = state.store.has_delivered_product(user_id, product_id).await?;
    Ok(Json(PurchaseVerificationResponse {
        user_id,
        product_id,
        has_purchased,
    }))
}
