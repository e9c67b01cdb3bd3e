//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::{CartItemId, VariantId};
use domain::Cart;
use serde::Deserialize;
use store::Store;

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::routes::AppState;

#[derive(Deserialize)]
pub struct AddItemRequest {
    pub product_slug: String,
    pub variant_id: i64,
    pub quantity: u32,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: u32,
}

/// GET /cart — the caller's active cart, created on first access.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<Cart>, ApiError> {
    let cart = state.carts.active_cart(user_id).await?;
    Ok(Json(cart))
}

/// POST /cart/items — add a catalog variant to the cart.
#[tracing::instrument(skip(state, req))]
pub async fn add_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(req): Json<AddItemRequest>,
) -> Result<(axum::http::StatusCode, Json<Cart>), ApiError> {
    let cart = state
        .carts
        .add_item(
            user_id,
            &req.product_slug,
            VariantId::new(req.variant_id),
            req.quantity,
        )
        .await?;
    Ok((axum::http::StatusCode::CREATED, Json(cart)))
}

/// PATCH /cart/items/:id — change a line's quantity.
#[tracing::instrument(skip(state, req))]
pub async fn update_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(item_id): Path<uuid::Uuid>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .carts
        .update_item_quantity(user_id, CartItemId::from_uuid(item_id), req.quantity)
        .await?;
    Ok(Json(cart))
}

/// DELETE /cart/items/:id — remove a line from the cart.
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Path(item_id): Path<uuid::Uuid>,
) -> Result<Json<Cart>, ApiError> {
    let cart = state
        .carts
        .remove_item(user_id, CartItemId::from_uuid(item_id))
        .await?;
    Ok(Json(cart))
}
