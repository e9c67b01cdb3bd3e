//! Payment webhook endpoint.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use serde::Serialize;
use store::Store;

use crate::error::ApiError;
use crate::routes::AppState;

pub const SIGNATURE_HEADER: &str = "x-payment-signature";

#[derive(Serialize)]
pub struct AckResponse {
    pub received: bool,
}

/// POST /webhooks/payment — signed payment event from the processor.
///
/// The signature covers the raw body, so the body is taken as bytes
/// rather than parsed JSON.
#[tracing::instrument(skip(state, headers, body))]
pub async fn receive<S: Store + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<AckResponse>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing signature header".to_string()))?;

    state.webhooks.handle(&body, signature).await?;
    Ok(Json(AckResponse { received: true }))
}
