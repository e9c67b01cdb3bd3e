//! Signed payment webhooks.
//!
//! The processor delivers payment outcomes asynchronously, signing each
//! delivery with HMAC-SHA256 over `{timestamp}.{raw body}`. The
//! signature header carries `t=<unix seconds>,v1=<hex digest>`. Events
//! are dispatched to the orchestrator. Only an unverifiable signature
//! or an unparseable body rejects a delivery; once a delivery is
//! verified it is always acknowledged, with any processing failure
//! logged and counted instead of bounced back, so the processor never
//! enters a redelivery storm over an internal fault.

use common::OrderId;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use store::Store;
use thiserror::Error;
use tracing::instrument;
use uuid::Uuid;

use crate::orchestrator::CheckoutOrchestrator;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_EVENT_COMPLETED: &str = "checkout.session.completed";
const SIGNED_EVENT_EXPIRED: &str = "checkout.session.expired";
const SIGNED_EVENT_FAILED: &str = "checkout.session.async_payment_failed";

/// Errors that reject a webhook delivery outright.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The signature header is missing pieces or does not verify.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// The body is not a well-formed event.
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Verifies `t=...,v1=...` signatures over webhook bodies.
pub struct SignatureVerifier {
    secret: String,
}

impl SignatureVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Checks a signature header against the raw request body.
    pub fn verify(&self, payload: &[u8], header: &str) -> Result<(), WebhookError> {
        let mut timestamp = None;
        let mut signature = None;
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signature = Some(value),
                _ => {}
            }
        }
        let (timestamp, signature) = match (timestamp, signature) {
            (Some(t), Some(v1)) => (t, v1),
            _ => return Err(WebhookError::InvalidSignature),
        };

        let expected = decode_hex(signature).ok_or(WebhookError::InvalidSignature)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);
        mac.verify_slice(&expected)
            .map_err(|_| WebhookError::InvalidSignature)
    }

    /// Produces the signature header the processor would send for a
    /// body at a given timestamp.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let digest = mac.finalize().into_bytes();
        format!("t={timestamp},v1={}", encode_hex(&digest))
    }
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    let bytes = s.as_bytes();
    if bytes.len() % 2 != 0 {
        return None;
    }
    bytes
        .chunks_exact(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16)?;
            let lo = (pair[1] as char).to_digit(16)?;
            Some((hi as u8) << 4 | lo as u8)
        })
        .collect()
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[derive(Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: EventObject,
}

#[derive(Deserialize)]
struct EventObject {
    #[serde(default)]
    metadata: EventMetadata,
}

#[derive(Deserialize, Default)]
struct EventMetadata {
    order_id: Option<Uuid>,
}

/// Verifies, parses, and dispatches webhook deliveries.
pub struct WebhookIngestor<S> {
    verifier: SignatureVerifier,
    orchestrator: std::sync::Arc<CheckoutOrchestrator<S>>,
}

impl<S: Store> WebhookIngestor<S> {
    pub fn new(
        verifier: SignatureVerifier,
        orchestrator: std::sync::Arc<CheckoutOrchestrator<S>>,
    ) -> Self {
        Self {
            verifier,
            orchestrator,
        }
    }

    /// Handles one delivery.
    ///
    /// Err covers only signature and payload rejections. Everything
    /// after verification is acknowledged: dropped events (unknown
    /// kind, no order reference, order already settled) and internal
    /// processing failures alike, the latter logged at error level and
    /// counted for reconciliation.
    #[instrument(skip(self, payload, signature_header))]
    pub async fn handle(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        self.verifier.verify(payload, signature_header)?;

        let event: Event = serde_json::from_slice(payload)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        metrics::counter!("webhook_events_total", "kind" => event.kind.clone()).increment(1);

        let Some(order_id) = event.data.object.metadata.order_id.map(OrderId::from_uuid) else {
            tracing::warn!(kind = %event.kind, "webhook event without order metadata dropped");
            return Ok(());
        };

        let result = match event.kind.as_str() {
            SIGNED_EVENT_COMPLETED => {
                self.orchestrator.confirm_payment(order_id).await.map(|outcome| {
                    tracing::info!(%order_id, ?outcome, "payment completion processed");
                })
            }
            SIGNED_EVENT_EXPIRED => self.orchestrator.expire_payment(order_id).await,
            SIGNED_EVENT_FAILED => self.orchestrator.fail_payment(order_id).await,
            other => {
                tracing::debug!(kind = %other, "unrecognized webhook event dropped");
                return Ok(());
            }
        };

        match result {
            Ok(()) => {}
            Err(e) if is_unknown_order(&e) => {
                tracing::warn!(%order_id, kind = %event.kind, "webhook event for unknown order dropped");
            }
            // The delivery is verified, so acknowledge it regardless;
            // the failure is recorded here for operators instead of
            // bounced back to the processor.
            Err(e) => {
                tracing::error!(%order_id, kind = %event.kind, error = %e, "webhook event acknowledged but not applied");
                metrics::counter!("webhook_processing_failures_total").increment(1);
            }
        }
        Ok(())
    }
}

fn is_unknown_order(err: &crate::error::CheckoutError) -> bool {
    use crate::error::CheckoutError;
    use store::StoreError;
    matches!(
        err,
        CheckoutError::OrderNotFound(_) | CheckoutError::Store(StoreError::OrderNotFound { .. })
    )
}
