//! Payment processor sessions.
//!
//! The processor hosts the actual payment page. We open a session with
//! the order's line items and redirect URLs, store the session id on
//! the order, and learn the outcome later through signed webhooks.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the payment processor.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The processor rejected the request or could not be reached.
    #[error("payment processor error: {0}")]
    Gateway(String),
}

/// One displayed line on the hosted payment page.
#[derive(Debug, Clone, Serialize)]
pub struct SessionLineItem {
    pub name: String,
    /// Unit price in minor currency units.
    pub unit_amount: i64,
    pub quantity: u32,
}

/// Everything needed to open a hosted payment session.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub line_items: Vec<SessionLineItem>,
    pub success_url: String,
    pub cancel_url: String,
}

/// An open session at the processor.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    /// Where to send the shopper to complete payment.
    pub redirect_url: String,
}

/// Access to the payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, PaymentError>;
}

#[derive(Serialize)]
struct SessionBody {
    mode: &'static str,
    line_items: Vec<SessionLineItem>,
    success_url: String,
    cancel_url: String,
    metadata: SessionMetadata,
}

/// Round-trips through the processor so webhooks can name the order.
#[derive(Serialize)]
struct SessionMetadata {
    order_id: OrderId,
    user_id: UserId,
}

#[derive(Deserialize)]
struct SessionResponse {
    id: String,
    url: String,
}

/// HTTP client for the payment processor.
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
}

impl HttpPaymentGateway {
    pub fn new(
        base_url: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Result<Self, PaymentError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into(),
            secret_key: secret_key.into(),
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let url = format!("{}/v1/checkout/sessions", self.base_url);
        let body = SessionBody {
            mode: "payment",
            line_items: request.line_items,
            success_url: request.success_url,
            cancel_url: request.cancel_url,
            metadata: SessionMetadata {
                order_id: request.order_id,
                user_id: request.user_id,
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PaymentError::Gateway(format!(
                "session create returned {}",
                response.status()
            )));
        }

        let session: SessionResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Gateway(e.to_string()))?;

        Ok(CheckoutSession {
            session_id: session.id,
            redirect_url: session.url,
        })
    }
}

/// In-memory processor for tests. Records every session it opens.
#[derive(Default)]
pub struct InMemoryPaymentGateway {
    sessions: Mutex<Vec<CreateSessionRequest>>,
    fail_create: Mutex<bool>,
}

impl InMemoryPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_create(&self, fail: bool) {
        *self.fail_create.lock().unwrap() = fail;
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    /// The most recently opened session request, if any.
    pub fn last_session(&self) -> Option<CreateSessionRequest> {
        self.sessions.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_session(
        &self,
        request: CreateSessionRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if *self.fail_create.lock().unwrap() {
            return Err(PaymentError::Gateway("injected failure".to_string()));
        }

        let mut sessions = self.sessions.lock().unwrap();
        sessions.push(request);
        let session_id = format!("cs_test_{:04}", sessions.len());
        Ok(CheckoutSession {
            redirect_url: format!("https://pay.test/session/{session_id}"),
            session_id,
        })
    }
}
