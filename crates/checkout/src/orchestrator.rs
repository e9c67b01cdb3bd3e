//! Checkout-to-fulfillment orchestration.
//!
//! The orchestrator owns the order lifecycle after the cart:
//! snapshotting carts into orders, opening payment sessions, applying
//! processor outcomes, deducting batch stock, and advancing
//! fulfillment. Every status change goes through the store's
//! compare-and-set, so replayed webhooks and concurrent admin actions
//! resolve to exactly one winner.

use std::sync::Arc;

use common::{BatchId, OrderId, UserId, VariantId};
use domain::{Order, OrderError, OrderStatus};
use store::{Store, StoreError};
use tracing::instrument;

use crate::error::{CheckoutError, Result};
use crate::services::inventory::InventoryService;
use crate::services::payment::{CreateSessionRequest, PaymentGateway, SessionLineItem};

/// Where the processor sends the shopper after the hosted page.
#[derive(Debug, Clone)]
pub struct PaymentRedirects {
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of applying a payment confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// Payment applied and stock fully deducted.
    Confirmed,
    /// The order had already left PENDING; nothing was changed.
    AlreadySettled,
    /// Payment applied but stock could not be fully deducted; a
    /// reconciliation note was recorded on the order.
    NeedsReconciliation,
}

/// A deduction attempt that could not complete.
#[derive(Debug)]
struct DeductionShortfall {
    variant_id: VariantId,
    /// Units still owed for the variant when the attempt stopped.
    outstanding: u32,
    /// Writes that had already been committed, oldest batch first.
    applied: Vec<(BatchId, u32)>,
    cause: String,
}

impl DeductionShortfall {
    fn reconciliation_note(&self) -> String {
        let applied = self
            .applied
            .iter()
            .map(|(batch_id, taken)| format!("batch {batch_id} -{taken}"))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "variant {}: {} unit(s) not deducted ({}); applied: [{}]",
            self.variant_id.value(),
            self.outstanding,
            self.cause,
            applied
        )
    }
}

pub struct CheckoutOrchestrator<S> {
    store: S,
    inventory: Arc<dyn InventoryService>,
    payment: Arc<dyn PaymentGateway>,
    redirects: PaymentRedirects,
}

impl<S: Store> CheckoutOrchestrator<S> {
    pub fn new(
        store: S,
        inventory: Arc<dyn InventoryService>,
        payment: Arc<dyn PaymentGateway>,
        redirects: PaymentRedirects,
    ) -> Self {
        Self {
            store,
            inventory,
            payment,
            redirects,
        }
    }

    /// Converts the user's active cart into a PENDING order.
    ///
    /// The cart is deactivated atomically with the order insert; if two
    /// checkouts race on the same cart, the loser gets
    /// [`StoreError::CartNotActive`].
    #[instrument(skip(self))]
    pub async fn checkout(&self, user_id: UserId) -> Result<Order> {
        let cart = self.store.get_or_create_active_cart(user_id).await?;
        let order = Order::from_cart(&cart)?;
        self.store.checkout(cart.id, &order).await?;

        metrics::counter!("checkouts_total").increment(1);
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total_cents = order.total_amount.cents(),
            "cart checked out"
        );
        Ok(order)
    }

    /// Opens a hosted payment session for a PENDING order and returns
    /// the redirect URL. Callers may override the configured redirect
    /// targets per session.
    #[instrument(skip(self, success_override, cancel_override))]
    pub async fn start_payment(
        &self,
        user_id: UserId,
        order_id: OrderId,
        success_override: Option<String>,
        cancel_override: Option<String>,
    ) -> Result<String> {
        let order = self
            .store
            .get_user_order(order_id, user_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if order.status != OrderStatus::Pending {
            return Err(OrderError::AlreadyProcessed {
                status: order.status,
            }
            .into());
        }

        let line_items = order
            .items
            .iter()
            .map(|item| SessionLineItem {
                name: format!("{} - {}", item.product_name, item.variant_name),
                unit_amount: item.price.cents(),
                quantity: item.quantity,
            })
            .collect();

        let session = self
            .payment
            .create_session(CreateSessionRequest {
                order_id: order.id,
                user_id,
                line_items,
                success_url: success_override.unwrap_or_else(|| self.redirects.success_url.clone()),
                cancel_url: cancel_override.unwrap_or_else(|| self.redirects.cancel_url.clone()),
            })
            .await?;

        self.store
            .set_payment_session(order.id, &session.session_id)
            .await?;

        metrics::counter!("payment_sessions_started_total").increment(1);
        tracing::info!(order_id = %order.id, session_id = %session.session_id, "payment session opened");
        Ok(session.redirect_url)
    }

    /// Current payment state of an order, scoped to its owner.
    pub async fn pay_status(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        self.store
            .get_user_order(order_id, user_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))
    }

    /// Applies a successful payment: PENDING → PAID, then batch stock
    /// deduction.
    ///
    /// Replays are absorbed by the status compare-and-set, so stock is
    /// deducted at most once per order no matter how often the
    /// processor redelivers the event. A deduction that cannot
    /// complete leaves the order PAID with a reconciliation note; the
    /// payment is never rolled back over inventory trouble.
    #[instrument(skip(self))]
    pub async fn confirm_payment(&self, order_id: OrderId) -> Result<ConfirmOutcome> {
        let order = match self
            .store
            .transition_order(order_id, OrderStatus::Pending, OrderStatus::Paid)
            .await
        {
            Ok(order) => order,
            Err(StoreError::StatusConflict { actual, .. }) => {
                tracing::debug!(%order_id, status = %actual, "duplicate payment confirmation ignored");
                return Ok(ConfirmOutcome::AlreadySettled);
            }
            Err(e) => return Err(e.into()),
        };

        metrics::counter!("payments_confirmed_total").increment(1);
        tracing::info!(%order_id, order_number = %order.order_number, "payment confirmed");

        match self.deduct_order_stock(&order).await {
            Ok(()) => Ok(ConfirmOutcome::Confirmed),
            Err(shortfall) => {
                let note = shortfall.reconciliation_note();
                tracing::error!(%order_id, %note, "stock deduction incomplete after payment");
                metrics::counter!("stock_deductions_failed_total").increment(1);
                self.store.record_reconciliation(order_id, &note).await?;
                Ok(ConfirmOutcome::NeedsReconciliation)
            }
        }
    }

    /// Applies a failed payment: PENDING → FAILED. A no-op if the
    /// order already settled.
    #[instrument(skip(self))]
    pub async fn fail_payment(&self, order_id: OrderId) -> Result<()> {
        self.settle_without_payment(order_id, OrderStatus::Failed)
            .await
    }

    /// Applies an expired payment session: PENDING → CANCELLED. A
    /// no-op if the order already settled.
    #[instrument(skip(self))]
    pub async fn expire_payment(&self, order_id: OrderId) -> Result<()> {
        self.settle_without_payment(order_id, OrderStatus::Cancelled)
            .await
    }

    async fn settle_without_payment(&self, order_id: OrderId, target: OrderStatus) -> Result<()> {
        match self
            .store
            .transition_order(order_id, OrderStatus::Pending, target)
            .await
        {
            Ok(order) => {
                tracing::info!(%order_id, status = %order.status, "order settled without payment");
                Ok(())
            }
            Err(StoreError::StatusConflict { actual, .. }) => {
                tracing::debug!(%order_id, status = %actual, %target, "settlement event ignored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// User-initiated cancellation. Only a PENDING order can be
    /// cancelled; anything else is a conflict reported to the caller.
    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        // Ownership check before touching status
        self.store
            .get_user_order(order_id, user_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        match self
            .store
            .transition_order(order_id, OrderStatus::Pending, OrderStatus::Cancelled)
            .await
        {
            Ok(order) => {
                tracing::info!(%order_id, "order cancelled by user");
                Ok(order)
            }
            Err(StoreError::StatusConflict { actual, .. }) => {
                Err(OrderError::AlreadyProcessed { status: actual }.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Admin fulfillment: PAID → SHIPPED → DELIVERED, in that order.
    #[instrument(skip(self))]
    pub async fn advance_fulfillment(
        &self,
        order_id: OrderId,
        target: OrderStatus,
    ) -> Result<Order> {
        if !target.is_fulfillment_target() {
            return Err(OrderError::InvalidFulfillmentTarget { target }.into());
        }
        let expected = match target {
            OrderStatus::Shipped => OrderStatus::Paid,
            OrderStatus::Delivered => OrderStatus::Shipped,
            _ => unreachable!("is_fulfillment_target admits only Shipped and Delivered"),
        };
        debug_assert!(expected.can_transition(target));

        match self.store.transition_order(order_id, expected, target).await {
            Ok(order) => {
                tracing::info!(%order_id, status = %order.status, "fulfillment advanced");
                Ok(order)
            }
            Err(StoreError::StatusConflict { actual, .. }) => Err(OrderError::InvalidTransition {
                from: actual,
                to: target,
            }
            .into()),
            Err(e) => Err(e.into()),
        }
    }

    /// Deducts every order line from batch stock, draining batches in
    /// expiry-date order so the oldest stock leaves first.
    ///
    /// Partial progress is not rolled back: committed batch writes stay
    /// committed and are listed in the shortfall so reconciliation can
    /// see exactly what happened.
    async fn deduct_order_stock(
        &self,
        order: &Order,
    ) -> std::result::Result<(), DeductionShortfall> {
        let mut applied: Vec<(BatchId, u32)> = Vec::new();

        for item in &order.items {
            let mut batches = match self.inventory.active_batches(item.variant_id).await {
                Ok(batches) => batches,
                Err(e) => {
                    return Err(DeductionShortfall {
                        variant_id: item.variant_id,
                        outstanding: item.quantity,
                        applied,
                        cause: e.to_string(),
                    });
                }
            };
            batches.sort_by_key(|b| b.exp_date);

            let mut outstanding = item.quantity;
            for batch in batches {
                if outstanding == 0 {
                    break;
                }
                let take = outstanding.min(batch.qty);
                if take == 0 {
                    continue;
                }
                if let Err(e) = self
                    .inventory
                    .set_batch_quantity(batch.batch_id, batch.qty - take)
                    .await
                {
                    return Err(DeductionShortfall {
                        variant_id: item.variant_id,
                        outstanding,
                        applied,
                        cause: e.to_string(),
                    });
                }
                applied.push((batch.batch_id, take));
                outstanding -= take;
            }

            if outstanding > 0 {
                return Err(DeductionShortfall {
                    variant_id: item.variant_id,
                    outstanding,
                    applied,
                    cause: "insufficient stock".to_string(),
                });
            }
            tracing::debug!(
                order_id = %order.id,
                variant_id = item.variant_id.value(),
                quantity = item.quantity,
                "stock deducted"
            );
        }
        Ok(())
    }
}
