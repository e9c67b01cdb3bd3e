//! End-to-end checkout flow tests against in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use checkout::{
    Batch, CartService, CheckoutError, CheckoutOrchestrator, ConfirmOutcome,
    InMemoryCatalogService, InMemoryInventoryService, InMemoryPaymentGateway, PaymentRedirects,
    Product, SignatureVerifier, Variant, WebhookError, WebhookIngestor,
};
use common::{BatchId, CartId, OrderId, ProductId, UserId, VariantId};
use domain::{Cart, Money, Order, OrderError, OrderStatus};
use store::{InMemoryStore, Store, StoreError};

const WEBHOOK_SECRET: &str = "whsec_test";

struct Harness {
    store: InMemoryStore,
    inventory: Arc<InMemoryInventoryService>,
    gateway: Arc<InMemoryPaymentGateway>,
    carts: CartService<InMemoryStore>,
    orchestrator: Arc<CheckoutOrchestrator<InMemoryStore>>,
    ingestor: WebhookIngestor<InMemoryStore>,
}

fn harness() -> Harness {
    let store = InMemoryStore::new();

    let catalog = Arc::new(InMemoryCatalogService::new());
    catalog.insert_product(
        "green-tea",
        Product {
            product_id: ProductId::new(1),
            product_name: "Green Tea".to_string(),
        },
    );
    catalog.insert_variant(Variant {
        id: VariantId::new(11),
        name: "250g".to_string(),
        sku: "TEA-250".to_string(),
        price: Money::from_cents(850),
    });

    let inventory = Arc::new(InMemoryInventoryService::new());
    // Two batches for variant 11: the older one expires first
    inventory.add_batch(VariantId::new(11), batch(1, 3, "2026-01-01"));
    inventory.add_batch(VariantId::new(11), batch(2, 10, "2026-06-01"));

    let gateway = Arc::new(InMemoryPaymentGateway::new());

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        inventory.clone(),
        gateway.clone(),
        PaymentRedirects {
            success_url: "https://shop.test/pay/success".to_string(),
            cancel_url: "https://shop.test/pay/cancel".to_string(),
        },
    ));

    Harness {
        carts: CartService::new(store.clone(), catalog),
        ingestor: WebhookIngestor::new(
            SignatureVerifier::new(WEBHOOK_SECRET),
            orchestrator.clone(),
        ),
        store,
        inventory,
        gateway,
        orchestrator,
    }
}

fn batch(id: i64, qty: u32, exp: &str) -> Batch {
    Batch {
        batch_id: BatchId::new(id),
        qty,
        exp_date: exp.parse().unwrap(),
    }
}

fn signed_event(kind: &str, order_id: OrderId) -> (Vec<u8>, String) {
    let payload = serde_json::json!({
        "id": "evt_1",
        "type": kind,
        "data": {
            "object": {
                "id": "cs_test_0001",
                "metadata": { "order_id": order_id, "user_id": UserId::new() }
            }
        }
    });
    let body = serde_json::to_vec(&payload).unwrap();
    let header = SignatureVerifier::new(WEBHOOK_SECRET).sign(&body, 1_700_000_000);
    (body, header)
}

async fn pending_order(h: &Harness, user_id: UserId, quantity: u32) -> Order {
    h.carts
        .add_item(user_id, "green-tea", VariantId::new(11), quantity)
        .await
        .unwrap();
    h.orchestrator.checkout(user_id).await.unwrap()
}

async fn deliver(h: &Harness, kind: &str, order_id: OrderId) -> Result<(), WebhookError> {
    let (body, header) = signed_event(kind, order_id);
    h.ingestor.handle(&body, &header).await
}

#[tokio::test]
async fn full_checkout_to_paid_flow() {
    let h = harness();
    let user_id = UserId::new();
    let order = pending_order(&h, user_id, 5).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.total_amount.cents(), 4250);
    assert!(order.order_number.starts_with("ORD-"));

    let redirect = h
        .orchestrator
        .start_payment(user_id, order.id, None, None)
        .await
        .unwrap();
    assert!(redirect.starts_with("https://pay.test/session/"));

    let session = h.gateway.last_session().unwrap();
    assert_eq!(session.order_id, order.id);
    assert_eq!(session.success_url, "https://shop.test/pay/success");
    assert_eq!(session.line_items.len(), 1);
    assert_eq!(session.line_items[0].unit_amount, 850);
    assert_eq!(session.line_items[0].quantity, 5);

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert!(stored.payment_session_id.is_some());

    deliver(&h, "checkout.session.completed", order.id).await.unwrap();

    let paid = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());
    assert!(paid.reconciliation_note.is_none());

    // 5 units: the expiring batch of 3 drains first, then 2 from the next
    assert_eq!(h.inventory.batch_qty(BatchId::new(1)), Some(0));
    assert_eq!(h.inventory.batch_qty(BatchId::new(2)), Some(8));

    // Checkout left the user with a fresh empty cart
    let cart = h.carts.active_cart(user_id).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn duplicate_completion_deducts_stock_once() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 5).await;

    deliver(&h, "checkout.session.completed", order.id).await.unwrap();
    deliver(&h, "checkout.session.completed", order.id).await.unwrap();

    assert_eq!(h.inventory.batch_qty(BatchId::new(1)), Some(0));
    assert_eq!(h.inventory.batch_qty(BatchId::new(2)), Some(8));
    let paid = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
}

#[tokio::test]
async fn empty_cart_cannot_check_out() {
    let h = harness();
    let result = h.orchestrator.checkout(UserId::new()).await;
    assert!(matches!(
        result,
        Err(CheckoutError::Order(OrderError::EmptyCart))
    ));
}

#[tokio::test]
async fn start_payment_rejects_settled_orders() {
    let h = harness();
    let user_id = UserId::new();
    let order = pending_order(&h, user_id, 1).await;

    h.orchestrator.confirm_payment(order.id).await.unwrap();

    let result = h
        .orchestrator
        .start_payment(user_id, order.id, None, None)
        .await;
    assert!(matches!(
        result,
        Err(CheckoutError::Order(OrderError::AlreadyProcessed {
            status: OrderStatus::Paid
        }))
    ));
    assert_eq!(h.gateway.session_count(), 0);
}

#[tokio::test]
async fn start_payment_honors_redirect_overrides() {
    let h = harness();
    let user_id = UserId::new();
    let order = pending_order(&h, user_id, 1).await;

    h.orchestrator
        .start_payment(
            user_id,
            order.id,
            Some("https://app.test/thanks".to_string()),
            None,
        )
        .await
        .unwrap();

    let session = h.gateway.last_session().unwrap();
    assert_eq!(session.success_url, "https://app.test/thanks");
    assert_eq!(session.cancel_url, "https://shop.test/pay/cancel");
}

#[tokio::test]
async fn start_payment_is_owner_scoped() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;

    let result = h
        .orchestrator
        .start_payment(UserId::new(), order.id, None, None)
        .await;
    assert!(matches!(result, Err(CheckoutError::OrderNotFound(_))));
}

#[tokio::test]
async fn insufficient_stock_leaves_order_paid_with_note() {
    let h = harness();
    // 20 units wanted, 13 in stock across both batches
    let order = pending_order(&h, UserId::new(), 20).await;

    let outcome = h.orchestrator.confirm_payment(order.id).await.unwrap();
    assert_eq!(outcome, ConfirmOutcome::NeedsReconciliation);

    let paid = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    let note = paid.reconciliation_note.unwrap();
    assert!(note.contains("insufficient stock"), "note: {note}");
    assert!(note.contains("7 unit(s)"), "note: {note}");

    // Everything available was still taken, oldest first
    assert_eq!(h.inventory.batch_qty(BatchId::new(1)), Some(0));
    assert_eq!(h.inventory.batch_qty(BatchId::new(2)), Some(0));
}

#[tokio::test]
async fn batch_write_failure_mid_deduction_records_progress() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 5).await;

    h.inventory.set_fail_update_for(Some(BatchId::new(2)));

    let outcome = h.orchestrator.confirm_payment(order.id).await.unwrap();
    assert_eq!(outcome, ConfirmOutcome::NeedsReconciliation);

    // The first batch's write committed before the failure
    assert_eq!(h.inventory.batch_qty(BatchId::new(1)), Some(0));
    assert_eq!(h.inventory.batch_qty(BatchId::new(2)), Some(10));

    let paid = h.store.get_order(order.id).await.unwrap().unwrap();
    let note = paid.reconciliation_note.unwrap();
    assert!(note.contains("2 unit(s)"), "note: {note}");
    assert!(note.contains("batch 1 -3"), "note: {note}");
}

#[tokio::test]
async fn expired_session_cancels_pending_order() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;

    deliver(&h, "checkout.session.expired", order.id).await.unwrap();

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Cancelled);
}

#[tokio::test]
async fn expiry_after_completion_is_a_no_op() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;

    deliver(&h, "checkout.session.completed", order.id).await.unwrap();
    deliver(&h, "checkout.session.expired", order.id).await.unwrap();

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn failed_payment_marks_order_failed() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;

    deliver(&h, "checkout.session.async_payment_failed", order.id)
        .await
        .unwrap();

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Failed);
    // No stock leaves on a failed payment
    assert_eq!(h.inventory.batch_qty(BatchId::new(1)), Some(3));
}

#[tokio::test]
async fn user_cancel_succeeds_only_while_pending() {
    let h = harness();
    let user_id = UserId::new();
    let order = pending_order(&h, user_id, 1).await;

    let cancelled = h.orchestrator.cancel(user_id, order.id).await.unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    let order2 = pending_order(&h, user_id, 1).await;
    h.orchestrator.confirm_payment(order2.id).await.unwrap();
    let result = h.orchestrator.cancel(user_id, order2.id).await;
    assert!(matches!(
        result,
        Err(CheckoutError::Order(OrderError::AlreadyProcessed {
            status: OrderStatus::Paid
        }))
    ));
}

#[tokio::test]
async fn fulfillment_must_ship_before_delivering() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;
    h.orchestrator.confirm_payment(order.id).await.unwrap();

    let early = h
        .orchestrator
        .advance_fulfillment(order.id, OrderStatus::Delivered)
        .await;
    assert!(matches!(
        early,
        Err(CheckoutError::Order(OrderError::InvalidTransition {
            from: OrderStatus::Paid,
            to: OrderStatus::Delivered
        }))
    ));

    let shipped = h
        .orchestrator
        .advance_fulfillment(order.id, OrderStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(shipped.status, OrderStatus::Shipped);

    let delivered = h
        .orchestrator
        .advance_fulfillment(order.id, OrderStatus::Delivered)
        .await
        .unwrap();
    assert_eq!(delivered.status, OrderStatus::Delivered);
    assert!(delivered.delivered_at.is_some());
}

#[tokio::test]
async fn fulfillment_rejects_non_fulfillment_targets() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;

    let result = h
        .orchestrator
        .advance_fulfillment(order.id, OrderStatus::Paid)
        .await;
    assert!(matches!(
        result,
        Err(CheckoutError::Order(
            OrderError::InvalidFulfillmentTarget { .. }
        ))
    ));
}

#[tokio::test]
async fn bad_signature_is_rejected_and_changes_nothing() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 5).await;

    let (body, _) = signed_event("checkout.session.completed", order.id);
    let forged = SignatureVerifier::new("whsec_wrong").sign(&body, 1_700_000_000);

    let result = h.ingestor.handle(&body, &forged).await;
    assert!(matches!(result, Err(WebhookError::InvalidSignature)));

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(h.inventory.batch_qty(BatchId::new(1)), Some(3));
}

#[tokio::test]
async fn unknown_event_kind_is_acknowledged() {
    let h = harness();
    let order = pending_order(&h, UserId::new(), 1).await;

    deliver(&h, "payment_intent.created", order.id).await.unwrap();

    let stored = h.store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
}

#[tokio::test]
async fn event_for_unknown_order_is_acknowledged() {
    let h = harness();
    deliver(&h, "checkout.session.completed", OrderId::new())
        .await
        .unwrap();
}

/// Store wrapper that can be told to fail status transitions.
#[derive(Clone)]
struct FlakyTransitionStore {
    inner: InMemoryStore,
    fail_transitions: Arc<AtomicBool>,
}

impl FlakyTransitionStore {
    fn new() -> Self {
        Self {
            inner: InMemoryStore::new(),
            fail_transitions: Arc::new(AtomicBool::new(false)),
        }
    }

    fn set_fail_transitions(&self, fail: bool) {
        self.fail_transitions.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FlakyTransitionStore {
    async fn get_or_create_active_cart(&self, user_id: UserId) -> store::Result<Cart> {
        self.inner.get_or_create_active_cart(user_id).await
    }

    async fn save_cart(&self, cart: &Cart) -> store::Result<()> {
        self.inner.save_cart(cart).await
    }

    async fn checkout(&self, cart_id: CartId, order: &Order) -> store::Result<()> {
        self.inner.checkout(cart_id, order).await
    }

    async fn get_order(&self, order_id: OrderId) -> store::Result<Option<Order>> {
        self.inner.get_order(order_id).await
    }

    async fn get_user_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
    ) -> store::Result<Option<Order>> {
        self.inner.get_user_order(order_id, user_id).await
    }

    async fn list_user_orders(&self, user_id: UserId) -> store::Result<Vec<Order>> {
        self.inner.list_user_orders(user_id).await
    }

    async fn list_all_orders(&self) -> store::Result<Vec<Order>> {
        self.inner.list_all_orders().await
    }

    async fn set_payment_session(&self, order_id: OrderId, session_id: &str) -> store::Result<()> {
        self.inner.set_payment_session(order_id, session_id).await
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> store::Result<Order> {
        if self.fail_transitions.load(Ordering::SeqCst) {
            return Err(StoreError::Corrupt("injected failure".to_string()));
        }
        self.inner.transition_order(order_id, expected, next).await
    }

    async fn record_reconciliation(&self, order_id: OrderId, note: &str) -> store::Result<()> {
        self.inner.record_reconciliation(order_id, note).await
    }

    async fn has_delivered_product(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> store::Result<bool> {
        self.inner.has_delivered_product(user_id, product_id).await
    }
}

#[tokio::test]
async fn verified_event_is_acknowledged_despite_store_failure() {
    let store = FlakyTransitionStore::new();
    let user_id = UserId::new();

    let mut cart = store.get_or_create_active_cart(user_id).await.unwrap();
    cart.add_item(domain::NewItem {
        product_id: ProductId::new(1),
        variant_id: VariantId::new(11),
        product_name: "Green Tea".to_string(),
        variant_name: "250g".to_string(),
        sku: "TEA-250".to_string(),
        price: Money::from_cents(850),
        quantity: 1,
    })
    .unwrap();
    store.save_cart(&cart).await.unwrap();

    let orchestrator = Arc::new(CheckoutOrchestrator::new(
        store.clone(),
        Arc::new(InMemoryInventoryService::new()),
        Arc::new(InMemoryPaymentGateway::new()),
        PaymentRedirects {
            success_url: "https://shop.test/pay/success".to_string(),
            cancel_url: "https://shop.test/pay/cancel".to_string(),
        },
    ));
    let ingestor =
        WebhookIngestor::new(SignatureVerifier::new(WEBHOOK_SECRET), orchestrator.clone());

    let order = orchestrator.checkout(user_id).await.unwrap();
    store.set_fail_transitions(true);

    // The delivery is verified, so the processor gets its ack even
    // though nothing could be applied
    let (body, header) = signed_event("checkout.session.completed", order.id);
    ingestor.handle(&body, &header).await.unwrap();

    store.set_fail_transitions(false);
    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);

    // A later redelivery applies cleanly once the store recovers
    ingestor.handle(&body, &header).await.unwrap();
    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Paid);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let h = harness();
    let body = b"not json";
    let header = SignatureVerifier::new(WEBHOOK_SECRET).sign(body, 1_700_000_000);
    let result = h.ingestor.handle(body, &header).await;
    assert!(matches!(result, Err(WebhookError::MalformedPayload(_))));
}
