//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{ProductId, UserId, VariantId};
use domain::{Cart, Money, NewItem, Order, OrderStatus};
use sqlx::PgPool;
use store::{PostgresStore, Store, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            // Create a temporary pool just for migrations
            let temp_pool = PgPool::connect(&connection_string).await.unwrap();

            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_commerce_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();

            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE carts, cart_items, orders, order_items")
        .execute(&pool)
        .await
        .unwrap();

    PostgresStore::new(pool)
}

fn line(variant: i64, price: i64, quantity: u32) -> NewItem {
    NewItem {
        product_id: ProductId::new(variant),
        variant_id: VariantId::new(variant),
        product_name: format!("Product {variant}"),
        variant_name: format!("Variant {variant}"),
        sku: format!("SKU-{variant}"),
        price: Money::from_cents(price),
        quantity,
    }
}

async fn checked_out_order(store: &PostgresStore, user_id: UserId) -> (Cart, Order) {
    let mut cart = store.get_or_create_active_cart(user_id).await.unwrap();
    cart.add_item(line(10, 500, 2)).unwrap();
    cart.add_item(line(20, 300, 1)).unwrap();
    store.save_cart(&cart).await.unwrap();

    let order = Order::from_cart(&cart).unwrap();
    store.checkout(cart.id, &order).await.unwrap();
    (cart, order)
}

#[tokio::test]
async fn cart_roundtrip_preserves_lines_and_total() {
    let store = get_test_store().await;
    let user_id = UserId::new();

    let mut cart = store.get_or_create_active_cart(user_id).await.unwrap();
    cart.add_item(line(10, 500, 2)).unwrap();
    cart.add_item(line(20, 300, 1)).unwrap();
    store.save_cart(&cart).await.unwrap();

    let reloaded = store.get_or_create_active_cart(user_id).await.unwrap();
    assert_eq!(reloaded.id, cart.id);
    assert_eq!(reloaded.items.len(), 2);
    assert_eq!(reloaded.total_amount.cents(), 1300);
    assert_eq!(reloaded.items[0].sku, "SKU-10");
}

#[tokio::test]
async fn get_or_create_is_idempotent() {
    let store = get_test_store().await;
    let user_id = UserId::new();

    let first = store.get_or_create_active_cart(user_id).await.unwrap();
    let second = store.get_or_create_active_cart(user_id).await.unwrap();
    assert_eq!(first.id, second.id);
}

#[tokio::test]
async fn checkout_is_atomic_and_deactivates_cart() {
    let store = get_test_store().await;
    let user_id = UserId::new();

    let (cart, order) = checked_out_order(&store, user_id).await;

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.total_amount.cents(), 1300);
    assert_eq!(stored.items.len(), 2);
    assert_eq!(stored.order_number, order.order_number);

    // A fresh cart appears on next access
    let fresh = store.get_or_create_active_cart(user_id).await.unwrap();
    assert_ne!(fresh.id, cart.id);
    assert!(fresh.is_empty());
}

#[tokio::test]
async fn second_checkout_of_same_cart_conflicts() {
    let store = get_test_store().await;
    let user_id = UserId::new();

    let (cart, _) = checked_out_order(&store, user_id).await;

    let rival = Order::from_cart(&cart).unwrap();
    let result = store.checkout(cart.id, &rival).await;
    assert!(matches!(result, Err(StoreError::CartNotActive { .. })));

    // The rival order must not have been inserted
    assert!(store.get_order(rival.id).await.unwrap().is_none());
}

#[tokio::test]
async fn status_cas_applies_once_and_stamps_paid_at() {
    let store = get_test_store().await;
    let (_, order) = checked_out_order(&store, UserId::new()).await;

    let paid = store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap();
    assert_eq!(paid.status, OrderStatus::Paid);
    assert!(paid.paid_at.is_some());

    let replay = store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Paid)
        .await;
    assert!(matches!(
        replay,
        Err(StoreError::StatusConflict {
            actual: OrderStatus::Paid,
            ..
        })
    ));
}

#[tokio::test]
async fn payment_session_and_reconciliation_are_persisted() {
    let store = get_test_store().await;
    let (_, order) = checked_out_order(&store, UserId::new()).await;

    store
        .set_payment_session(order.id, "cs_test_123")
        .await
        .unwrap();
    store
        .record_reconciliation(order.id, "variant 10 short by 2")
        .await
        .unwrap();

    let stored = store.get_order(order.id).await.unwrap().unwrap();
    assert_eq!(stored.payment_session_id.as_deref(), Some("cs_test_123"));
    assert_eq!(
        stored.reconciliation_note.as_deref(),
        Some("variant 10 short by 2")
    );
}

#[tokio::test]
async fn order_reads_are_user_scoped() {
    let store = get_test_store().await;
    let owner = UserId::new();
    let (_, order) = checked_out_order(&store, owner).await;

    assert!(
        store
            .get_user_order(order.id, owner)
            .await
            .unwrap()
            .is_some()
    );
    assert!(
        store
            .get_user_order(order.id, UserId::new())
            .await
            .unwrap()
            .is_none()
    );

    let own = store.list_user_orders(owner).await.unwrap();
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].items.len(), 2);

    let all = store.list_all_orders().await.unwrap();
    assert_eq!(all.len(), 1);
}

#[tokio::test]
async fn delivered_purchase_verification() {
    let store = get_test_store().await;
    let user_id = UserId::new();
    let (_, order) = checked_out_order(&store, user_id).await;
    let product_id = order.items[0].product_id;

    assert!(!store.has_delivered_product(user_id, product_id).await.unwrap());

    store
        .transition_order(order.id, OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap();
    store
        .transition_order(order.id, OrderStatus::Paid, OrderStatus::Shipped)
        .await
        .unwrap();
    let delivered = store
        .transition_order(order.id, OrderStatus::Shipped, OrderStatus::Delivered)
        .await
        .unwrap();
    assert!(delivered.delivered_at.is_some());

    assert!(store.has_delivered_product(user_id, product_id).await.unwrap());
    assert!(
        !store
            .has_delivered_product(user_id, ProductId::new(999))
            .await
            .unwrap()
    );
}
