use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, CartItemId, OrderId, ProductId, UserId, VariantId};
use domain::{Cart, CartItem, Money, Order, OrderItem, OrderStatus};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::store::Store;

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_cart(row: &PgRow) -> Result<Cart> {
        Ok(Cart {
            id: CartId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
            items: Vec::new(),
        })
    }

    fn row_to_cart_item(row: &PgRow) -> Result<CartItem> {
        Ok(CartItem {
            id: CartItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::new(row.try_get("product_id")?),
            variant_id: VariantId::new(row.try_get("variant_id")?),
            product_name: row.try_get("product_name")?,
            variant_name: row.try_get("variant_name")?,
            sku: row.try_get("sku")?,
            price: Money::from_cents(row.try_get("price")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: &PgRow) -> Result<Order> {
        let status: String = row.try_get("status")?;
        let status = status
            .parse::<OrderStatus>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            order_number: row.try_get("order_number")?,
            status,
            total_amount: Money::from_cents(row.try_get("total_amount")?),
            payment_session_id: row.try_get("payment_session_id")?,
            reconciliation_note: row.try_get("reconciliation_note")?,
            created_at: row.try_get("created_at")?,
            paid_at: row.try_get("paid_at")?,
            delivered_at: row.try_get("delivered_at")?,
            items: Vec::new(),
        })
    }

    fn row_to_order_item(row: &PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            product_id: ProductId::new(row.try_get("product_id")?),
            variant_id: VariantId::new(row.try_get("variant_id")?),
            product_name: row.try_get("product_name")?,
            variant_name: row.try_get("variant_name")?,
            sku: row.try_get("sku")?,
            price: Money::from_cents(row.try_get("price")?),
            quantity: row.try_get::<i32, _>("quantity")? as u32,
        })
    }

    async fn load_cart_items(&self, cart: &mut Cart) -> Result<()> {
        let rows = sqlx::query(
            r#"
            SELECT id, product_id, variant_id, product_name, variant_name, sku, price, quantity, created_at
            FROM cart_items
            WHERE cart_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(cart.id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        cart.items = rows
            .iter()
            .map(Self::row_to_cart_item)
            .collect::<Result<_>>()?;
        Ok(())
    }

    async fn load_order_items(&self, orders: &mut [Order]) -> Result<()> {
        for order in orders.iter_mut() {
            let rows = sqlx::query(
                r#"
                SELECT product_id, variant_id, product_name, variant_name, sku, price, quantity
                FROM order_items
                WHERE order_id = $1
                "#,
            )
            .bind(order.id.as_uuid())
            .fetch_all(&self.pool)
            .await?;

            order.items = rows
                .iter()
                .map(Self::row_to_order_item)
                .collect::<Result<_>>()?;
        }
        Ok(())
    }

    async fn fetch_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, order_number, status, total_amount, payment_session_id,
                   reconciliation_note, created_at, paid_at, delivered_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut orders = vec![Self::row_to_order(&row)?];
                self.load_order_items(&mut orders).await?;
                Ok(orders.pop())
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get_or_create_active_cart(&self, user_id: UserId) -> Result<Cart> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, total_amount, is_active, created_at, updated_at
            FROM carts
            WHERE user_id = $1 AND is_active
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            let mut cart = Self::row_to_cart(&row)?;
            self.load_cart_items(&mut cart).await?;
            return Ok(cart);
        }

        let cart = Cart::new(user_id);
        let inserted = sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, total_amount, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, TRUE, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(cart.total_amount.cents())
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 1 {
            return Ok(cart);
        }

        // Lost a creation race; the winner's cart is the active one.
        let row = sqlx::query(
            r#"
            SELECT id, user_id, total_amount, is_active, created_at, updated_at
            FROM carts
            WHERE user_id = $1 AND is_active
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_one(&self.pool)
        .await?;
        let mut cart = Self::row_to_cart(&row)?;
        self.load_cart_items(&mut cart).await?;
        Ok(cart)
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO carts (id, user_id, total_amount, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET total_amount = EXCLUDED.total_amount,
                is_active = EXCLUDED.is_active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.id.as_uuid())
        .bind(cart.user_id.as_uuid())
        .bind(cart.total_amount.cents())
        .bind(cart.is_active)
        .bind(cart.created_at)
        .bind(cart.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id.as_uuid())
            .execute(&mut *tx)
            .await?;

        for item in &cart.items {
            sqlx::query(
                r#"
                INSERT INTO cart_items
                    (id, cart_id, product_id, variant_id, product_name, variant_name, sku, price, quantity, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(cart.id.as_uuid())
            .bind(item.product_id.value())
            .bind(item.variant_id.value())
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(&item.sku)
            .bind(item.price.cents())
            .bind(item.quantity as i32)
            .bind(item.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn checkout(&self, cart_id: CartId, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let deactivated = sqlx::query(
            "UPDATE carts SET is_active = FALSE, updated_at = $2 WHERE id = $1 AND is_active",
        )
        .bind(cart_id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        if deactivated.rows_affected() == 0 {
            return Err(StoreError::CartNotActive { cart_id });
        }

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, order_number, status, total_amount, payment_session_id,
                 reconciliation_note, created_at, paid_at, delivered_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(order.total_amount.cents())
        .bind(&order.payment_session_id)
        .bind(&order.reconciliation_note)
        .bind(order.created_at)
        .bind(order.paid_at)
        .bind(order.delivered_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                r#"
                INSERT INTO order_items
                    (order_id, product_id, variant_id, product_name, variant_name, sku, price, quantity)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(order.id.as_uuid())
            .bind(item.product_id.value())
            .bind(item.variant_id.value())
            .bind(&item.product_name)
            .bind(&item.variant_name)
            .bind(&item.sku)
            .bind(item.price.cents())
            .bind(item.quantity as i32)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        self.fetch_order(order_id).await
    }

    async fn get_user_order(&self, order_id: OrderId, user_id: UserId) -> Result<Option<Order>> {
        Ok(self
            .fetch_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id))
    }

    async fn list_user_orders(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, order_number, status, total_amount, payment_session_id,
                   reconciliation_note, created_at, paid_at, delivered_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.load_order_items(&mut orders).await?;
        Ok(orders)
    }

    async fn list_all_orders(&self) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, order_number, status, total_amount, payment_session_id,
                   reconciliation_note, created_at, paid_at, delivered_at
            FROM orders
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut orders = rows
            .iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        self.load_order_items(&mut orders).await?;
        Ok(orders)
    }

    async fn set_payment_session(&self, order_id: OrderId, session_id: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE orders SET payment_session_id = $2 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(session_id)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound { order_id });
        }
        Ok(())
    }

    async fn transition_order(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<Order> {
        // The WHERE clause on the current status makes this a CAS; of two
        // racing transitions only one affects a row.
        let now = Utc::now();
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3,
                paid_at = CASE WHEN $3 = 'PAID' THEN $4 ELSE paid_at END,
                delivered_at = CASE WHEN $3 = 'DELIVERED' THEN $4 ELSE delivered_at END
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            let actual = self
                .fetch_order(order_id)
                .await?
                .ok_or(StoreError::OrderNotFound { order_id })?
                .status;
            return Err(StoreError::StatusConflict { expected, actual });
        }

        self.fetch_order(order_id)
            .await?
            .ok_or(StoreError::OrderNotFound { order_id })
    }

    async fn record_reconciliation(&self, order_id: OrderId, note: &str) -> Result<()> {
        let updated = sqlx::query("UPDATE orders SET reconciliation_note = $2 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(note)
            .execute(&self.pool)
            .await?;

        if updated.rows_affected() == 0 {
            return Err(StoreError::OrderNotFound { order_id });
        }
        Ok(())
    }

    async fn has_delivered_product(&self, user_id: UserId, product_id: ProductId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1
                FROM order_items oi
                JOIN orders o ON o.id = oi.order_id
                WHERE o.user_id = $1 AND o.status = 'DELIVERED' AND oi.product_id = $2
            )
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(product_id.value())
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }
}
