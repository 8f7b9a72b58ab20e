use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use common::{ItemId, OrderId, OrderItemId, PaymentId, ReservationId, TransactionId, UserId};
use domain::{
    ItemKind, Money, Order, OrderItem, OrderStatus, Payment, PaymentMethod, PaymentOutcome,
    PaymentStatus, Reservation, ReservationResolution, ReservationState, SellableItem,
};

use crate::{
    Result, StoreError,
    store::{CheckoutStore, ResolveOutcome},
};

/// PostgreSQL-backed checkout store implementation.
///
/// Atomicity comes from transactions and conditional `UPDATE`
/// statements; concurrent writers on the same row are serialized by
/// row locks, so no in-process locking is needed.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL checkout store.
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

    fn row_to_item(row: PgRow) -> Result<SellableItem> {
        Ok(SellableItem {
            id: ItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            kind: decode("kind", row.try_get("kind")?, ItemKind::parse)?,
            price: Money::from_cents(row.try_get("price")?),
            stock: row.try_get::<i32, _>("stock")? as u32,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_reservation(row: PgRow) -> Result<Reservation> {
        Ok(Reservation {
            id: ReservationId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            lines: serde_json::from_value(row.try_get::<Value, _>("lines")?)?,
            state: decode("state", row.try_get("state")?, ReservationState::parse)?,
            created_at: row.try_get("created_at")?,
            resolved_at: row.try_get("resolved_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            total: Money::from_cents(row.try_get("total")?),
            status: decode("status", row.try_get("status")?, OrderStatus::parse)?,
            payment_status: decode(
                "payment_status",
                row.try_get("payment_status")?,
                PaymentStatus::parse,
            )?,
            payment_method: decode(
                "payment_method",
                row.try_get("payment_method")?,
                PaymentMethod::parse,
            )?,
            shipping_address: row.try_get("shipping_address")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order_item(row: PgRow) -> Result<OrderItem> {
        Ok(OrderItem {
            id: OrderItemId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            item_id: ItemId::from_uuid(row.try_get::<Uuid, _>("item_id")?),
            item_name: row.try_get("item_name")?,
            quantity: row.try_get::<i32, _>("quantity")? as u32,
            unit_price: Money::from_cents(row.try_get("unit_price")?),
        })
    }

    fn row_to_payment(row: PgRow) -> Result<Payment> {
        let applied_outcome = match row.try_get::<Option<String>, _>("applied_outcome")? {
            Some(value) => Some(decode("applied_outcome", value, PaymentOutcome::parse)?),
            None => None,
        };

        Ok(Payment {
            id: PaymentId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_id: OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            amount: Money::from_cents(row.try_get("amount")?),
            method: decode("method", row.try_get("method")?, PaymentMethod::parse)?,
            status: decode("status", row.try_get("status")?, PaymentStatus::parse)?,
            transaction_id: row
                .try_get::<Option<String>, _>("transaction_id")?
                .map(TransactionId::from),
            payment_data: row.try_get("payment_data")?,
            applied_outcome,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Parses a stored text value into its domain type.
fn decode<T>(column: &'static str, value: String, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    parse(&value).ok_or_else(|| StoreError::Decode { column, value })
}

/// Surfaces named constraint violations, passing other errors through.
fn map_db_err(e: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = e
        && let Some(constraint) = db_err.constraint()
    {
        return StoreError::Constraint {
            constraint: constraint.to_string(),
        };
    }
    StoreError::Database(e)
}

#[async_trait]
impl CheckoutStore for PostgresStore {
    async fn upsert_item(&self, item: &SellableItem) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO items (id, name, kind, price, stock, is_active, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                kind = EXCLUDED.kind,
                price = EXCLUDED.price,
                stock = EXCLUDED.stock,
                is_active = EXCLUDED.is_active
            "#,
        )
        .bind(item.id.as_uuid())
        .bind(&item.name)
        .bind(item.kind.as_str())
        .bind(item.price.cents())
        .bind(i64::from(item.stock))
        .bind(item.is_active)
        .bind(item.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(())
    }

    async fn get_item(&self, item_id: ItemId) -> Result<Option<SellableItem>> {
        let row = sqlx::query(
            "SELECT id, name, kind, price, stock, is_active, created_at FROM items WHERE id = $1",
        )
        .bind(item_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_item).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn adjust_stock(&self, item_id: ItemId, delta: i64) -> Result<()> {
        let updated = sqlx::query("UPDATE items SET stock = stock + $2 WHERE id = $1")
            .bind(item_id.as_uuid())
            .bind(delta)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?
            .rows_affected();

        if updated == 0 {
            return Err(StoreError::not_found("item", item_id));
        }
        Ok(())
    }

    #[tracing::instrument(
        skip(self, reservation),
        fields(reservation_id = %reservation.id, order_id = %reservation.order_id)
    )]
    async fn reserve_stock(&self, reservation: &Reservation) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        // One conditional decrement per line. A line that matches no
        // row distinguishes "not sellable" from "not enough" with a
        // follow-up read; dropping the transaction rolls back the
        // lines already decremented. Quantities bind as BIGINT so the
        // stock comparison cannot wrap.
        for line in &reservation.lines {
            let updated = sqlx::query(
                "UPDATE items SET stock = stock - $2 WHERE id = $1 AND is_active = TRUE AND stock >= $2",
            )
            .bind(line.item_id.as_uuid())
            .bind(i64::from(line.quantity))
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated == 0 {
                let active: Option<bool> =
                    sqlx::query_scalar("SELECT is_active FROM items WHERE id = $1")
                        .bind(line.item_id.as_uuid())
                        .fetch_optional(&mut *tx)
                        .await?;

                return Err(match active {
                    Some(true) => StoreError::InsufficientStock {
                        item_id: line.item_id,
                    },
                    _ => StoreError::ItemUnavailable {
                        item_id: line.item_id,
                    },
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO reservations (id, order_id, lines, state, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(reservation.id.as_uuid())
        .bind(reservation.order_id.as_uuid())
        .bind(serde_json::to_value(&reservation.lines)?)
        .bind(reservation.state.as_str())
        .bind(reservation.created_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_reservation(&self, id: ReservationId) -> Result<Option<Reservation>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, lines, state, created_at, resolved_at
            FROM reservations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    async fn reservation_for_order(&self, order_id: OrderId) -> Result<Option<Reservation>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, lines, state, created_at, resolved_at
            FROM reservations
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_reservation).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn resolve_reservation(
        &self,
        id: ReservationId,
        resolution: ReservationResolution,
    ) -> Result<ResolveOutcome> {
        let mut tx = self.pool.begin().await?;

        // Guarded update: only a held reservation moves. The returned
        // lines are needed to restore stock on release.
        let row = sqlx::query(
            r#"
            UPDATE reservations
            SET state = $2, resolved_at = NOW()
            WHERE id = $1 AND state = 'held'
            RETURNING lines
            "#,
        )
        .bind(id.as_uuid())
        .bind(resolution.target_state().as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let state: Option<String> =
                sqlx::query_scalar("SELECT state FROM reservations WHERE id = $1")
                    .bind(id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            tx.commit().await?;

            return match state {
                None => Ok(ResolveOutcome::NotFound),
                Some(value) => {
                    let state = decode("state", value, ReservationState::parse)?;
                    Ok(ResolveOutcome::AlreadyResolved(state))
                }
            };
        };

        if resolution == ReservationResolution::Release {
            let lines: Vec<domain::CartLine> =
                serde_json::from_value(row.try_get::<Value, _>("lines")?)?;
            for line in &lines {
                sqlx::query("UPDATE items SET stock = stock + $2 WHERE id = $1")
                    .bind(line.item_id.as_uuid())
                    .bind(i64::from(line.quantity))
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(ResolveOutcome::Applied)
    }

    async fn expired_reservations(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<Reservation>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, lines, state, created_at, resolved_at
            FROM reservations
            WHERE state = 'held' AND created_at < $1
            ORDER BY created_at ASC
            LIMIT $2
            "#,
        )
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_reservation).collect()
    }

    #[tracing::instrument(skip(self, order, items), fields(order_id = %order.id))]
    async fn insert_order(&self, order: &Order, items: &[OrderItem]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders
                (id, user_id, total, status, payment_status, payment_method,
                 shipping_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.user_id.as_uuid())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(&order.shipping_address)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        for item in items {
            sqlx::query(
                r#"
                INSERT INTO order_items (id, order_id, item_id, item_name, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(item.id.as_uuid())
            .bind(item.order_id.as_uuid())
            .bind(item.item_id.as_uuid())
            .bind(&item.item_name)
            .bind(i64::from(item.quantity))
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, total, status, payment_status, payment_method,
                   shipping_address, created_at, updated_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, item_id, item_name, quantity, unit_price
            FROM order_items
            WHERE order_id = $1
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order_item).collect()
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, total, status, payment_status, payment_method,
                   shipping_address, created_at, updated_at
            FROM orders
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn update_order_status(
        &self,
        id: OrderId,
        expected: (OrderStatus, PaymentStatus),
        next: (OrderStatus, PaymentStatus),
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_status = $3, updated_at = NOW()
            WHERE id = $1 AND status = $4 AND payment_status = $5
            "#,
        )
        .bind(id.as_uuid())
        .bind(next.0.as_str())
        .bind(next.1.as_str())
        .bind(expected.0.as_str())
        .bind(expected.1.as_str())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM orders WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("order", id)),
        }
    }

    #[tracing::instrument(skip(self, payment), fields(payment_id = %payment.id))]
    async fn insert_payment(&self, payment: &Payment) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments
                (id, order_id, user_id, amount, method, status, transaction_id,
                 payment_data, applied_outcome, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(payment.id.as_uuid())
        .bind(payment.order_id.as_uuid())
        .bind(payment.user_id.as_uuid())
        .bind(payment.amount.cents())
        .bind(payment.method.as_str())
        .bind(payment.status.as_str())
        .bind(payment.transaction_id.as_ref().map(|t| t.as_str()))
        .bind(payment.payment_data.as_ref())
        .bind(payment.applied_outcome.map(|o| o.as_str()))
        .bind(payment.created_at)
        .bind(payment.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;

        Ok(())
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, user_id, amount, method, status, transaction_id,
                   payment_data, applied_outcome, created_at, updated_at
            FROM payments
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn get_payment_by_transaction(
        &self,
        transaction_id: &TransactionId,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query(
            r#"
            SELECT id, order_id, user_id, amount, method, status, transaction_id,
                   payment_data, applied_outcome, created_at, updated_at
            FROM payments
            WHERE transaction_id = $1
            "#,
        )
        .bind(transaction_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn payments_for_order(&self, order_id: OrderId) -> Result<Vec<Payment>> {
        let rows = sqlx::query(
            r#"
            SELECT id, order_id, user_id, amount, method, status, transaction_id,
                   payment_data, applied_outcome, created_at, updated_at
            FROM payments
            WHERE order_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(order_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }

    #[tracing::instrument(skip(self, payment_data))]
    async fn update_payment_status(
        &self,
        id: PaymentId,
        expected: PaymentStatus,
        next: PaymentStatus,
        payment_data: Option<&Value>,
    ) -> Result<bool> {
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, payment_data = COALESCE($3, payment_data), updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id.as_uuid())
        .bind(next.as_str())
        .bind(payment_data)
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?
        .rows_affected();

        if updated == 1 {
            return Ok(true);
        }

        let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM payments WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        match exists {
            Some(_) => Ok(false),
            None => Err(StoreError::not_found("payment", id)),
        }
    }

    #[tracing::instrument(skip(self))]
    async fn mark_outcome_applied(&self, id: PaymentId, outcome: PaymentOutcome) -> Result<()> {
        let updated =
            sqlx::query("UPDATE payments SET applied_outcome = $2, updated_at = NOW() WHERE id = $1")
                .bind(id.as_uuid())
                .bind(outcome.as_str())
                .execute(&self.pool)
                .await?
                .rows_affected();

        if updated == 0 {
            return Err(StoreError::not_found("payment", id));
        }
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fail_pending_payments(&self, order_id: OrderId) -> Result<u64> {
        let updated = sqlx::query(
            r#"
            UPDATE payments
            SET status = 'failed', applied_outcome = 'failed', updated_at = NOW()
            WHERE order_id = $1 AND status = 'pending'
            "#,
        )
        .bind(order_id.as_uuid())
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(updated)
    }
}
