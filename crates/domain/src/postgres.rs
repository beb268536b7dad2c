//! PostgreSQL order store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{GoodsId, OrderId, UserId};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};

use crate::order::{
    CartItemUpdate, Money, NewOrder, NewOrderGoods, NewReconciliation, OrderFilter, OrderGoods,
    OrderInfo, OrderKey, OrderPage, OrderStatus, ReconciliationLine, ReconciliationRecord,
    ShoppingCartItem,
};
use crate::store::{OrderStore, OrderTransaction};
use crate::{DomainError, Result};

const ORDER_COLUMNS: &str = "id, user_id, order_sn, status, pay_type, order_mount, pay_deadline, \
     pay_time, address, signer_name, signer_mobile, post, created_at";

const GOODS_COLUMNS: &str =
    "id, order_id, goods_id, goods_name, goods_image, goods_price, nums";

const CART_COLUMNS: &str = "id, user_id, goods_id, nums, checked";

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn row_to_order(row: PgRow) -> Result<OrderInfo> {
    let status: String = row.try_get("status")?;
    Ok(OrderInfo {
        id: OrderId::new(row.try_get("id")?),
        user_id: UserId::new(row.try_get("user_id")?),
        order_sn: row.try_get("order_sn")?,
        status: status.parse()?,
        pay_type: row.try_get("pay_type")?,
        order_mount: Money::from_cents(row.try_get("order_mount")?),
        pay_deadline: row.try_get("pay_deadline")?,
        pay_time: row.try_get("pay_time")?,
        address: row.try_get("address")?,
        signer_name: row.try_get("signer_name")?,
        signer_mobile: row.try_get("signer_mobile")?,
        post: row.try_get("post")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_goods(row: PgRow) -> Result<OrderGoods> {
    Ok(OrderGoods {
        id: row.try_get("id")?,
        order_id: OrderId::new(row.try_get("order_id")?),
        goods_id: GoodsId::new(row.try_get("goods_id")?),
        goods_name: row.try_get("goods_name")?,
        goods_image: row.try_get("goods_image")?,
        goods_price: Money::from_cents(row.try_get("goods_price")?),
        nums: row.try_get("nums")?,
    })
}

fn row_to_cart(row: PgRow) -> Result<ShoppingCartItem> {
    Ok(ShoppingCartItem {
        id: row.try_get("id")?,
        user_id: UserId::new(row.try_get("user_id")?),
        goods_id: GoodsId::new(row.try_get("goods_id")?),
        nums: row.try_get("nums")?,
        checked: row.try_get("checked")?,
    })
}

fn row_to_reconciliation(row: PgRow) -> Result<ReconciliationRecord> {
    let Json(lines): Json<Vec<ReconciliationLine>> = row.try_get("lines")?;
    Ok(ReconciliationRecord {
        id: row.try_get("id")?,
        order_sn: row.try_get("order_sn")?,
        reason: row.try_get("reason")?,
        lines,
        created_at: row.try_get("created_at")?,
    })
}

fn map_unique_sn(e: sqlx::Error, order_sn: &str) -> DomainError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            DomainError::DuplicateOrderSn(order_sn.to_string())
        }
        _ => DomainError::Database(e),
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn begin(&self) -> Result<Box<dyn OrderTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn find_order(&self, key: &OrderKey) -> Result<Option<OrderInfo>> {
        let row = match key {
            OrderKey::Id(id) => {
                sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM order_info WHERE id = $1"))
                    .bind(id.get())
                    .fetch_optional(&self.pool)
                    .await?
            }
            OrderKey::Sn(sn) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM order_info WHERE order_sn = $1"
                ))
                .bind(sn)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        row.map(row_to_order).transpose()
    }

    async fn order_goods(&self, order_id: OrderId) -> Result<Vec<OrderGoods>> {
        let rows = sqlx::query(&format!(
            "SELECT {GOODS_COLUMNS} FROM order_goods WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_goods).collect()
    }

    async fn user_orders(&self, user_id: UserId, filter: &OrderFilter) -> Result<OrderPage> {
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM order_info \
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2)",
        )
        .bind(user_id.get())
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM order_info \
             WHERE user_id = $1 AND ($2::text IS NULL OR status = $2) \
             ORDER BY id DESC LIMIT $3 OFFSET $4"
        ))
        .bind(user_id.get())
        .bind(status)
        .bind(i64::from(filter.page_size))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(OrderPage {
            total: u64::try_from(total).unwrap_or_default(),
            orders: rows.into_iter().map(row_to_order).collect::<Result<_>>()?,
        })
    }

    async fn cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM shopping_cart WHERE user_id = $1 ORDER BY id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_cart).collect()
    }

    async fn checked_cart(&self, user_id: UserId) -> Result<Vec<ShoppingCartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM shopping_cart WHERE user_id = $1 AND checked ORDER BY id"
        ))
        .bind(user_id.get())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_cart).collect()
    }

    #[tracing::instrument(skip(self))]
    async fn add_to_cart(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        nums: i32,
        checked: bool,
    ) -> Result<ShoppingCartItem> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO shopping_cart (user_id, goods_id, nums, checked)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id, goods_id) DO UPDATE SET
                nums = shopping_cart.nums + EXCLUDED.nums,
                checked = EXCLUDED.checked
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(user_id.get())
        .bind(goods_id.get())
        .bind(nums)
        .bind(checked)
        .fetch_one(&self.pool)
        .await?;

        row_to_cart(row)
    }

    #[tracing::instrument(skip(self))]
    async fn update_cart_item(
        &self,
        user_id: UserId,
        goods_id: GoodsId,
        update: CartItemUpdate,
    ) -> Result<Option<ShoppingCartItem>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE shopping_cart
            SET nums = COALESCE($3, nums), checked = COALESCE($4, checked)
            WHERE user_id = $1 AND goods_id = $2
            RETURNING {CART_COLUMNS}
            "#
        ))
        .bind(user_id.get())
        .bind(goods_id.get())
        .bind(update.nums)
        .bind(update.checked)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_cart).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn delete_cart_item(&self, user_id: UserId, goods_id: GoodsId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM shopping_cart WHERE user_id = $1 AND goods_id = $2")
            .bind(user_id.get())
            .bind(goods_id.get())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn expired_paying_orders(&self, now: DateTime<Utc>) -> Result<Vec<OrderInfo>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM order_info \
             WHERE status = $1 AND pay_deadline < $2 ORDER BY id"
        ))
        .bind(OrderStatus::Paying.as_str())
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_order).collect()
    }

    #[tracing::instrument(skip(self, record), fields(order_sn = ?record.order_sn))]
    async fn record_reconciliation(
        &self,
        record: NewReconciliation,
    ) -> Result<ReconciliationRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO stock_reconciliation (order_sn, reason, lines)
            VALUES ($1, $2, $3)
            RETURNING id, order_sn, reason, lines, created_at
            "#,
        )
        .bind(&record.order_sn)
        .bind(&record.reason)
        .bind(Json(&record.lines))
        .fetch_one(&self.pool)
        .await?;

        row_to_reconciliation(row)
    }

    async fn reconciliations(&self) -> Result<Vec<ReconciliationRecord>> {
        let rows = sqlx::query(
            "SELECT id, order_sn, reason, lines, created_at FROM stock_reconciliation ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(row_to_reconciliation).collect()
    }
}

struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl OrderTransaction for PostgresTransaction {
    #[tracing::instrument(skip(self, order), fields(order_sn = %order.order_sn))]
    async fn insert_order(&mut self, order: NewOrder) -> Result<OrderInfo> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO order_info
                (user_id, order_sn, status, order_mount, pay_deadline,
                 address, signer_name, signer_mobile, post, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(order.user_id.get())
        .bind(&order.order_sn)
        .bind(order.status.as_str())
        .bind(order.order_mount.cents())
        .bind(order.pay_deadline)
        .bind(&order.address)
        .bind(&order.signer_name)
        .bind(&order.signer_mobile)
        .bind(&order.post)
        .bind(order.created_at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_unique_sn(e, &order.order_sn))?;

        row_to_order(row)
    }

    #[tracing::instrument(skip(self, lines), fields(lines = lines.len()))]
    async fn insert_order_goods(
        &mut self,
        order_id: OrderId,
        lines: &[NewOrderGoods],
    ) -> Result<Vec<OrderGoods>> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        // One statement for the whole batch via parallel arrays.
        let goods_ids: Vec<i32> = lines.iter().map(|l| l.goods_id.get()).collect();
        let names: Vec<String> = lines.iter().map(|l| l.goods_name.clone()).collect();
        let images: Vec<String> = lines.iter().map(|l| l.goods_image.clone()).collect();
        let prices: Vec<i64> = lines.iter().map(|l| l.goods_price.cents()).collect();
        let nums: Vec<i32> = lines.iter().map(|l| l.nums).collect();

        let rows = sqlx::query(&format!(
            r#"
            INSERT INTO order_goods (order_id, goods_id, goods_name, goods_image, goods_price, nums)
            SELECT $1::int8, * FROM UNNEST($2::int4[], $3::text[], $4::text[], $5::int8[], $6::int4[])
            RETURNING {GOODS_COLUMNS}
            "#
        ))
        .bind(order_id.get())
        .bind(goods_ids)
        .bind(names)
        .bind(images)
        .bind(prices)
        .bind(nums)
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_goods).collect()
    }

    async fn set_order_mount(&mut self, order_id: OrderId, order_mount: Money) -> Result<()> {
        let result = sqlx::query("UPDATE order_info SET order_mount = $1 WHERE id = $2")
            .bind(order_mount.cents())
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DomainError::OrderNotFound(OrderKey::Id(order_id)));
        }
        Ok(())
    }

    async fn checked_cart_for_update(
        &mut self,
        user_id: UserId,
    ) -> Result<Vec<ShoppingCartItem>> {
        let rows = sqlx::query(&format!(
            "SELECT {CART_COLUMNS} FROM shopping_cart \
             WHERE user_id = $1 AND checked ORDER BY id FOR UPDATE"
        ))
        .bind(user_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_cart).collect()
    }

    #[tracing::instrument(skip(self, ids), fields(rows = ids.len()))]
    async fn delete_cart_items(&mut self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let result = sqlx::query("DELETE FROM shopping_cart WHERE id = ANY($1)")
            .bind(ids)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn find_order_for_update(&mut self, key: &OrderKey) -> Result<Option<OrderInfo>> {
        let row = match key {
            OrderKey::Id(id) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM order_info WHERE id = $1 FOR UPDATE"
                ))
                .bind(id.get())
                .fetch_optional(&mut *self.tx)
                .await?
            }
            OrderKey::Sn(sn) => {
                sqlx::query(&format!(
                    "SELECT {ORDER_COLUMNS} FROM order_info WHERE order_sn = $1 FOR UPDATE"
                ))
                .bind(sn)
                .fetch_optional(&mut *self.tx)
                .await?
            }
        };

        row.map(row_to_order).transpose()
    }

    async fn order_goods(&mut self, order_id: OrderId) -> Result<Vec<OrderGoods>> {
        let rows = sqlx::query(&format!(
            "SELECT {GOODS_COLUMNS} FROM order_goods WHERE order_id = $1 ORDER BY id"
        ))
        .bind(order_id.get())
        .fetch_all(&mut *self.tx)
        .await?;

        rows.into_iter().map(row_to_goods).collect()
    }

    #[tracing::instrument(skip(self, pay_time))]
    async fn transition_status(
        &mut self,
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
        pay_time: Option<DateTime<Utc>>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE order_info
            SET status = $1, pay_time = COALESCE($2, pay_time)
            WHERE id = $3 AND status = $4
            "#,
        )
        .bind(to.as_str())
        .bind(pay_time)
        .bind(order_id.get())
        .bind(from.as_str())
        .execute(&mut *self.tx)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    #[tracing::instrument(skip(self))]
    async fn delete_order(&mut self, order_id: OrderId) -> Result<bool> {
        sqlx::query("DELETE FROM order_goods WHERE order_id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await?;

        let result = sqlx::query("DELETE FROM order_info WHERE id = $1")
            .bind(order_id.get())
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await.inspect_err(|e| {
            tracing::warn!(error = %e, "order transaction commit failed");
        })?;
        Ok(())
    }
}
