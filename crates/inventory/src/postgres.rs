use async_trait::async_trait;
use common::GoodsId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{InventoryError, Result, StockLedger, StockRecord, StockUpdate};

/// PostgreSQL-backed stock ledger.
#[derive(Clone)]
pub struct PostgresStockLedger {
    pool: PgPool,
}

impl PostgresStockLedger {
    /// Creates a new PostgreSQL stock ledger.
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

    fn row_to_record(row: PgRow) -> Result<StockRecord> {
        Ok(StockRecord {
            goods_id: GoodsId::new(row.try_get("goods_id")?),
            stock: row.try_get("stock")?,
            version: row.try_get("version")?,
        })
    }
}

#[async_trait]
impl StockLedger for PostgresStockLedger {
    async fn get(&self, goods_id: GoodsId) -> Result<Option<StockRecord>> {
        let row = sqlx::query("SELECT goods_id, stock, version FROM inventory WHERE goods_id = $1")
            .bind(goods_id.get())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn get_many(&self, goods_ids: &[GoodsId]) -> Result<Vec<StockRecord>> {
        let ids: Vec<i32> = goods_ids.iter().map(GoodsId::get).collect();
        let rows = sqlx::query(
            "SELECT goods_id, stock, version FROM inventory WHERE goods_id = ANY($1) ORDER BY goods_id",
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn upsert(&self, goods_id: GoodsId, stock: i32) -> Result<StockRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO inventory (goods_id, stock, version)
            VALUES ($1, $2, 0)
            ON CONFLICT (goods_id) DO UPDATE SET
                stock = EXCLUDED.stock,
                version = inventory.version + 1,
                updated_at = NOW()
            RETURNING goods_id, stock, version
            "#,
        )
        .bind(goods_id.get())
        .bind(stock)
        .fetch_one(&self.pool)
        .await?;

        Self::row_to_record(row)
    }

    async fn apply(&self, updates: &[StockUpdate]) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        for update in updates {
            let result = sqlx::query(
                r#"
                UPDATE inventory
                SET stock = $1, version = version + 1, updated_at = NOW()
                WHERE goods_id = $2 AND version = $3
                "#,
            )
            .bind(update.new_stock)
            .bind(update.goods_id.get())
            .bind(update.expected_version)
            .execute(&mut *tx)
            .await?;

            // Dropping `tx` rolls back everything applied so far.
            if result.rows_affected() == 0 {
                return Err(InventoryError::VersionConflict {
                    goods_id: update.goods_id,
                    expected_version: update.expected_version,
                });
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
