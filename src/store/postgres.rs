//! PostgreSQL Product Store.
//!
//! Every transaction takes transaction-scoped advisory locks for its
//! [`LockScope`] before doing anything else, and waits at most
//! `lock_timeout` for them (SQLSTATE 55P03 surfaces as
//! [`StoreError::LockTimeout`]). Locks are released by commit or rollback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use std::time::Duration;
use uuid::Uuid;

use super::{LockMode, LockScope, ProductFilter, ProductStore, ProductTx, RankOrder, StoreError, StoreResult};
use crate::domain::{ProductId, ProductRankRecord, ProductStatus, StoreId, StoreRankState};

const PRODUCT_COLUMNS: &str = "id, store_id, title, status, shop_rank, created_at, deleted_at";

#[derive(Debug, sqlx::FromRow)]
struct ProductRow {
    id: Uuid,
    store_id: Uuid,
    title: String,
    status: String,
    shop_rank: i32,
    created_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl TryFrom<ProductRow> for ProductRankRecord {
    type Error = StoreError;
    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<ProductStatus>().map_err(|e| StoreError::Database(e.to_string()))?;
        let shop_rank = u32::try_from(row.shop_rank)
            .map_err(|_| StoreError::Database(format!("negative shop_rank on product {}", row.id)))?;
        Ok(ProductRankRecord {
            id: row.id, store_id: row.store_id, title: row.title, status, shop_rank,
            created_at: row.created_at, deleted_at: row.deleted_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StoreRow {
    id: Uuid,
    init_rank: bool,
    deleted_at: Option<DateTime<Utc>>,
}

impl From<StoreRow> for StoreRankState {
    fn from(row: StoreRow) -> Self {
        Self { store_id: row.id, init_rank: row.init_rank, deleted_at: row.deleted_at }
    }
}

fn rank_param(rank: u32) -> StoreResult<i32> {
    i32::try_from(rank).map_err(|_| StoreError::Database(format!("shop_rank {rank} out of range")))
}

fn push_conditions(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) -> StoreResult<()> {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(store_id) = filter.store_id {
        qb.push(" AND store_id = ").push_bind(store_id);
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(ids) = &filter.ids {
        qb.push(" AND id = ANY(").push_bind(ids.clone()).push(")");
    }
    if !filter.exclude_ids.is_empty() {
        qb.push(" AND NOT (id = ANY(").push_bind(filter.exclude_ids.clone()).push("))");
    }
    if let Some(rank) = filter.rank_above {
        qb.push(" AND shop_rank > ").push_bind(rank_param(rank)?);
    }
    Ok(())
}

#[derive(Clone)]
pub struct PgProductStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgProductStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self { Self { pool, lock_timeout } }

    pub async fn connect(url: &str, max_connections: u32, lock_timeout: Duration) -> StoreResult<Self> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(pool, lock_timeout))
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    pub fn pool(&self) -> &PgPool { &self.pool }
}

#[async_trait]
impl ProductStore for PgProductStore {
    type Tx = PgTx;

    async fn begin(&self, scope: LockScope) -> StoreResult<PgTx> {
        let mut tx = self.pool.begin().await?;
        // SET cannot take bind parameters; the value is an integer we format ourselves.
        sqlx::query(&format!("SET LOCAL lock_timeout = '{}ms'", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;
        for (key, mode) in scope.lock_keys() {
            let sql = match mode {
                LockMode::Shared => "SELECT pg_advisory_xact_lock_shared(hashtextextended($1, 0))",
                LockMode::Exclusive => "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
            };
            sqlx::query(sql).bind(&key).execute(&mut *tx).await?;
        }
        tracing::trace!(?scope, "rank transaction started");
        Ok(PgTx { tx })
    }
}

pub struct PgTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl ProductTx for PgTx {
    async fn find(&mut self, filter: &ProductFilter) -> StoreResult<Vec<ProductRankRecord>> {
        let mut qb = QueryBuilder::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_conditions(&mut qb, filter)?;
        qb.push(match filter.order {
            RankOrder::Rank => " ORDER BY shop_rank ASC, created_at DESC, id ASC",
            RankOrder::Newest => " ORDER BY created_at DESC, id ASC",
        });
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ").push_bind(limit as i64);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ").push_bind(offset as i64);
        }
        let rows = qb.build_query_as::<ProductRow>().fetch_all(&mut *self.tx).await?;
        rows.into_iter().map(ProductRankRecord::try_from).collect()
    }

    async fn count(&mut self, filter: &ProductFilter) -> StoreResult<u64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM products");
        push_conditions(&mut qb, filter)?;
        let (n,): (i64,) = qb.build_query_as().fetch_one(&mut *self.tx).await?;
        Ok(n as u64)
    }

    async fn get(&mut self, id: ProductId) -> StoreResult<Option<ProductRankRecord>> {
        let row = sqlx::query_as::<_, ProductRow>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(ProductRankRecord::try_from).transpose()
    }

    async fn set_rank(&mut self, id: ProductId, rank: u32) -> StoreResult<()> {
        sqlx::query("UPDATE products SET shop_rank = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(rank_param(rank)?)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn shift_ranks(&mut self, filter: &ProductFilter, delta: i64) -> StoreResult<u64> {
        let delta = i32::try_from(delta).map_err(|_| StoreError::Database(format!("rank shift {delta} out of range")))?;
        let mut qb = QueryBuilder::new("UPDATE products SET updated_at = NOW(), shop_rank = shop_rank + ");
        qb.push_bind(delta);
        push_conditions(&mut qb, filter)?;
        let result = qb.build().execute(&mut *self.tx).await?;
        Ok(result.rows_affected())
    }

    async fn reset_ranks(&mut self, stores: Option<&[StoreId]>) -> StoreResult<u64> {
        let result = match stores {
            Some(ids) => sqlx::query("UPDATE products SET shop_rank = 0, updated_at = NOW() WHERE store_id = ANY($1)")
                .bind(ids.to_vec())
                .execute(&mut *self.tx)
                .await?,
            None => sqlx::query("UPDATE products SET shop_rank = 0, updated_at = NOW()")
                .execute(&mut *self.tx)
                .await?,
        };
        Ok(result.rows_affected())
    }

    async fn store_state(&mut self, store_id: StoreId) -> StoreResult<Option<StoreRankState>> {
        let row = sqlx::query_as::<_, StoreRow>("SELECT id, init_rank, deleted_at FROM stores WHERE id = $1")
            .bind(store_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(StoreRankState::from))
    }

    async fn set_init_rank(&mut self, store_id: StoreId, value: bool) -> StoreResult<()> {
        sqlx::query("INSERT INTO stores (id, init_rank) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET init_rank = EXCLUDED.init_rank")
            .bind(store_id)
            .bind(value)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn clear_init_rank(&mut self, stores: Option<&[StoreId]>) -> StoreResult<u64> {
        let result = match stores {
            Some(ids) => sqlx::query("UPDATE stores SET init_rank = FALSE WHERE id = ANY($1)")
                .bind(ids.to_vec())
                .execute(&mut *self.tx)
                .await?,
            None => sqlx::query("UPDATE stores SET init_rank = FALSE").execute(&mut *self.tx).await?,
        };
        Ok(result.rows_affected())
    }

    async fn insert_product(&mut self, product: &ProductRankRecord) -> StoreResult<()> {
        sqlx::query("INSERT INTO stores (id) VALUES ($1) ON CONFLICT (id) DO NOTHING")
            .bind(product.store_id)
            .execute(&mut *self.tx)
            .await?;
        sqlx::query("INSERT INTO products (id, store_id, title, status, shop_rank, created_at, updated_at) VALUES ($1, $2, $3, $4, $5, $6, NOW())")
            .bind(product.id)
            .bind(product.store_id)
            .bind(&product.title)
            .bind(product.status.as_str())
            .bind(rank_param(product.shop_rank)?)
            .bind(product.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn set_status(&mut self, id: ProductId, status: ProductStatus) -> StoreResult<()> {
        sqlx::query("UPDATE products SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn soft_delete(&mut self, id: ProductId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("UPDATE products SET deleted_at = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn delete_store(&mut self, store_id: StoreId, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query("INSERT INTO stores (id, deleted_at) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET deleted_at = EXCLUDED.deleted_at")
            .bind(store_id)
            .bind(at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
