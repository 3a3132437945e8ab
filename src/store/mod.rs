//! Product Store port
//!
//! The rank engine never talks to a database directly. It opens a
//! transaction through [`ProductStore::begin`] and works on the returned
//! [`ProductTx`], which exposes product rows (filterable by store, status
//! and ids, with a mutable `shop_rank`) and the per-store `init_rank` flag.
//!
//! Implementations:
//! - [`memory::InMemoryProductStore`]: tests and local development
//! - [`postgres::PgProductStore`]: production, backed by sqlx

pub mod memory;
pub mod postgres;

pub use memory::InMemoryProductStore;
pub use postgres::PgProductStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use thiserror::Error;

use crate::domain::{ProductId, ProductRankRecord, ProductStatus, StoreId, StoreRankState};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Lock timeout: {0}")]
    LockTimeout(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        // 55P03 = lock_not_available, raised when lock_timeout elapses
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.code().as_deref() == Some("55P03") {
                return StoreError::LockTimeout(db_err.message().to_string());
            }
        }
        StoreError::Database(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Serialization scope a transaction holds until it commits or rolls back.
///
/// Scopes are layered: `Global` conflicts with everything, `Store` with every
/// partition of that store, `Partition` only with itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LockScope {
    None,
    Global,
    Stores(Vec<StoreId>),
    Partition(StoreId, ProductStatus),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockMode { Shared, Exclusive }

impl LockScope {
    pub fn store(store_id: StoreId) -> Self { Self::Stores(vec![store_id]) }

    /// Advisory lock keys in acquisition order (outermost first, stores sorted).
    pub fn lock_keys(&self) -> Vec<(String, LockMode)> {
        const GLOBAL: &str = "shop_rank";
        match self {
            LockScope::None => vec![],
            LockScope::Global => vec![(GLOBAL.to_string(), LockMode::Exclusive)],
            LockScope::Stores(ids) => {
                let mut ids = ids.clone();
                ids.sort();
                ids.dedup();
                let mut keys = vec![(GLOBAL.to_string(), LockMode::Shared)];
                keys.extend(ids.into_iter().map(|id| (format!("{GLOBAL}:{id}"), LockMode::Exclusive)));
                keys
            }
            LockScope::Partition(store_id, status) => vec![
                (GLOBAL.to_string(), LockMode::Shared),
                (format!("{GLOBAL}:{store_id}"), LockMode::Shared),
                (format!("{GLOBAL}:{store_id}:{status}"), LockMode::Exclusive),
            ],
        }
    }
}

/// Row ordering for [`ProductTx::find`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RankOrder {
    /// `shop_rank ASC, created_at DESC, id ASC`: the storefront order.
    #[default]
    Rank,
    /// `created_at DESC, id ASC`: newest first, used for initial ranking.
    Newest,
}

impl RankOrder {
    pub fn compare(&self, a: &ProductRankRecord, b: &ProductRankRecord) -> Ordering {
        let newest = b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id));
        match self {
            RankOrder::Rank => a.shop_rank.cmp(&b.shop_rank).then(newest),
            RankOrder::Newest => newest,
        }
    }
}

/// Predicate over live (not soft-deleted) product rows.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProductFilter {
    pub store_id: Option<StoreId>,
    pub status: Option<ProductStatus>,
    pub ids: Option<Vec<ProductId>>,
    pub exclude_ids: Vec<ProductId>,
    pub rank_above: Option<u32>,
    pub order: RankOrder,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

impl ProductFilter {
    pub fn partition(store_id: StoreId, status: ProductStatus) -> Self {
        Self { store_id: Some(store_id), status: Some(status), ..Self::default() }
    }

    pub fn ids(ids: &[ProductId]) -> Self { Self { ids: Some(ids.to_vec()), ..Self::default() } }

    pub fn with_id(self, id: ProductId) -> Self { self.with_ids(&[id]) }
    pub fn with_ids(mut self, ids: &[ProductId]) -> Self { self.ids = Some(ids.to_vec()); self }
    pub fn in_store(mut self, store_id: StoreId) -> Self { self.store_id = Some(store_id); self }
    pub fn excluding(mut self, ids: &[ProductId]) -> Self { self.exclude_ids.extend_from_slice(ids); self }
    pub fn rank_above(mut self, rank: u32) -> Self { self.rank_above = Some(rank); self }
    pub fn ordered_by(mut self, order: RankOrder) -> Self { self.order = order; self }
    pub fn page(mut self, offset: u64, limit: u64) -> Self { self.offset = Some(offset); self.limit = Some(limit); self }

    pub fn matches(&self, p: &ProductRankRecord) -> bool {
        !p.is_deleted()
            && self.store_id.map_or(true, |s| p.store_id == s)
            && self.status.map_or(true, |s| p.status == s)
            && self.ids.as_ref().map_or(true, |ids| ids.contains(&p.id))
            && !self.exclude_ids.contains(&p.id)
            && self.rank_above.map_or(true, |r| p.shop_rank > r)
    }
}

/// Opens transactions against the backing store.
#[async_trait]
pub trait ProductStore: Send + Sync + 'static {
    type Tx: ProductTx;

    /// Begin a transaction and acquire `scope` before returning it.
    async fn begin(&self, scope: LockScope) -> StoreResult<Self::Tx>;
}

/// A single atomic phase. Dropping a transaction without committing discards its writes.
#[async_trait]
pub trait ProductTx: Send + Sized {
    async fn find(&mut self, filter: &ProductFilter) -> StoreResult<Vec<ProductRankRecord>>;

    async fn count(&mut self, filter: &ProductFilter) -> StoreResult<u64>;

    /// Fetch one row by id, soft-deleted rows included.
    async fn get(&mut self, id: ProductId) -> StoreResult<Option<ProductRankRecord>>;

    async fn set_rank(&mut self, id: ProductId, rank: u32) -> StoreResult<()>;

    /// `shop_rank = shop_rank + delta` for every row matching `filter`. Returns rows touched.
    async fn shift_ranks(&mut self, filter: &ProductFilter, delta: i64) -> StoreResult<u64>;

    /// Zero `shop_rank` for the given stores, or for every product when `None`.
    async fn reset_ranks(&mut self, stores: Option<&[StoreId]>) -> StoreResult<u64>;

    async fn store_state(&mut self, store_id: StoreId) -> StoreResult<Option<StoreRankState>>;

    /// Upsert the `init_rank` flag of one store.
    async fn set_init_rank(&mut self, store_id: StoreId, value: bool) -> StoreResult<()>;

    /// Clear `init_rank` for the given stores, or for every store when `None`.
    async fn clear_init_rank(&mut self, stores: Option<&[StoreId]>) -> StoreResult<u64>;

    async fn insert_product(&mut self, product: &ProductRankRecord) -> StoreResult<()>;

    async fn set_status(&mut self, id: ProductId, status: ProductStatus) -> StoreResult<()>;

    async fn soft_delete(&mut self, id: ProductId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn delete_store(&mut self, store_id: StoreId, at: DateTime<Utc>) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
