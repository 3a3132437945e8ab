//! Product rank engine.
//!
//! Ranks are dense, 1-based and unique inside each (store, status) partition
//! of sortable products. [`engine`] holds the algorithms, [`pagination`] the
//! pure cross-page planning, [`RankService`] wraps each algorithm in one
//! transaction holding a lock scope, and [`subscriber::RankSubscriber`] keeps
//! ranks in step with product lifecycle events.

pub mod engine;
pub mod pagination;
pub mod subscriber;

pub use pagination::RankAssignment;
pub use subscriber::RankSubscriber;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use validator::Validate;

use crate::domain::{Actor, InsertPosition, PageLimit, ProductId, ProductStatus, ResetScope, SortType, StoreId};
use crate::error::{EcommerceError, Result};
use crate::store::{LockScope, ProductStore, ProductTx};

/// Body of `POST /products/sort`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct SortRequest {
    #[serde(rename = "type")]
    pub sort_type: SortType,
    #[validate(length(min = 1, max = 100))]
    pub ids: Vec<ProductId>,
    #[serde(default)]
    pub limit: Option<PageLimit>,
    pub status: ProductStatus,
}

pub struct RankService<S> {
    store: Arc<S>,
}

impl<S> Clone for RankService<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone() } }
}

impl<S: ProductStore> RankService<S> {
    pub fn new(store: Arc<S>) -> Self { Self { store } }

    pub fn store(&self) -> &Arc<S> { &self.store }

    async fn finish<T>(tx: S::Tx, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => {
                tx.commit().await?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    pub async fn check_init_rank(&self, store_id: StoreId) -> Result<bool> {
        let mut tx = self.store.begin(LockScope::None).await?;
        let result = engine::check_init_rank(&mut tx, store_id).await;
        Self::finish(tx, result).await
    }

    pub async fn init_rank(&self, store_id: StoreId) -> Result<usize> {
        let mut tx = self.store.begin(LockScope::store(store_id)).await?;
        let result = engine::init_rank(&mut tx, store_id).await;
        Self::finish(tx, result).await
    }

    /// Initialize the store unless already done. Returns whether it ran.
    pub async fn ensure_init_rank(&self, store_id: StoreId) -> Result<bool> {
        let mut tx = self.store.begin(LockScope::store(store_id)).await?;
        let result: Result<bool> = async {
            if engine::check_init_rank(&mut tx, store_id).await? {
                return Ok(false);
            }
            engine::init_rank(&mut tx, store_id).await.map(|_| true)
        }
        .await;
        Self::finish(tx, result).await
    }

    pub async fn insert_new_rank(&self, store_id: StoreId, status: ProductStatus, id: ProductId, position: InsertPosition) -> Result<u32> {
        let mut tx = self.store.begin(LockScope::Partition(store_id, status)).await?;
        let result = engine::insert_new_rank(&mut tx, store_id, status, id, position).await;
        Self::finish(tx, result).await
    }

    /// Rank a newly created product in one store-locked transaction.
    pub async fn place_new_product(&self, store_id: StoreId, status: ProductStatus, id: ProductId, position: InsertPosition) -> Result<u32> {
        let mut tx = self.store.begin(LockScope::store(store_id)).await?;
        let result = engine::place_new_product(&mut tx, store_id, status, id, position).await;
        Self::finish(tx, result).await
    }

    pub async fn remove_rank_by_status(&self, store_id: StoreId, status: ProductStatus, id: ProductId) -> Result<u64> {
        let mut tx = self.store.begin(LockScope::Partition(store_id, status)).await?;
        let result = engine::remove_rank_by_status(&mut tx, store_id, status, id).await;
        Self::finish(tx, result).await
    }

    pub async fn add_bulk_ranks_by_status(&self, store_id: StoreId, status: ProductStatus, ids: &[ProductId]) -> Result<usize> {
        let mut tx = self.store.begin(LockScope::Partition(store_id, status)).await?;
        let result = engine::add_bulk_ranks_by_status(&mut tx, store_id, status, ids).await;
        Self::finish(tx, result).await
    }

    pub async fn re_index_rank_by_status(&self, store_id: StoreId, status: ProductStatus) -> Result<usize> {
        let mut tx = self.store.begin(LockScope::Partition(store_id, status)).await?;
        let result = engine::re_index_rank_by_status(&mut tx, store_id, status).await;
        Self::finish(tx, result).await
    }

    pub async fn check_rank_store(&self, store_id: StoreId, ids: &[ProductId]) -> Result<bool> {
        let mut tx = self.store.begin(LockScope::store(store_id)).await?;
        let result = engine::check_rank_store(&mut tx, store_id, ids).await;
        Self::finish(tx, result).await
    }

    pub async fn swap_rank(&self, store_id: StoreId, status: ProductStatus, ids: &[ProductId], limit: PageLimit) -> Result<usize> {
        let mut tx = self.store.begin(LockScope::store(store_id)).await?;
        let result = engine::swap_rank(&mut tx, store_id, status, ids, limit).await;
        Self::finish(tx, result).await
    }

    pub async fn update_rank_pagination(
        &self,
        store_id: StoreId,
        status: ProductStatus,
        sort: SortType,
        ids: &[ProductId],
        limit: PageLimit,
    ) -> Result<usize> {
        let mut tx = self.store.begin(LockScope::store(store_id)).await?;
        let result = engine::update_rank_pagination(&mut tx, store_id, status, sort, ids, limit).await;
        Self::finish(tx, result).await
    }

    pub async fn reset_rank(&self, scope: &ResetScope) -> Result<u64> {
        let lock = match scope {
            ResetScope::All => LockScope::Global,
            ResetScope::Store(ids) => LockScope::Stores(ids.clone()),
        };
        let mut tx = self.store.begin(lock).await?;
        let result = engine::reset_rank(&mut tx, scope).await;
        Self::finish(tx, result).await
    }

    /// Client-driven reorder: repair the selection's partition if needed, then
    /// dispatch to [`Self::swap_rank`] or [`Self::update_rank_pagination`].
    pub async fn sort_products(&self, actor: &Actor, request: &SortRequest) -> Result<usize> {
        let store_id = actor
            .store_id
            .ok_or_else(|| EcommerceError::not_allowed("sorting requires a store owner"))?;
        request.validate().map_err(|e| EcommerceError::invalid(e.to_string()))?;
        if !request.status.is_sortable() {
            return Err(EcommerceError::invalid(format!("status {} is not ranked", request.status)));
        }
        let limit = request.limit.unwrap_or_default();
        self.check_rank_store(store_id, &request.ids).await?;
        match request.sort_type {
            SortType::Swap => self.swap_rank(store_id, request.status, &request.ids, limit).await,
            sort => self.update_rank_pagination(store_id, request.status, sort, &request.ids, limit).await,
        }
    }
}
