//! In-memory Product Store.
//!
//! All tables live behind one `tokio::sync::Mutex`. A transaction owns the
//! guard for its whole lifetime and works on a copy of the tables; commit
//! swaps the copy in, rollback (or drop) discards it. This serializes every
//! transaction, which is a superset of what any [`LockScope`] asks for.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};

use super::{LockScope, ProductFilter, ProductStore, ProductTx, StoreError, StoreResult};
use crate::domain::{ProductId, ProductRankRecord, ProductStatus, StoreId, StoreRankState};

const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone, Debug, Default)]
struct Tables {
    products: HashMap<ProductId, ProductRankRecord>,
    stores: HashMap<StoreId, StoreRankState>,
    rank_writes: u64,
}

#[derive(Clone)]
pub struct InMemoryProductStore {
    tables: Arc<Mutex<Tables>>,
    lock_timeout: Duration,
}

impl Default for InMemoryProductStore {
    fn default() -> Self { Self::new() }
}

impl InMemoryProductStore {
    pub fn new() -> Self { Self::with_lock_timeout(DEFAULT_LOCK_TIMEOUT) }

    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self { tables: Arc::new(Mutex::new(Tables::default())), lock_timeout }
    }

    /// Seed a row as-is, bypassing the engine.
    pub async fn seed(&self, product: ProductRankRecord) {
        let mut tables = self.tables.lock().await;
        tables.stores.entry(product.store_id).or_insert_with(|| StoreRankState::new(product.store_id));
        tables.products.insert(product.id, product);
    }

    pub async fn seed_store(&self, state: StoreRankState) {
        self.tables.lock().await.stores.insert(state.store_id, state);
    }

    pub async fn product(&self, id: ProductId) -> Option<ProductRankRecord> {
        self.tables.lock().await.products.get(&id).cloned()
    }

    pub async fn store(&self, id: StoreId) -> Option<StoreRankState> {
        self.tables.lock().await.stores.get(&id).cloned()
    }

    /// Live rows of a partition in storefront order.
    pub async fn partition(&self, store_id: StoreId, status: ProductStatus) -> Vec<ProductRankRecord> {
        let filter = ProductFilter::partition(store_id, status);
        let tables = self.tables.lock().await;
        select(&tables, &filter)
    }

    /// Number of rank cells written by committed transactions.
    pub async fn rank_writes(&self) -> u64 { self.tables.lock().await.rank_writes }
}

fn select(tables: &Tables, filter: &ProductFilter) -> Vec<ProductRankRecord> {
    let mut rows: Vec<_> = tables.products.values().filter(|p| filter.matches(p)).cloned().collect();
    rows.sort_by(|a, b| filter.order.compare(a, b));
    let offset = filter.offset.unwrap_or(0) as usize;
    let limit = filter.limit.map_or(usize::MAX, |l| l as usize);
    rows.into_iter().skip(offset).take(limit).collect()
}

#[async_trait]
impl ProductStore for InMemoryProductStore {
    type Tx = InMemoryTx;

    async fn begin(&self, scope: LockScope) -> StoreResult<InMemoryTx> {
        let guard = tokio::time::timeout(self.lock_timeout, self.tables.clone().lock_owned())
            .await
            .map_err(|_| StoreError::LockTimeout(format!("timed out waiting for {scope:?}")))?;
        let working = (*guard).clone();
        Ok(InMemoryTx { guard, working })
    }
}

#[derive(Debug)]
pub struct InMemoryTx {
    guard: OwnedMutexGuard<Tables>,
    working: Tables,
}

impl InMemoryTx {
    fn product_mut(&mut self, id: ProductId) -> StoreResult<&mut ProductRankRecord> {
        self.working.products.get_mut(&id).ok_or_else(|| StoreError::Database(format!("product {id} does not exist")))
    }
}

#[async_trait]
impl ProductTx for InMemoryTx {
    async fn find(&mut self, filter: &ProductFilter) -> StoreResult<Vec<ProductRankRecord>> {
        Ok(select(&self.working, filter))
    }

    async fn count(&mut self, filter: &ProductFilter) -> StoreResult<u64> {
        Ok(self.working.products.values().filter(|p| filter.matches(p)).count() as u64)
    }

    async fn get(&mut self, id: ProductId) -> StoreResult<Option<ProductRankRecord>> {
        Ok(self.working.products.get(&id).cloned())
    }

    async fn set_rank(&mut self, id: ProductId, rank: u32) -> StoreResult<()> {
        self.product_mut(id)?.shop_rank = rank;
        self.working.rank_writes += 1;
        Ok(())
    }

    async fn shift_ranks(&mut self, filter: &ProductFilter, delta: i64) -> StoreResult<u64> {
        let mut touched = 0;
        for p in self.working.products.values_mut().filter(|p| filter.matches(p)) {
            let shifted = i64::from(p.shop_rank) + delta;
            let Ok(rank) = u32::try_from(shifted) else {
                return Err(StoreError::Database(format!("shop_rank of {} would become {shifted}", p.id)));
            };
            p.shop_rank = rank;
            touched += 1;
        }
        self.working.rank_writes += touched;
        Ok(touched)
    }

    async fn reset_ranks(&mut self, stores: Option<&[StoreId]>) -> StoreResult<u64> {
        let mut touched = 0;
        for p in self.working.products.values_mut() {
            if stores.map_or(true, |s| s.contains(&p.store_id)) {
                p.shop_rank = 0;
                touched += 1;
            }
        }
        self.working.rank_writes += touched;
        Ok(touched)
    }

    async fn store_state(&mut self, store_id: StoreId) -> StoreResult<Option<StoreRankState>> {
        Ok(self.working.stores.get(&store_id).cloned())
    }

    async fn set_init_rank(&mut self, store_id: StoreId, value: bool) -> StoreResult<()> {
        self.working.stores.entry(store_id).or_insert_with(|| StoreRankState::new(store_id)).init_rank = value;
        Ok(())
    }

    async fn clear_init_rank(&mut self, stores: Option<&[StoreId]>) -> StoreResult<u64> {
        let mut touched = 0;
        for state in self.working.stores.values_mut() {
            if stores.map_or(true, |s| s.contains(&state.store_id)) {
                state.init_rank = false;
                touched += 1;
            }
        }
        Ok(touched)
    }

    async fn insert_product(&mut self, product: &ProductRankRecord) -> StoreResult<()> {
        if self.working.products.contains_key(&product.id) {
            return Err(StoreError::Database(format!("duplicate product id {}", product.id)));
        }
        self.working.stores.entry(product.store_id).or_insert_with(|| StoreRankState::new(product.store_id));
        self.working.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn set_status(&mut self, id: ProductId, status: ProductStatus) -> StoreResult<()> {
        self.product_mut(id)?.status = status;
        Ok(())
    }

    async fn soft_delete(&mut self, id: ProductId, at: DateTime<Utc>) -> StoreResult<()> {
        self.product_mut(id)?.deleted_at = Some(at);
        Ok(())
    }

    async fn delete_store(&mut self, store_id: StoreId, at: DateTime<Utc>) -> StoreResult<()> {
        self.working.stores.entry(store_id).or_insert_with(|| StoreRankState::new(store_id)).deleted_at = Some(at);
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        *self.guard = std::mem::take(&mut self.working);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        Ok(())
    }
}
