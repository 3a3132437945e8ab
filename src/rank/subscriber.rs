//! Keeps ranks consistent with product lifecycle events.
//!
//! A ranking failure never reaches the code that mutated the product: every
//! error is logged here and dropped. Drift left behind is repaired by the
//! next `check_rank_store` / `re_index_rank_by_status`.

use async_trait::async_trait;
use tracing::{error, info, instrument};

use super::RankService;
use crate::domain::{InsertPosition, ProductEvent, ProductId, ProductStatus, ResetScope, StoreId};
use crate::error::Result;
use crate::notifier::{EventBus, ProductEventHandler};
use crate::store::ProductStore;

pub struct RankSubscriber<S> {
    ranks: RankService<S>,
}

impl<S: ProductStore> RankSubscriber<S> {
    pub fn new(ranks: RankService<S>) -> Self { Self { ranks } }

    /// Subscribe a new rank subscriber to every product event on `bus`.
    pub fn register(ranks: RankService<S>, bus: &EventBus) {
        bus.subscribe_all(std::sync::Arc::new(Self::new(ranks)));
    }

    async fn on_created(&self, product_id: ProductId, store_id: Option<StoreId>, status: ProductStatus) -> Result<()> {
        let Some(store_id) = store_id else { return Ok(()) };
        if !status.is_sortable() {
            return Ok(());
        }
        self.ranks.place_new_product(store_id, status, product_id, InsertPosition::First).await?;
        Ok(())
    }

    async fn on_status_changed(&self, product_id: ProductId, store_id: StoreId, old: ProductStatus, new: ProductStatus) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.ranks.ensure_init_rank(store_id).await? {
            return Ok(());
        }
        if old.is_sortable() {
            self.ranks.re_index_rank_by_status(store_id, old).await?;
        }
        if new.is_sortable() {
            self.ranks.add_bulk_ranks_by_status(store_id, new, &[product_id]).await?;
        }
        Ok(())
    }

    async fn on_deleted(&self, product_id: ProductId, store_id: StoreId, status: ProductStatus) -> Result<()> {
        if status.is_sortable() {
            self.ranks.remove_rank_by_status(store_id, status, product_id).await?;
        }
        Ok(())
    }

    async fn on_store_deleted(&self, store_id: StoreId) -> Result<()> {
        let reset = self.ranks.reset_rank(&ResetScope::Store(vec![store_id])).await?;
        info!(%store_id, reset, "ranks cleared for deleted store");
        Ok(())
    }

    pub async fn dispatch(&self, event: &ProductEvent) -> Result<()> {
        match *event {
            ProductEvent::Created { product_id, store_id, status } => self.on_created(product_id, store_id, status).await,
            ProductEvent::StatusChanged { product_id, store_id, old_status, new_status } => {
                self.on_status_changed(product_id, store_id, old_status, new_status).await
            }
            ProductEvent::Deleted { product_id, store_id, status } => self.on_deleted(product_id, store_id, status).await,
            ProductEvent::StoreDeleted { store_id } => self.on_store_deleted(store_id).await,
        }
    }
}

#[async_trait]
impl<S: ProductStore> ProductEventHandler for RankSubscriber<S> {
    fn name(&self) -> &'static str { "rank-subscriber" }

    #[instrument(skip_all, fields(event = event.kind().as_str()))]
    async fn handle(&self, event: &ProductEvent) {
        if let Err(e) = self.dispatch(event).await {
            error!(error = %e, ?event, "rank maintenance failed");
        }
    }
}
