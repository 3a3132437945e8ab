//! Product mutations that feed the rank subscriber.
//!
//! Every mutation commits first and only then emits its [`ProductEvent`], so
//! handlers always observe the new state.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use validator::Validate;

use crate::domain::value_objects::MAX_PAGE_LIMIT;
use crate::domain::{Actor, ProductEvent, ProductId, ProductRankRecord, ProductStatus, StoreId};
use crate::error::{EcommerceError, Result};
use crate::notifier::EventBus;
use crate::store::{LockScope, ProductFilter, ProductStore, ProductTx};

const DEFAULT_PER_PAGE: u32 = 20;

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255))]
    pub title: String,
    #[serde(default)]
    pub status: ProductStatus,
}

#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: u32,
}

pub struct CatalogService<S> {
    store: Arc<S>,
    bus: EventBus,
}

impl<S> Clone for CatalogService<S> {
    fn clone(&self) -> Self { Self { store: self.store.clone(), bus: self.bus.clone() } }
}

impl<S: ProductStore> CatalogService<S> {
    pub fn new(store: Arc<S>, bus: EventBus) -> Self { Self { store, bus } }

    pub fn bus(&self) -> &EventBus { &self.bus }

    fn require_store(actor: &Actor) -> Result<StoreId> {
        actor.store_id.ok_or_else(|| EcommerceError::not_allowed("caller has no store"))
    }

    fn ensure_owner(actor: &Actor, product: &ProductRankRecord) -> Result<()> {
        if actor.is_admin || actor.owns(product.store_id) {
            Ok(())
        } else {
            Err(EcommerceError::not_allowed(format!("product {} belongs to another store", product.id)))
        }
    }

    /// Live product by id, inside an already open transaction.
    async fn live(tx: &mut S::Tx, id: ProductId) -> Result<ProductRankRecord> {
        match tx.get(id).await? {
            Some(p) if !p.is_deleted() => Ok(p),
            _ => Err(EcommerceError::ProductNotFound(id)),
        }
    }

    pub async fn get_product(&self, id: ProductId) -> Result<ProductRankRecord> {
        let mut tx = self.store.begin(LockScope::None).await?;
        let product = Self::live(&mut tx, id).await?;
        tx.commit().await?;
        Ok(product)
    }

    pub async fn create_product(&self, actor: &Actor, new: NewProduct) -> Result<ProductRankRecord> {
        let store_id = Self::require_store(actor)?;
        new.validate().map_err(|e| EcommerceError::invalid(e.to_string()))?;

        let product = ProductRankRecord::create(store_id, new.title, new.status);
        let mut tx = self.store.begin(LockScope::None).await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;
        info!(product_id = %product.id, %store_id, status = %product.status, "product created");

        self.bus
            .emit(ProductEvent::Created { product_id: product.id, store_id: Some(store_id), status: product.status })
            .await;
        self.get_product(product.id).await
    }

    pub async fn change_status(&self, actor: &Actor, id: ProductId, status: ProductStatus) -> Result<ProductRankRecord> {
        let mut tx = self.store.begin(LockScope::None).await?;
        let product = Self::live(&mut tx, id).await?;
        Self::ensure_owner(actor, &product)?;
        if product.status == status {
            tx.commit().await?;
            return Ok(product);
        }
        tx.set_status(id, status).await?;
        tx.commit().await?;
        debug!(product_id = %id, old = %product.status, new = %status, "status changed");

        self.bus
            .emit(ProductEvent::StatusChanged {
                product_id: id,
                store_id: product.store_id,
                old_status: product.status,
                new_status: status,
            })
            .await;
        self.get_product(id).await
    }

    pub async fn delete_product(&self, actor: &Actor, id: ProductId) -> Result<()> {
        let mut tx = self.store.begin(LockScope::None).await?;
        let product = Self::live(&mut tx, id).await?;
        Self::ensure_owner(actor, &product)?;
        tx.soft_delete(id, Utc::now()).await?;
        tx.commit().await?;
        info!(product_id = %id, store_id = %product.store_id, "product deleted");

        self.bus
            .emit(ProductEvent::Deleted { product_id: id, store_id: product.store_id, status: product.status })
            .await;
        Ok(())
    }

    /// Soft-delete a store. Rank cleanup runs in the background; the returned
    /// handle resolves once every handler has seen the event.
    pub async fn delete_store(&self, actor: &Actor, store_id: StoreId) -> Result<JoinHandle<()>> {
        if !(actor.is_admin || actor.owns(store_id)) {
            return Err(EcommerceError::not_allowed(format!("store {store_id} belongs to someone else")));
        }
        let mut tx = self.store.begin(LockScope::None).await?;
        tx.delete_store(store_id, Utc::now()).await?;
        tx.commit().await?;
        info!(%store_id, "store deleted");
        Ok(self.bus.publish(ProductEvent::StoreDeleted { store_id }))
    }

    /// The caller's products in storefront order.
    pub async fn list_products(
        &self,
        actor: &Actor,
        status: Option<ProductStatus>,
        page: Option<u32>,
        per_page: Option<u32>,
    ) -> Result<PaginatedResponse<ProductRankRecord>> {
        let store_id = Self::require_store(actor)?;
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PAGE_LIMIT);

        let filter = ProductFilter { status, ..ProductFilter::default() }.in_store(store_id);
        let mut tx = self.store.begin(LockScope::None).await?;
        let total = tx.count(&filter).await?;
        let offset = u64::from(page - 1) * u64::from(per_page);
        let data = tx.find(&filter.page(offset, u64::from(per_page))).await?;
        tx.commit().await?;
        Ok(PaginatedResponse { data, total: total as i64, page })
    }
}
