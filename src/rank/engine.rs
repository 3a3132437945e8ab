//! Rank algorithms over an explicit transaction handle.
//!
//! Nothing here commits. Callers (normally [`super::RankService`]) open the
//! transaction, hold the right lock scope and decide whether to commit.
//! Validation always happens before the first write of an operation.

use std::collections::BTreeMap;
use tracing::{debug, info};

use super::pagination::{ensure_distinct, is_dense_run, plan_page_move, sequence, RankAssignment};
use crate::domain::{InsertPosition, PageLimit, ProductId, ProductStatus, ResetScope, SortType, StoreId};
use crate::error::{EcommerceError, Result};
use crate::store::{ProductFilter, ProductTx, RankOrder};

async fn apply<T: ProductTx>(tx: &mut T, plan: &[RankAssignment]) -> Result<usize> {
    for a in plan {
        tx.set_rank(a.id, a.rank).await?;
    }
    Ok(plan.len())
}

fn ensure_sortable(status: ProductStatus) -> Result<()> {
    if !status.is_sortable() {
        return Err(EcommerceError::invalid(format!("status {status} is not ranked")));
    }
    Ok(())
}

pub async fn check_init_rank<T: ProductTx>(tx: &mut T, store_id: StoreId) -> Result<bool> {
    Ok(tx.store_state(store_id).await?.is_some_and(|s| s.init_rank))
}

/// Rank every sortable partition of the store newest-first and mark the store initialized.
pub async fn init_rank<T: ProductTx>(tx: &mut T, store_id: StoreId) -> Result<usize> {
    let mut written = 0;
    for status in ProductStatus::SORTABLE {
        let filter = ProductFilter::partition(store_id, status).ordered_by(RankOrder::Newest);
        let rows = tx.find(&filter).await?;
        written += apply(tx, &sequence(rows.iter(), 1)).await?;
    }
    tx.set_init_rank(store_id, true).await?;
    info!(%store_id, written, "store ranks initialized");
    Ok(written)
}

/// Give a product that just joined an initialized partition its first rank.
///
/// A product that already holds a rank keeps it: a repeated or late event
/// must not shift the partition a second time.
pub async fn insert_new_rank<T: ProductTx>(
    tx: &mut T,
    store_id: StoreId,
    status: ProductStatus,
    id: ProductId,
    position: InsertPosition,
) -> Result<u32> {
    ensure_sortable(status)?;
    let Some(product) = tx.find(&ProductFilter::partition(store_id, status).with_id(id)).await?.pop() else {
        return Err(EcommerceError::invalid(format!("product {id} is not in {store_id}/{status}")));
    };
    if product.is_ranked() {
        debug!(%store_id, %status, %id, rank = product.shop_rank, "already ranked");
        return Ok(product.shop_rank);
    }
    let others = ProductFilter::partition(store_id, status).excluding(&[id]);
    let rank = match position {
        InsertPosition::First => {
            tx.shift_ranks(&others, 1).await?;
            1
        }
        InsertPosition::Last => tx.count(&others).await? as u32 + 1,
    };
    tx.set_rank(id, rank).await?;
    debug!(%store_id, %status, %id, rank, "rank inserted");
    Ok(rank)
}

/// Rank a freshly created product: initialize the store if it never was,
/// otherwise insert the product at `position`. Returns the product's rank.
pub async fn place_new_product<T: ProductTx>(
    tx: &mut T,
    store_id: StoreId,
    status: ProductStatus,
    id: ProductId,
    position: InsertPosition,
) -> Result<u32> {
    if check_init_rank(tx, store_id).await? {
        return insert_new_rank(tx, store_id, status, id, position).await;
    }
    init_rank(tx, store_id).await?;
    let product = tx.get(id).await?.ok_or(EcommerceError::ProductNotFound(id))?;
    Ok(product.shop_rank)
}

/// Close the gap a product leaves behind. The product's own rank is left alone.
/// A product that is not in `(store_id, status)` leaves that partition untouched.
pub async fn remove_rank_by_status<T: ProductTx>(
    tx: &mut T,
    store_id: StoreId,
    status: ProductStatus,
    id: ProductId,
) -> Result<u64> {
    let product = tx.get(id).await?.ok_or(EcommerceError::ProductNotFound(id))?;
    if product.store_id != store_id || product.status != status {
        debug!(%store_id, %status, %id, actual = %product.status, "product not in partition, nothing to remove");
        return Ok(0);
    }
    if product.shop_rank == 0 {
        return Ok(0);
    }
    let above = ProductFilter::partition(store_id, status).excluding(&[id]).rank_above(product.shop_rank);
    let shifted = tx.shift_ranks(&above, -1).await?;
    debug!(%store_id, %status, %id, rank = product.shop_rank, shifted, "rank removed");
    Ok(shifted)
}

/// Put `ids` on top of the partition, in input order, pushing everyone else down.
pub async fn add_bulk_ranks_by_status<T: ProductTx>(
    tx: &mut T,
    store_id: StoreId,
    status: ProductStatus,
    ids: &[ProductId],
) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }
    ensure_sortable(status)?;
    ensure_distinct(ids)?;
    let members = tx.count(&ProductFilter::partition(store_id, status).with_ids(ids)).await?;
    if members as usize != ids.len() {
        return Err(EcommerceError::invalid(format!("not every product is in {store_id}/{status}")));
    }
    let others = ProductFilter::partition(store_id, status).excluding(ids);
    tx.shift_ranks(&others, ids.len() as i64).await?;
    for (id, rank) in ids.iter().zip(1..) {
        tx.set_rank(*id, rank).await?;
    }
    debug!(%store_id, %status, count = ids.len(), "bulk ranks added");
    Ok(ids.len())
}

/// Renumber the partition 1..N keeping its current order.
pub async fn re_index_rank_by_status<T: ProductTx>(tx: &mut T, store_id: StoreId, status: ProductStatus) -> Result<usize> {
    let rows = tx.find(&ProductFilter::partition(store_id, status)).await?;
    let written = apply(tx, &sequence(rows.iter(), 1)).await?;
    debug!(%store_id, %status, written, "partition re-indexed");
    Ok(written)
}

/// Re-index every sortable partition in which the ranks of `ids` are duplicated or gapped.
pub async fn check_rank_store<T: ProductTx>(tx: &mut T, store_id: StoreId, ids: &[ProductId]) -> Result<bool> {
    let rows = tx.find(&ProductFilter::ids(ids).in_store(store_id)).await?;
    let mut groups: BTreeMap<ProductStatus, Vec<u32>> = BTreeMap::new();
    for p in rows.iter().filter(|p| p.status.is_sortable()) {
        groups.entry(p.status).or_default().push(p.shop_rank);
    }
    let mut repaired = false;
    for (status, ranks) in groups {
        if !is_dense_run(&ranks) {
            info!(%store_id, %status, ?ranks, "inconsistent ranks, re-indexing");
            re_index_rank_by_status(tx, store_id, status).await?;
            repaired = true;
        }
    }
    Ok(repaired)
}

/// Reorder products of one `(store_id, status)` page: `ids[i]` gets `minRank + i`.
pub async fn swap_rank<T: ProductTx>(
    tx: &mut T,
    store_id: StoreId,
    status: ProductStatus,
    ids: &[ProductId],
    limit: PageLimit,
) -> Result<usize> {
    ensure_sortable(status)?;
    if ids.is_empty() {
        return Err(EcommerceError::invalid("no products selected"));
    }
    if ids.len() > limit.as_usize() {
        return Err(EcommerceError::invalid(format!("{} products selected but a page holds {}", ids.len(), limit)));
    }
    ensure_distinct(ids)?;

    let filter = ProductFilter::ids(ids).in_store(store_id);
    let mut rows = tx.find(&filter).await?;
    if rows.len() != ids.len() {
        return Err(EcommerceError::invalid("unknown product ids in selection"));
    }
    if !check_init_rank(tx, store_id).await? {
        init_rank(tx, store_id).await?;
        rows = tx.find(&filter).await?;
    }

    if let Some(other) = rows.iter().find(|p| p.status != status) {
        return Err(EcommerceError::invalid(format!("product {} is {}, not {status}", other.id, other.status)));
    }

    let ranks: Vec<u32> = rows.iter().map(|p| p.shop_rank).collect();
    if !is_dense_run(&ranks) {
        return Err(EcommerceError::invalid(format!("ranks {ranks:?} are not unique and consecutive")));
    }
    let min_rank = ranks.iter().copied().min().unwrap_or(1);
    if min_rank == 0 || (min_rank - 1) % limit.get() != 0 {
        return Err(EcommerceError::invalid(format!("selection starting at rank {min_rank} is not aligned to pages of {limit}")));
    }

    let current: BTreeMap<ProductId, u32> = rows.iter().map(|p| (p.id, p.shop_rank)).collect();
    let plan: Vec<RankAssignment> = ids
        .iter()
        .zip(min_rank..)
        .filter(|(id, rank)| current.get(*id) != Some(rank))
        .map(|(id, rank)| RankAssignment { id: *id, rank })
        .collect();
    let written = apply(tx, &plan).await?;
    debug!(%store_id, %status, min_rank, written, "page reordered");
    Ok(written)
}

/// Move `ids` to the first, last, next or previous page of their partition.
pub async fn update_rank_pagination<T: ProductTx>(
    tx: &mut T,
    store_id: StoreId,
    status: ProductStatus,
    sort: SortType,
    ids: &[ProductId],
    limit: PageLimit,
) -> Result<usize> {
    ensure_sortable(status)?;
    if sort == SortType::Swap {
        return Err(EcommerceError::invalid("SWAP is not a pagination move"));
    }
    if ids.len() > limit.as_usize() {
        return Err(EcommerceError::invalid(format!("{} products selected but a page holds {}", ids.len(), limit)));
    }
    if !check_init_rank(tx, store_id).await? {
        init_rank(tx, store_id).await?;
    }
    let ordered = tx.find(&ProductFilter::partition(store_id, status)).await?;
    let plan = plan_page_move(&ordered, ids, sort, limit)?;
    let written = apply(tx, &plan).await?;
    debug!(%store_id, %status, %sort, written, "page move applied");
    Ok(written)
}

pub async fn reset_rank<T: ProductTx>(tx: &mut T, scope: &ResetScope) -> Result<u64> {
    let stores = match scope {
        ResetScope::All => None,
        ResetScope::Store(ids) => Some(ids.as_slice()),
    };
    let products = tx.reset_ranks(stores).await?;
    let flags = tx.clear_init_rank(stores).await?;
    info!(?scope, products, flags, "ranks reset");
    Ok(products)
}
