use chrono::{Duration as ChronoDuration, Utc};
use opensase_product_sort::domain::{
    Actor, InsertPosition, PageLimit, ProductId, ProductRankRecord, ProductStatus, ResetScope, SortType, StoreId,
    StoreRankState,
};
use opensase_product_sort::store::{InMemoryProductStore, LockScope, ProductStore, ProductTx};
use opensase_product_sort::{EcommerceError, RankService, SortRequest};
use rstest::rstest;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const PUBLISHED: ProductStatus = ProductStatus::Published;

struct Fixture {
    store: Arc<InMemoryProductStore>,
    ranks: RankService<InMemoryProductStore>,
    store_id: StoreId,
}

impl Fixture {
    fn new() -> Self {
        let store = Arc::new(InMemoryProductStore::new());
        Self { ranks: RankService::new(store.clone()), store, store_id: Uuid::new_v4() }
    }

    /// `n` products ranked 1..=n, older products further down.
    async fn seed_ranked(&self, status: ProductStatus, n: u32) -> Vec<ProductId> {
        let now = Utc::now();
        let mut ids = Vec::new();
        for rank in 1..=n {
            let at = now - ChronoDuration::seconds(i64::from(rank));
            let mut p = ProductRankRecord::with_created_at(self.store_id, format!("p{rank}"), status, at);
            p.shop_rank = rank;
            ids.push(p.id);
            self.store.seed(p).await;
        }
        self.mark_initialized().await;
        ids
    }

    async fn mark_initialized(&self) {
        let mut state = StoreRankState::new(self.store_id);
        state.init_rank = true;
        self.store.seed_store(state).await;
    }

    async fn ranks_of(&self, status: ProductStatus) -> HashMap<ProductId, u32> {
        self.store.partition(self.store_id, status).await.into_iter().map(|p| (p.id, p.shop_rank)).collect()
    }

    async fn order_of(&self, status: ProductStatus) -> Vec<ProductId> {
        self.store.partition(self.store_id, status).await.into_iter().map(|p| p.id).collect()
    }

    async fn assert_dense(&self, status: ProductStatus) {
        let mut ranks: Vec<u32> = self.ranks_of(status).await.into_values().collect();
        ranks.sort_unstable();
        let expected: Vec<u32> = (1..=ranks.len() as u32).collect();
        assert_eq!(ranks, expected, "{status} partition is not dense");
    }
}

fn limit(n: u32) -> PageLimit {
    PageLimit::new(n).unwrap()
}

#[tokio::test]
async fn test_init_rank_orders_newest_first() {
    let fx = Fixture::new();
    let now = Utc::now();
    let t1 = ProductRankRecord::with_created_at(fx.store_id, "t1", PUBLISHED, now - ChronoDuration::minutes(3));
    let t2 = ProductRankRecord::with_created_at(fx.store_id, "t2", PUBLISHED, now - ChronoDuration::minutes(2));
    let t3 = ProductRankRecord::with_created_at(fx.store_id, "t3", PUBLISHED, now - ChronoDuration::minutes(1));
    let draft = ProductRankRecord::create(fx.store_id, "draft", ProductStatus::Draft);
    for p in [&t1, &t2, &t3, &draft] {
        fx.store.seed(p.clone()).await;
    }

    assert!(!fx.ranks.check_init_rank(fx.store_id).await.unwrap());
    fx.ranks.init_rank(fx.store_id).await.unwrap();

    let ranks = fx.ranks_of(PUBLISHED).await;
    assert_eq!(ranks[&t3.id], 1);
    assert_eq!(ranks[&t2.id], 2);
    assert_eq!(ranks[&t1.id], 3);
    assert_eq!(fx.store.product(draft.id).await.unwrap().shop_rank, 0);
    assert!(fx.ranks.check_init_rank(fx.store_id).await.unwrap());
}

#[tokio::test]
async fn test_ensure_init_rank_runs_once() {
    let fx = Fixture::new();
    fx.store.seed(ProductRankRecord::create(fx.store_id, "a", PUBLISHED)).await;
    assert!(fx.ranks.ensure_init_rank(fx.store_id).await.unwrap());
    assert!(!fx.ranks.ensure_init_rank(fx.store_id).await.unwrap());
}

#[tokio::test]
async fn test_insert_first_shifts_partition() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 3).await;
    let d = ProductRankRecord::create(fx.store_id, "d", PUBLISHED);
    fx.store.seed(d.clone()).await;

    let rank = fx.ranks.insert_new_rank(fx.store_id, PUBLISHED, d.id, InsertPosition::First).await.unwrap();

    assert_eq!(rank, 1);
    assert_eq!(fx.order_of(PUBLISHED).await, vec![d.id, ids[0], ids[1], ids[2]]);
    fx.assert_dense(PUBLISHED).await;
}

#[tokio::test]
async fn test_insert_last_appends_after_max() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 3).await;
    let d = ProductRankRecord::create(fx.store_id, "d", PUBLISHED);
    fx.store.seed(d.clone()).await;

    let rank = fx.ranks.insert_new_rank(fx.store_id, PUBLISHED, d.id, InsertPosition::Last).await.unwrap();

    assert_eq!(rank, 4);
    assert_eq!(fx.order_of(PUBLISHED).await, vec![ids[0], ids[1], ids[2], d.id]);
}

#[tokio::test]
async fn test_insert_rejects_product_from_other_partition() {
    let fx = Fixture::new();
    fx.seed_ranked(PUBLISHED, 2).await;
    let draft = ProductRankRecord::create(fx.store_id, "draft", ProductStatus::Draft);
    fx.store.seed(draft.clone()).await;

    let err = fx.ranks.insert_new_rank(fx.store_id, PUBLISHED, draft.id, InsertPosition::First).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidData(_)));
    fx.assert_dense(PUBLISHED).await;
}

#[tokio::test]
async fn test_insert_keeps_existing_rank() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 3).await;
    let writes = fx.store.rank_writes().await;

    let rank = fx.ranks.insert_new_rank(fx.store_id, PUBLISHED, ids[1], InsertPosition::First).await.unwrap();

    assert_eq!(rank, 2);
    assert_eq!(fx.order_of(PUBLISHED).await, ids);
    assert_eq!(fx.store.rank_writes().await, writes);
}

#[tokio::test]
async fn test_place_new_product_initializes_or_inserts() {
    let fx = Fixture::new();
    let now = Utc::now();
    let older = ProductRankRecord::with_created_at(fx.store_id, "older", PUBLISHED, now - ChronoDuration::minutes(2));
    let newer = ProductRankRecord::with_created_at(fx.store_id, "newer", PUBLISHED, now - ChronoDuration::minutes(1));
    fx.store.seed(older.clone()).await;
    fx.store.seed(newer.clone()).await;

    let rank = fx.ranks.place_new_product(fx.store_id, PUBLISHED, older.id, InsertPosition::First).await.unwrap();
    assert_eq!(rank, 2);
    let rank = fx.ranks.place_new_product(fx.store_id, PUBLISHED, newer.id, InsertPosition::First).await.unwrap();
    assert_eq!(rank, 1);
    fx.assert_dense(PUBLISHED).await;

    let fresh = ProductRankRecord::create(fx.store_id, "fresh", PUBLISHED);
    fx.store.seed(fresh.clone()).await;
    let rank = fx.ranks.place_new_product(fx.store_id, PUBLISHED, fresh.id, InsertPosition::First).await.unwrap();
    assert_eq!(rank, 1);
    assert_eq!(fx.order_of(PUBLISHED).await, vec![fresh.id, newer.id, older.id]);
}

#[tokio::test]
async fn test_remove_rank_closes_gap() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 4).await;
    let (a, b, c, d) = (ids[0], ids[1], ids[2], ids[3]);

    let mut tx = fx.store.begin(LockScope::None).await.unwrap();
    tx.soft_delete(b, Utc::now()).await.unwrap();
    tx.commit().await.unwrap();

    let shifted = fx.ranks.remove_rank_by_status(fx.store_id, PUBLISHED, b).await.unwrap();

    assert_eq!(shifted, 2);
    let ranks = fx.ranks_of(PUBLISHED).await;
    assert_eq!(ranks.len(), 3);
    assert_eq!((ranks[&a], ranks[&c], ranks[&d]), (1, 2, 3));
}

#[tokio::test]
async fn test_remove_rank_of_unknown_product() {
    let fx = Fixture::new();
    let missing = Uuid::new_v4();
    let err = fx.ranks.remove_rank_by_status(fx.store_id, PUBLISHED, missing).await.unwrap_err();
    assert!(matches!(err, EcommerceError::ProductNotFound(id) if id == missing));
}

#[tokio::test]
async fn test_remove_rank_with_wrong_partition_is_noop() {
    let fx = Fixture::new();
    let published = fx.seed_ranked(PUBLISHED, 3).await;
    let mut proposed = ProductRankRecord::create(fx.store_id, "proposed", ProductStatus::Proposed);
    proposed.shop_rank = 1;
    fx.store.seed(proposed.clone()).await;
    let writes = fx.store.rank_writes().await;

    let shifted = fx.ranks.remove_rank_by_status(fx.store_id, PUBLISHED, proposed.id).await.unwrap();
    assert_eq!(shifted, 0);
    let shifted = fx.ranks.remove_rank_by_status(Uuid::new_v4(), ProductStatus::Proposed, proposed.id).await.unwrap();
    assert_eq!(shifted, 0);

    assert_eq!(fx.order_of(PUBLISHED).await, published);
    fx.assert_dense(PUBLISHED).await;
    assert_eq!(fx.store.rank_writes().await, writes);
}

#[tokio::test]
async fn test_add_bulk_puts_ids_on_top_in_order() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 3).await;
    let x = ProductRankRecord::create(fx.store_id, "x", PUBLISHED);
    let y = ProductRankRecord::create(fx.store_id, "y", PUBLISHED);
    fx.store.seed(x.clone()).await;
    fx.store.seed(y.clone()).await;

    fx.ranks.add_bulk_ranks_by_status(fx.store_id, PUBLISHED, &[y.id, x.id]).await.unwrap();

    assert_eq!(fx.order_of(PUBLISHED).await, vec![y.id, x.id, ids[0], ids[1], ids[2]]);
    fx.assert_dense(PUBLISHED).await;
}

#[tokio::test]
async fn test_re_index_repairs_duplicates_and_gaps() {
    let fx = Fixture::new();
    for rank in [1, 1, 4, 9] {
        let mut p = ProductRankRecord::create(fx.store_id, format!("r{rank}"), PUBLISHED);
        p.shop_rank = rank;
        fx.store.seed(p).await;
    }
    let before = fx.order_of(PUBLISHED).await;

    fx.ranks.re_index_rank_by_status(fx.store_id, PUBLISHED).await.unwrap();

    fx.assert_dense(PUBLISHED).await;
    assert_eq!(fx.order_of(PUBLISHED).await, before);
}

#[tokio::test]
async fn test_swap_reorders_page_and_repeat_is_noop() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 3).await;
    let (a, b, c) = (ids[0], ids[1], ids[2]);

    fx.ranks.swap_rank(fx.store_id, PUBLISHED, &[c, a, b], limit(10)).await.unwrap();
    let ranks = fx.ranks_of(PUBLISHED).await;
    assert_eq!((ranks[&c], ranks[&a], ranks[&b]), (1, 2, 3));

    let writes = fx.store.rank_writes().await;
    let written = fx.ranks.swap_rank(fx.store_id, PUBLISHED, &[c, a, b], limit(10)).await.unwrap();
    assert_eq!(written, 0);
    assert_eq!(fx.store.rank_writes().await, writes);
}

#[tokio::test]
async fn test_swap_rejects_selection_across_pages() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 12).await;
    let before = fx.ranks_of(PUBLISHED).await;
    let writes = fx.store.rank_writes().await;

    let err = fx.ranks.swap_rank(fx.store_id, PUBLISHED, &[ids[8], ids[9], ids[10]], limit(10)).await.unwrap_err();

    assert!(matches!(err, EcommerceError::InvalidData(_)));
    assert_eq!(fx.ranks_of(PUBLISHED).await, before);
    assert_eq!(fx.store.rank_writes().await, writes);
}

#[rstest]
#[case::mixed_statuses(true, false)]
#[case::not_sortable(false, true)]
#[tokio::test]
async fn test_swap_rejects_bad_selection(#[case] mix_statuses: bool, #[case] use_drafts: bool) {
    let fx = Fixture::new();
    let mut ids = fx.seed_ranked(PUBLISHED, 2).await;
    if mix_statuses {
        let mut p = ProductRankRecord::create(fx.store_id, "proposed", ProductStatus::Proposed);
        p.shop_rank = 3;
        ids.push(p.id);
        fx.store.seed(p).await;
    }
    if use_drafts {
        ids.clear();
        for rank in 1..=2 {
            let mut p = ProductRankRecord::create(fx.store_id, "draft", ProductStatus::Draft);
            p.shop_rank = rank;
            ids.push(p.id);
            fx.store.seed(p).await;
        }
    }

    let err = fx.ranks.swap_rank(fx.store_id, PUBLISHED, &ids, limit(10)).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidData(_)));
}

#[tokio::test]
async fn test_swap_rejects_rows_of_another_status() {
    let fx = Fixture::new();
    let proposed = fx.seed_ranked(ProductStatus::Proposed, 3).await;
    let before = fx.ranks_of(ProductStatus::Proposed).await;

    let err = fx
        .ranks
        .swap_rank(fx.store_id, PUBLISHED, &[proposed[2], proposed[0], proposed[1]], limit(10))
        .await
        .unwrap_err();

    assert!(matches!(err, EcommerceError::InvalidData(_)));
    assert_eq!(fx.ranks_of(ProductStatus::Proposed).await, before);

    let actor = Actor::store_owner(Uuid::new_v4(), fx.store_id);
    let request = SortRequest { sort_type: SortType::Swap, ids: vec![proposed[1], proposed[0]], limit: None, status: PUBLISHED };
    let err = fx.ranks.sort_products(&actor, &request).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidData(_)));
    assert_eq!(fx.ranks_of(ProductStatus::Proposed).await, before);
}

#[tokio::test]
async fn test_swap_initializes_store_first() {
    let fx = Fixture::new();
    let now = Utc::now();
    let old = ProductRankRecord::with_created_at(fx.store_id, "old", PUBLISHED, now - ChronoDuration::minutes(2));
    let new = ProductRankRecord::with_created_at(fx.store_id, "new", PUBLISHED, now - ChronoDuration::minutes(1));
    fx.store.seed(old.clone()).await;
    fx.store.seed(new.clone()).await;

    fx.ranks.swap_rank(fx.store_id, PUBLISHED, &[old.id, new.id], limit(10)).await.unwrap();

    let ranks = fx.ranks_of(PUBLISHED).await;
    assert_eq!((ranks[&old.id], ranks[&new.id]), (1, 2));
    assert!(fx.store.store(fx.store_id).await.unwrap().init_rank);
}

#[tokio::test]
async fn test_first_on_first_page_changes_nothing() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 25).await;
    let writes = fx.store.rank_writes().await;

    let written = fx
        .ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::First, &[ids[1], ids[4]], limit(10))
        .await
        .unwrap();

    assert_eq!(written, 0);
    assert_eq!(fx.order_of(PUBLISHED).await, ids);
    assert_eq!(fx.store.rank_writes().await, writes);
}

#[tokio::test]
async fn test_next_moves_item_to_following_page() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 25).await;
    let moved = ids[14];

    fx.ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Next, &[moved], limit(10))
        .await
        .unwrap();

    fx.assert_dense(PUBLISHED).await;
    let rank = fx.ranks_of(PUBLISHED).await[&moved];
    assert_eq!(limit(10).page_of(rank as usize - 1), 3);

    let untouched_before: Vec<ProductId> = ids.iter().copied().filter(|id| *id != moved).collect();
    let untouched_after: Vec<ProductId> = fx.order_of(PUBLISHED).await.into_iter().filter(|id| *id != moved).collect();
    assert_eq!(untouched_after, untouched_before);
}

#[tokio::test]
async fn test_prev_and_last_keep_partition_dense() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 25).await;

    fx.ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Prev, &[ids[21], ids[23]], limit(10))
        .await
        .unwrap();
    fx.assert_dense(PUBLISHED).await;
    let ranks = fx.ranks_of(PUBLISHED).await;
    assert_eq!((ranks[&ids[21]], ranks[&ids[23]]), (11, 12));

    fx.ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Last, &[ids[0]], limit(10))
        .await
        .unwrap();
    fx.assert_dense(PUBLISHED).await;
    assert_eq!(fx.ranks_of(PUBLISHED).await[&ids[0]], 21);
}

#[tokio::test]
async fn test_pagination_rejects_swap_and_oversized_selection() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 5).await;

    let err = fx
        .ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Swap, &ids[..1], limit(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidData(_)));

    let err = fx
        .ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Next, &ids[..3], limit(2))
        .await
        .unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidData(_)));
}

#[tokio::test]
async fn test_sort_products_repairs_then_swaps() {
    let fx = Fixture::new();
    fx.mark_initialized().await;
    let now = Utc::now();
    let mut ids = Vec::new();
    for (i, rank) in [1u32, 1, 2].into_iter().enumerate() {
        let at = now - ChronoDuration::seconds(i as i64);
        let mut p = ProductRankRecord::with_created_at(fx.store_id, format!("p{i}"), PUBLISHED, at);
        p.shop_rank = rank;
        ids.push(p.id);
        fx.store.seed(p).await;
    }
    let actor = Actor::store_owner(Uuid::new_v4(), fx.store_id);
    let request = SortRequest { sort_type: SortType::Swap, ids: vec![ids[2], ids[1], ids[0]], limit: None, status: PUBLISHED };

    fx.ranks.sort_products(&actor, &request).await.unwrap();

    assert_eq!(fx.order_of(PUBLISHED).await, vec![ids[2], ids[1], ids[0]]);
    fx.assert_dense(PUBLISHED).await;
}

#[tokio::test]
async fn test_sort_products_requires_store_and_sortable_status() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 2).await;
    let request = SortRequest { sort_type: SortType::Swap, ids: ids.clone(), limit: None, status: PUBLISHED };

    let err = fx.ranks.sort_products(&Actor::new(Uuid::new_v4(), None), &request).await.unwrap_err();
    assert!(matches!(err, EcommerceError::NotAllowed(_)));

    let actor = Actor::store_owner(Uuid::new_v4(), fx.store_id);
    let drafts = SortRequest { status: ProductStatus::Draft, ..request };
    let err = fx.ranks.sort_products(&actor, &drafts).await.unwrap_err();
    assert!(matches!(err, EcommerceError::InvalidData(_)));
}

#[tokio::test]
async fn test_reset_store_scope_leaves_other_stores() {
    let fx = Fixture::new();
    let other = Fixture { store: fx.store.clone(), ranks: fx.ranks.clone(), store_id: Uuid::new_v4() };
    fx.seed_ranked(PUBLISHED, 3).await;
    other.seed_ranked(PUBLISHED, 3).await;

    fx.ranks.reset_rank(&ResetScope::Store(vec![fx.store_id])).await.unwrap();

    assert!(fx.ranks_of(PUBLISHED).await.values().all(|r| *r == 0));
    assert!(!fx.store.store(fx.store_id).await.unwrap().init_rank);
    other.assert_dense(PUBLISHED).await;
    assert!(fx.store.store(other.store_id).await.unwrap().init_rank);

    fx.ranks.reset_rank(&ResetScope::All).await.unwrap();
    assert!(other.ranks_of(PUBLISHED).await.values().all(|r| *r == 0));
}

#[tokio::test]
async fn test_held_lock_surfaces_as_busy() {
    let store = Arc::new(InMemoryProductStore::with_lock_timeout(Duration::from_millis(20)));
    let ranks = RankService::new(store.clone());
    let store_id = Uuid::new_v4();

    let _held = store.begin(LockScope::store(store_id)).await.unwrap();
    let err = ranks.re_index_rank_by_status(store_id, PUBLISHED).await.unwrap_err();

    assert!(err.is_retryable());
    assert!(matches!(err, EcommerceError::Busy(_)));
}

#[tokio::test]
async fn test_mixed_operations_keep_partitions_dense() {
    let fx = Fixture::new();
    let ids = fx.seed_ranked(PUBLISHED, 14).await;

    let fresh = ProductRankRecord::create(fx.store_id, "fresh", PUBLISHED);
    fx.store.seed(fresh.clone()).await;
    fx.ranks.insert_new_rank(fx.store_id, PUBLISHED, fresh.id, InsertPosition::First).await.unwrap();
    fx.ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Next, &[ids[0], ids[3]], limit(5))
        .await
        .unwrap();
    let page_one: Vec<ProductId> = fx.order_of(PUBLISHED).await.into_iter().take(5).rev().collect();
    fx.ranks.swap_rank(fx.store_id, PUBLISHED, &page_one, limit(5)).await.unwrap();

    let mut tx = fx.store.begin(LockScope::None).await.unwrap();
    tx.soft_delete(ids[7], Utc::now()).await.unwrap();
    tx.commit().await.unwrap();
    fx.ranks.remove_rank_by_status(fx.store_id, PUBLISHED, ids[7]).await.unwrap();

    fx.ranks
        .update_rank_pagination(fx.store_id, PUBLISHED, SortType::Last, &[ids[10]], limit(5))
        .await
        .unwrap();

    fx.assert_dense(PUBLISHED).await;
    assert_eq!(fx.ranks_of(PUBLISHED).await.len(), 14);
}
