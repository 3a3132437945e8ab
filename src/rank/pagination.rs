//! Cross-page move planning.
//!
//! Pure functions over a partition already loaded in storefront order. They
//! validate the selection and return only the rank cells that change, so the
//! caller can reject a request before touching the store.

use std::collections::{HashMap, HashSet};

use crate::domain::{PageLimit, ProductId, ProductRankRecord, SortType};
use crate::error::{EcommerceError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RankAssignment {
    pub id: ProductId,
    pub rank: u32,
}

/// Number `order` from `base` upward, keeping only rows whose rank changes.
pub fn sequence<'a>(order: impl IntoIterator<Item = &'a ProductRankRecord>, base: u32) -> Vec<RankAssignment> {
    order
        .into_iter()
        .zip(base..)
        .filter(|(p, rank)| p.shop_rank != *rank)
        .map(|(p, rank)| RankAssignment { id: p.id, rank })
        .collect()
}

/// True when `ranks` are pairwise unique and form one run without gaps.
pub fn is_dense_run(ranks: &[u32]) -> bool {
    let unique: HashSet<u32> = ranks.iter().copied().collect();
    if unique.len() != ranks.len() {
        return false;
    }
    match (ranks.iter().min(), ranks.iter().max()) {
        (Some(min), Some(max)) => (max - min) as usize + 1 == ranks.len(),
        _ => true,
    }
}

pub fn ensure_distinct(ids: &[ProductId]) -> Result<()> {
    let unique: HashSet<&ProductId> = ids.iter().collect();
    if unique.len() != ids.len() {
        return Err(EcommerceError::invalid("duplicate product ids in selection"));
    }
    Ok(())
}

/// Plan a FIRST / LAST / NEXT / PREV move of `ids` within `ordered`.
///
/// Every id must be present in `ordered` and all of them must sit on the same
/// page. An empty result means the move is a no-op.
pub fn plan_page_move(
    ordered: &[ProductRankRecord],
    ids: &[ProductId],
    sort: SortType,
    limit: PageLimit,
) -> Result<Vec<RankAssignment>> {
    if ids.is_empty() {
        return Err(EcommerceError::invalid("no products selected"));
    }
    if ids.len() > limit.as_usize() {
        return Err(EcommerceError::invalid(format!("{} products selected but a page holds {}", ids.len(), limit)));
    }
    ensure_distinct(ids)?;

    let positions: HashMap<ProductId, usize> = ordered.iter().enumerate().map(|(i, p)| (p.id, i)).collect();
    let mut selected_positions = Vec::with_capacity(ids.len());
    for id in ids {
        let pos = positions
            .get(id)
            .ok_or_else(|| EcommerceError::invalid(format!("product {id} is not in this partition")))?;
        selected_positions.push(*pos);
    }
    let moved_page = limit.page_of(selected_positions[0]);
    if selected_positions.iter().any(|pos| limit.page_of(*pos) != moved_page) {
        return Err(EcommerceError::invalid("selected products span more than one page"));
    }

    let total = ordered.len();
    let total_pages = limit.total_pages(total);
    let page = limit.as_usize();
    let selected: HashSet<ProductId> = ids.iter().copied().collect();
    let is_selected = |p: &&ProductRankRecord| selected.contains(&p.id);
    let moved: Vec<&ProductRankRecord> = ordered.iter().filter(is_selected).collect();
    let others: Vec<&ProductRankRecord> = ordered.iter().filter(|p| !is_selected(p)).collect();

    let plan = match sort {
        SortType::Swap => return Err(EcommerceError::invalid("SWAP is not a pagination move")),
        SortType::First => {
            if moved_page == 1 {
                return Ok(vec![]);
            }
            sequence(moved.iter().chain(others.iter()).copied(), 1)
        }
        SortType::Last => {
            if moved_page == total_pages {
                return Ok(vec![]);
            }
            let at = limit.page_start(total_pages).min(total - moved.len());
            let mut order = others;
            order.splice(at..at, moved);
            sequence(order, 1)
        }
        SortType::Next => {
            if moved_page == total_pages {
                return Ok(vec![]);
            }
            let start = limit.page_start(moved_page);
            let next_start = start + page;
            let window_end = (next_start + page).min(total);
            let remainder = ordered[start..next_start].iter().filter(|p| !is_selected(p));
            let next = &ordered[next_start..window_end];
            let lift = moved.len().min(next.len());
            let order: Vec<&ProductRankRecord> = remainder
                .chain(next[..lift].iter())
                .chain(moved.iter().copied())
                .chain(next[lift..].iter())
                .collect();
            let base = window_base(&ordered[start..window_end], start);
            sequence(order, base)
        }
        SortType::Prev => {
            if moved_page == 1 {
                return Ok(vec![]);
            }
            let start = limit.page_start(moved_page);
            let prev_start = start - page;
            let page_end = (start + page).min(total);
            let remainder = ordered[start..page_end].iter().filter(|p| !is_selected(p));
            let order: Vec<&ProductRankRecord> = moved
                .iter()
                .copied()
                .chain(ordered[prev_start..start].iter())
                .chain(remainder)
                .collect();
            let base = window_base(&ordered[prev_start..page_end], prev_start);
            sequence(order, base)
        }
    };
    Ok(plan)
}

/// Lowest rank in a renumbered window; falls back to the window's position if it is unranked.
fn window_base(window: &[ProductRankRecord], start: usize) -> u32 {
    window
        .iter()
        .map(|p| p.shop_rank)
        .min()
        .filter(|rank| *rank > 0)
        .unwrap_or(start as u32 + 1)
}
