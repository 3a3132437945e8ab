//! Value Objects for product ranking

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

pub type ProductId = Uuid;
pub type StoreId = Uuid;

/// Page size used by the storefront when none is requested.
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Page size (products per page) value object
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct PageLimit(u32);

impl PageLimit {
    pub fn new(value: u32) -> Result<Self, PageLimitError> {
        if value == 0 { return Err(PageLimitError::Zero); }
        if value > MAX_PAGE_LIMIT { return Err(PageLimitError::TooLarge(value)); }
        Ok(Self(value))
    }
    pub fn get(&self) -> u32 { self.0 }
    pub fn as_usize(&self) -> usize { self.0 as usize }

    /// Number of pages needed for `total` items; an empty partition has zero pages.
    pub fn total_pages(&self, total: usize) -> usize { total.div_ceil(self.as_usize()) }

    /// 1-based page holding the 0-based `position`.
    pub fn page_of(&self, position: usize) -> usize { position / self.as_usize() + 1 }

    /// 0-based position of the first slot on the 1-based `page`.
    pub fn page_start(&self, page: usize) -> usize { (page - 1) * self.as_usize() }
}

impl Default for PageLimit { fn default() -> Self { Self(DEFAULT_PAGE_LIMIT) } }

impl TryFrom<u32> for PageLimit {
    type Error = PageLimitError;
    fn try_from(value: u32) -> Result<Self, Self::Error> { Self::new(value) }
}

impl From<PageLimit> for u32 { fn from(limit: PageLimit) -> Self { limit.0 } }

impl fmt::Display for PageLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PageLimitError { Zero, TooLarge(u32) }
impl std::error::Error for PageLimitError {}
impl fmt::Display for PageLimitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Zero => write!(f, "page limit must be positive"),
            Self::TooLarge(v) => write!(f, "page limit {} exceeds {}", v, MAX_PAGE_LIMIT),
        }
    }
}

/// Client-driven reorder request kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortType { Swap, Prev, Next, First, Last }

impl fmt::Display for SortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self { Self::Swap => "SWAP", Self::Prev => "PREV", Self::Next => "NEXT", Self::First => "FIRST", Self::Last => "LAST" };
        f.write_str(s)
    }
}

/// Where a newly ranked product lands in its partition
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertPosition { #[default] First, Last }

/// Target of an administrative rank reset
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "store_ids", rename_all = "lowercase")]
pub enum ResetScope { All, Store(Vec<StoreId>) }

/// Identity of the caller, resolved by the auth gateway in front of this service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub store_id: Option<StoreId>,
    pub is_admin: bool,
}

impl Actor {
    pub fn new(user_id: Uuid, store_id: Option<StoreId>) -> Self { Self { user_id, store_id, is_admin: false } }
    pub fn store_owner(user_id: Uuid, store_id: StoreId) -> Self { Self::new(user_id, Some(store_id)) }
    pub fn admin(user_id: Uuid) -> Self { Self { user_id, store_id: None, is_admin: true } }
    pub fn owns(&self, store_id: StoreId) -> bool { self.store_id == Some(store_id) }
}

impl FromStr for SortType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SWAP" => Ok(Self::Swap), "PREV" => Ok(Self::Prev), "NEXT" => Ok(Self::Next),
            "FIRST" => Ok(Self::First), "LAST" => Ok(Self::Last),
            other => Err(format!("unknown sort type {other}")),
        }
    }
}
