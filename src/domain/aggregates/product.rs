//! Product Aggregate (rank view)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use crate::domain::value_objects::{ProductId, StoreId};

/// Lifecycle state of a product. Only `Proposed` and `Published` are ranked.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum ProductStatus { #[default] Draft, Proposed, Published, Rejected, Deleted, DeliveryRequest }

impl ProductStatus {
    pub const SORTABLE: [ProductStatus; 2] = [ProductStatus::Proposed, ProductStatus::Published];

    pub fn is_sortable(&self) -> bool { Self::SORTABLE.contains(self) }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Proposed => "proposed",
            Self::Published => "published",
            Self::Rejected => "rejected",
            Self::Deleted => "deleted",
            Self::DeliveryRequest => "delivery_request",
        }
    }
}

impl fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl FromStr for ProductStatus {
    type Err = UnknownStatus;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "proposed" => Ok(Self::Proposed),
            "published" => Ok(Self::Published),
            "rejected" => Ok(Self::Rejected),
            "deleted" => Ok(Self::Deleted),
            "delivery_request" => Ok(Self::DeliveryRequest),
            _ => Err(UnknownStatus(s.to_string())),
        }
    }
}

impl TryFrom<String> for ProductStatus {
    type Error = UnknownStatus;
    fn try_from(value: String) -> Result<Self, Self::Error> { value.parse() }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct UnknownStatus(pub String);
impl std::error::Error for UnknownStatus {}
impl fmt::Display for UnknownStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown product status {}", self.0) }
}

/// The unit being ranked. `shop_rank == 0` means not ranked yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRankRecord {
    pub id: ProductId,
    pub store_id: StoreId,
    pub title: String,
    pub status: ProductStatus,
    pub shop_rank: u32,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ProductRankRecord {
    pub fn create(store_id: StoreId, title: impl Into<String>, status: ProductStatus) -> Self {
        Self::with_created_at(store_id, title, status, Utc::now())
    }

    pub fn with_created_at(store_id: StoreId, title: impl Into<String>, status: ProductStatus, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(), store_id, title: title.into(), status,
            shop_rank: 0, created_at: at, deleted_at: None,
        }
    }

    pub fn is_ranked(&self) -> bool { self.shop_rank > 0 }
    pub fn is_deleted(&self) -> bool { self.deleted_at.is_some() }
    pub fn partition(&self) -> (StoreId, ProductStatus) { (self.store_id, self.status) }
}

/// One per store: whether the sortable partitions have been ranked at least once.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRankState {
    pub store_id: StoreId,
    pub init_rank: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl StoreRankState {
    pub fn new(store_id: StoreId) -> Self { Self { store_id, init_rank: false, deleted_at: None } }
}
