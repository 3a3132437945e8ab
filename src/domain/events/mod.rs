//! Domain events
use crate::domain::aggregates::ProductStatus;
use crate::domain::value_objects::{ProductId, StoreId};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProductEventKind { Created, StatusChanged, Deleted, StoreDeleted }

impl ProductEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::StatusChanged => "status_changed",
            Self::Deleted => "deleted",
            Self::StoreDeleted => "store_deleted",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProductEvent {
    Created { product_id: ProductId, store_id: Option<StoreId>, status: ProductStatus },
    StatusChanged { product_id: ProductId, store_id: StoreId, old_status: ProductStatus, new_status: ProductStatus },
    Deleted { product_id: ProductId, store_id: StoreId, status: ProductStatus },
    StoreDeleted { store_id: StoreId },
}

impl ProductEvent {
    pub fn kind(&self) -> ProductEventKind {
        match self {
            Self::Created { .. } => ProductEventKind::Created,
            Self::StatusChanged { .. } => ProductEventKind::StatusChanged,
            Self::Deleted { .. } => ProductEventKind::Deleted,
            Self::StoreDeleted { .. } => ProductEventKind::StoreDeleted,
        }
    }
}
