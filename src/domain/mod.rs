//! Domain model: ranked products, value objects and lifecycle events.
pub mod aggregates;
pub mod events;
pub mod value_objects;

pub use aggregates::{ProductRankRecord, ProductStatus, StoreRankState};
pub use events::{ProductEvent, ProductEventKind};
pub use value_objects::{Actor, InsertPosition, PageLimit, ProductId, ResetScope, SortType, StoreId};
