//! Aggregates module
pub mod product;

pub use product::{ProductRankRecord, ProductStatus, StoreRankState, UnknownStatus};
