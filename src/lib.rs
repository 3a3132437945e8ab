//! OpenSASE Product Sort
//!
//! Merchant-controlled ordering of products inside a store.
//!
//! ## Features
//! - Dense, per-(store, status) `shop_rank` for proposed and published products
//! - Reordering within a page (swap) and moves across pages (first, last, next, previous)
//! - Rank maintenance driven by product lifecycle events
//! - Administrative reset and lazy re-initialization
//! - PostgreSQL (sqlx) or in-memory storage, optional NATS event forwarding

pub mod api;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod notifier;
pub mod rank;
pub mod store;

pub use catalog::CatalogService;
pub use config::Config;
pub use error::{EcommerceError, Result};
pub use notifier::EventBus;
pub use rank::{RankService, RankSubscriber, SortRequest};
