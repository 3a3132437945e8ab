//! HTTP surface (axum).

pub mod error;
pub mod extract;
pub mod handlers;

pub use error::ApiError;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::catalog::CatalogService;
use crate::rank::RankService;
use crate::store::ProductStore;

pub struct AppState<S> {
    pub ranks: RankService<S>,
    pub catalog: CatalogService<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self { Self { ranks: self.ranks.clone(), catalog: self.catalog.clone() } }
}

pub fn router<S: ProductStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/products", get(handlers::list_products::<S>).post(handlers::create_product::<S>))
        .route("/api/v1/products/sort", post(handlers::sort_products::<S>))
        .route("/api/v1/products/:id", delete(handlers::delete_product::<S>))
        .route("/api/v1/products/:id/status", put(handlers::change_status::<S>))
        .route("/api/v1/stores/:id", delete(handlers::delete_store::<S>))
        .route("/api/v1/admin/ranks/reset", post(handlers::reset_ranks::<S>))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()).layer(CorsLayer::permissive()))
        .with_state(state)
}
