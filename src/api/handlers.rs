use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::extract::{ApiJson, Caller};
use super::AppState;
use crate::catalog::{NewProduct, PaginatedResponse};
use crate::domain::{ProductId, ProductRankRecord, ProductStatus, ResetScope, SortType, StoreId};
use crate::error::EcommerceError;
use crate::rank::SortRequest;
use crate::store::ProductStore;

type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy", "service": "opensase-product-sort" }))
}

/// Swap answers with a bare 200; page moves echo the request back.
pub async fn sort_products<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    ApiJson(request): ApiJson<SortRequest>,
) -> ApiResult<Response> {
    state.ranks.sort_products(&actor, &request).await?;
    Ok(match request.sort_type {
        SortType::Swap => StatusCode::OK.into_response(),
        _ => Json(request).into_response(),
    })
}

pub async fn create_product<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    ApiJson(new): ApiJson<NewProduct>,
) -> ApiResult<(StatusCode, Json<ProductRankRecord>)> {
    let product = state.catalog.create_product(&actor, new).await?;
    Ok((StatusCode::CREATED, Json(product)))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status: ProductStatus,
}

pub async fn change_status<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    Path(id): Path<ProductId>,
    ApiJson(update): ApiJson<StatusUpdate>,
) -> ApiResult<Json<ProductRankRecord>> {
    Ok(Json(state.catalog.change_status(&actor, id, update.status).await?))
}

pub async fn delete_product<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    Path(id): Path<ProductId>,
) -> ApiResult<StatusCode> {
    state.catalog.delete_product(&actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub status: Option<ProductStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

pub async fn list_products<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    Query(p): Query<ListParams>,
) -> ApiResult<Json<PaginatedResponse<ProductRankRecord>>> {
    Ok(Json(state.catalog.list_products(&actor, p.status, p.page, p.per_page).await?))
}

pub async fn delete_store<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    Path(store_id): Path<StoreId>,
) -> ApiResult<StatusCode> {
    // rank cleanup continues in the background
    let _cleanup = state.catalog.delete_store(&actor, store_id).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn reset_ranks<S: ProductStore>(
    State(state): State<AppState<S>>,
    Caller(actor): Caller,
    ApiJson(scope): ApiJson<ResetScope>,
) -> ApiResult<Json<serde_json::Value>> {
    if !actor.is_admin {
        return Err(EcommerceError::not_allowed("rank reset is admin only").into());
    }
    let reset = state.ranks.reset_rank(&scope).await?;
    Ok(Json(json!({ "reset": reset })))
}
