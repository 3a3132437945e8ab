//! Request extractors.
//!
//! Authentication happens upstream; the gateway forwards the principal as
//! `x-user-id`, `x-store-id` (store owners) and `x-user-role`.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts};
use axum::http::request::Parts;
use axum::http::HeaderMap;
use uuid::Uuid;

use super::error::ApiError;
use crate::domain::Actor;
use crate::error::EcommerceError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const STORE_ID_HEADER: &str = "x-store-id";
pub const ROLE_HEADER: &str = "x-user-role";

/// `axum::Json` with rejections reported as `InvalidData`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

/// The acting principal.
pub struct Caller(pub Actor);

fn uuid_header(headers: &HeaderMap, name: &str) -> Result<Option<Uuid>, EcommerceError> {
    let Some(value) = headers.get(name) else { return Ok(None) };
    value
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .map(Some)
        .ok_or_else(|| EcommerceError::invalid(format!("{name} is not a valid uuid")))
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = uuid_header(&parts.headers, USER_ID_HEADER)?
            .ok_or_else(|| EcommerceError::not_allowed("missing caller identity"))?;
        let store_id = uuid_header(&parts.headers, STORE_ID_HEADER)?;
        let is_admin = parts
            .headers
            .get(ROLE_HEADER)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|role| role.eq_ignore_ascii_case("admin"));
        Ok(Caller(Actor { user_id, store_id, is_admin }))
    }
}
