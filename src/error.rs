use thiserror::Error;

use crate::domain::ProductId;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum EcommerceError {
    /// Caller supplied ids or ranks that violate a rank invariant. Safe to retry after fixing input.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not allowed: {0}")]
    NotAllowed(String),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    /// Another operation holds the partition lock; retryable.
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl EcommerceError {
    pub fn invalid(msg: impl Into<String>) -> Self { Self::InvalidData(msg.into()) }
    pub fn not_allowed(msg: impl Into<String>) -> Self { Self::NotAllowed(msg.into()) }

    pub fn is_retryable(&self) -> bool { matches!(self, Self::Busy(_)) }
}

impl From<StoreError> for EcommerceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::LockTimeout(msg) => Self::Busy(msg),
            StoreError::Database(msg) => Self::Storage(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, EcommerceError>;
