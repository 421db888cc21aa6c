//! Error types for mandi-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid days parameter. Allowed values: 7, 15, 30")]
    InvalidWindow(u32),

    #[error("Invalid date: {0}")]
    InvalidDate(String),

    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Decimal parse error: {0}")]
    DecimalParse(#[from] rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
