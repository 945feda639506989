use thiserror::Error;

use crate::market::types::Credits;

/// Errors surfaced by the market engine. Everything except the storage
/// wrappers is a recoverable-by-caller condition, not a crash.
#[derive(Debug, Error)]
pub enum MarketError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Returned when fetching a record that is not present.
    #[error("record not found: {0}")]
    NotFound(String),

    /// Non-owner attempted a seller-only or owner-only action.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// A domain rule rejected the operation (self-trade, inactive listing,
    /// insufficient stock, shop not sellable, retry exhaustion).
    #[error("{0}")]
    BusinessRule(String),

    /// Buyer cannot cover the total cost of the requested quantity.
    #[error("insufficient balance: {needed} credits required")]
    InsufficientBalance { needed: Credits },

    /// A concurrent writer advanced the row version first. Retried inside
    /// the trade path; never surfaced to callers directly.
    #[error("optimistic write conflict")]
    Conflict,

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },

    /// Internal error (unexpected conditions).
    #[error("internal error: {0}")]
    Internal(String),
}

impl MarketError {
    /// The user-facing error produced after optimistic retries are exhausted.
    pub fn contention() -> Self {
        MarketError::BusinessRule(
            "the market is busy right now, please try again".to_string(),
        )
    }
}
