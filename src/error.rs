//! Gateway Error Types
//!
//! This module defines the admission error taxonomy and the durable-store
//! error type. These types are transport-agnostic; the HTTP status mapping
//! lives in the `http` module.

/// Errors surfaced by the admission pipeline.
///
/// Only `AccountStoreUnavailable` may reach a caller as a server fault.
/// `QuotaExceeded` and `RateLimited` are structured denials, and everything
/// else is recovered or degraded before a response is built.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Effective plan does not permit another generation request
    #[error("quota exceeded for plan '{effective_plan}' ({usage_remaining} remaining)")]
    QuotaExceeded {
        effective_plan: String,
        usage_remaining: u64,
    },

    /// Fixed-window counter exhausted for the caller
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },

    /// Durable account store could not be reached on the entitlement path
    #[error("account store unavailable: {0}")]
    AccountStoreUnavailable(String),

    /// Invalid gateway configuration (unknown limiter name, bad settings)
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Errors reported by an [`AccountStore`](crate::account::AccountStore)
/// implementation.
#[derive(Debug, thiserror::Error)]
pub enum AccountStoreError {
    /// Backend unreachable or timed out
    #[error("account store unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected the operation
    #[error("account store rejected operation: {0}")]
    Rejected(String),
}

impl From<AccountStoreError> for GatewayError {
    fn from(err: AccountStoreError) -> Self {
        GatewayError::AccountStoreUnavailable(err.to_string())
    }
}
