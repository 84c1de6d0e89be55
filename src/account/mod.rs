//! Durable Account Store Interface
//!
//! The account store is an external collaborator: the gateway reads and
//! writes a narrow projection of the account row (stored plan, trial end,
//! usage count) and never owns the durable state itself. Plan mutation via
//! `set_plan` is administrative only and is never invoked by the admission
//! path.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AccountStoreError;
use crate::gateway::entitlement::{AccountSnapshot, Plan};

pub use memory::InMemoryAccountStore;

/// Initial field values for a newly provisioned account.
#[derive(Debug, Clone)]
pub struct NewAccount {
    /// Stored plan for the new row
    pub plan: Plan,

    /// Trial expiry, set when the plan is `trial`
    pub trial_end_at: Option<DateTime<Utc>>,
}

impl NewAccount {
    /// Initial values for a fresh trial account: `plan = trial`,
    /// `trial_end_at = now + trial_period`.
    pub fn trial(now: DateTime<Utc>, trial_period: chrono::Duration) -> Self {
        Self {
            plan: Plan::Trial,
            trial_end_at: Some(now + trial_period),
        }
    }
}

/// Result of a durable usage-counter increment.
///
/// `SchemaMissing` models a backend whose optional accounting column has not
/// been provisioned yet; callers degrade rather than fail (see
/// [`UsageRecorder`](crate::gateway::usage::UsageRecorder)).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageWrite {
    /// Counter incremented
    Applied,
    /// Backend has no usage counter column; increment skipped
    SchemaMissing,
}

/// Narrow interface to the durable account store.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Fetch the account projection, or `None` when no row exists.
    async fn get(&self, account_id: &str) -> Result<Option<AccountSnapshot>, AccountStoreError>;

    /// Create the account row if absent and return the resulting snapshot.
    ///
    /// Idempotent under concurrent duplicate calls: when a row already
    /// exists the stored row wins and `initial` is discarded, so a racing
    /// second caller never re-grants a trial period.
    async fn create_if_absent(
        &self,
        account_id: &str,
        initial: NewAccount,
    ) -> Result<AccountSnapshot, AccountStoreError>;

    /// Increment the usage counter by one.
    async fn increment_usage(&self, account_id: &str) -> Result<UsageWrite, AccountStoreError>;

    /// Administrative plan mutation. Not called by the admission path.
    async fn set_plan(
        &self,
        account_id: &str,
        plan: Plan,
        trial_end_at: Option<DateTime<Utc>>,
    ) -> Result<AccountSnapshot, AccountStoreError>;

    /// Reset every usage counter to zero.
    ///
    /// Invoked only by the periodic usage-reset reconciliation job when
    /// `usage_reset_period` is configured; never by the request path.
    async fn reset_all_usage(&self) -> Result<(), AccountStoreError>;
}
