//! In-Memory Account Store
//!
//! Reference implementation backing tests and local runs. Stored plans are
//! kept as raw strings so unrecognized values survive round-trips and
//! exercise the default-to-free projection, matching what a loosely typed
//! durable backend would return.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::AccountStoreError;
use crate::gateway::entitlement::{AccountSnapshot, Plan};

use super::{AccountStore, NewAccount, UsageWrite};

/// One durable account row.
#[derive(Debug, Clone)]
struct AccountRow {
    /// Stored plan as written, not validated on read
    plan: String,

    /// Trial expiry, present iff the account was ever placed in trial
    trial_end_at: Option<DateTime<Utc>>,

    /// Cumulative usage counter
    usage_count: u64,
}

impl AccountRow {
    fn snapshot(&self, account_id: &str) -> AccountSnapshot {
        AccountSnapshot {
            account_id: account_id.to_string(),
            plan: Plan::parse(&self.plan),
            trial_end_at: self.trial_end_at,
            usage_count: self.usage_count,
        }
    }
}

/// In-memory account store.
#[derive(Debug, Clone)]
pub struct InMemoryAccountStore {
    rows: Arc<RwLock<HashMap<String, AccountRow>>>,

    /// Simulates a backend without the optional usage counter column
    usage_column_present: bool,
}

impl InMemoryAccountStore {
    /// Create an empty store with the usage column present.
    pub fn new() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            usage_column_present: true,
        }
    }

    /// Create a store whose backend lacks the usage counter column, so every
    /// increment reports [`UsageWrite::SchemaMissing`].
    pub fn without_usage_column() -> Self {
        Self {
            rows: Arc::new(RwLock::new(HashMap::new())),
            usage_column_present: false,
        }
    }

    /// Seed a row with an arbitrary stored plan string, bypassing plan
    /// validation. Lets tests model legacy or corrupted rows.
    pub async fn seed_raw(
        &self,
        account_id: &str,
        plan: &str,
        trial_end_at: Option<DateTime<Utc>>,
        usage_count: u64,
    ) {
        let mut rows = self.rows.write().await;
        rows.insert(
            account_id.to_string(),
            AccountRow {
                plan: plan.to_string(),
                trial_end_at,
                usage_count,
            },
        );
    }

    /// Number of stored rows.
    pub async fn count(&self) -> usize {
        self.rows.read().await.len()
    }
}

impl Default for InMemoryAccountStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn get(&self, account_id: &str) -> Result<Option<AccountSnapshot>, AccountStoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(account_id).map(|row| row.snapshot(account_id)))
    }

    async fn create_if_absent(
        &self,
        account_id: &str,
        initial: NewAccount,
    ) -> Result<AccountSnapshot, AccountStoreError> {
        let mut rows = self.rows.write().await;

        if let Some(existing) = rows.get(account_id) {
            // Duplicate initialization race: the stored row wins.
            tracing::debug!(account_id, "account already exists, returning stored row");
            return Ok(existing.snapshot(account_id));
        }

        let row = AccountRow {
            plan: initial.plan.as_str().to_string(),
            trial_end_at: initial.trial_end_at,
            usage_count: 0,
        };
        let snapshot = row.snapshot(account_id);
        rows.insert(account_id.to_string(), row);
        Ok(snapshot)
    }

    async fn increment_usage(&self, account_id: &str) -> Result<UsageWrite, AccountStoreError> {
        if !self.usage_column_present {
            return Ok(UsageWrite::SchemaMissing);
        }

        let mut rows = self.rows.write().await;
        match rows.get_mut(account_id) {
            Some(row) => {
                row.usage_count += 1;
                Ok(UsageWrite::Applied)
            }
            None => Err(AccountStoreError::Rejected(format!(
                "no account row for '{account_id}'"
            ))),
        }
    }

    async fn set_plan(
        &self,
        account_id: &str,
        plan: Plan,
        trial_end_at: Option<DateTime<Utc>>,
    ) -> Result<AccountSnapshot, AccountStoreError> {
        let mut rows = self.rows.write().await;
        let row = rows
            .entry(account_id.to_string())
            .or_insert_with(|| AccountRow {
                plan: plan.as_str().to_string(),
                trial_end_at: None,
                usage_count: 0,
            });

        row.plan = plan.as_str().to_string();
        if let Some(end) = trial_end_at {
            row.trial_end_at = Some(end);
        }
        Ok(row.snapshot(account_id))
    }

    async fn reset_all_usage(&self) -> Result<(), AccountStoreError> {
        let mut rows = self.rows.write().await;
        for row in rows.values_mut() {
            row.usage_count = 0;
        }
        Ok(())
    }
}
