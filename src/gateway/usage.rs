//! Usage Recording
//!
//! Increments the durable usage counter after a generation attempt and
//! re-derives the post-increment entitlement decision. Usage accounting is
//! advisory: a backend without the optional counter column, or a transient
//! store failure, degrades to a default decision with a warning instead of
//! failing the caller's request.

use std::sync::Arc;

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::warn;

use crate::account::{AccountStore, UsageWrite};
use crate::config::UsageResetPeriod;
use crate::gateway::entitlement::{EntitlementDecision, EntitlementResolver};
use crate::metrics;

/// Records usage attempts against the durable store.
#[derive(Clone)]
pub struct UsageRecorder {
    store: Arc<dyn AccountStore>,
    resolver: EntitlementResolver,
}

impl UsageRecorder {
    /// Create a recorder over the given store and resolver.
    pub fn new(store: Arc<dyn AccountStore>, resolver: EntitlementResolver) -> Self {
        Self { store, resolver }
    }

    /// Increment the account's usage counter and return the post-increment
    /// decision.
    ///
    /// Never fails the caller: schema-missing increments and store errors on
    /// this path degrade to [`EntitlementResolver::degraded_default`] with a
    /// warning log.
    pub async fn record_usage(&self, account_id: &str, now: DateTime<Utc>) -> EntitlementDecision {
        match self.store.increment_usage(account_id).await {
            Ok(UsageWrite::Applied) => {}
            Ok(UsageWrite::SchemaMissing) => {
                metrics::USAGE_ACCOUNTING_DEGRADED_TOTAL.inc();
                warn!(
                    account_id,
                    "usage counter column missing, reporting default decision"
                );
                return self.resolver.degraded_default();
            }
            Err(err) => {
                metrics::USAGE_ACCOUNTING_DEGRADED_TOTAL.inc();
                warn!(
                    account_id,
                    error = %err,
                    "usage increment failed, reporting default decision"
                );
                return self.resolver.degraded_default();
            }
        }

        match self.store.get(account_id).await {
            Ok(Some(snapshot)) => self.resolver.resolve(&snapshot, now),
            Ok(None) => {
                metrics::USAGE_ACCOUNTING_DEGRADED_TOTAL.inc();
                warn!(account_id, "account row vanished after usage increment");
                self.resolver.degraded_default()
            }
            Err(err) => {
                metrics::USAGE_ACCOUNTING_DEGRADED_TOTAL.inc();
                warn!(
                    account_id,
                    error = %err,
                    "post-increment fetch failed, reporting default decision"
                );
                self.resolver.degraded_default()
            }
        }
    }
}

/// First instant of the UTC month after `now`.
pub fn next_monthly_boundary(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    // The first of a month at midnight always exists.
    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap()
}

/// Spawn the usage-reset reconciliation job.
///
/// With `UsageResetPeriod::None` (the observed source behavior) no task is
/// spawned and counters accumulate for the account's lifetime. With
/// `Monthly`, counters are reset at each UTC month boundary through the
/// store, keeping the read path free of reset logic.
pub fn spawn_usage_reset(
    store: Arc<dyn AccountStore>,
    period: UsageResetPeriod,
) -> Option<tokio::task::JoinHandle<()>> {
    match period {
        UsageResetPeriod::None => None,
        UsageResetPeriod::Monthly => Some(tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let boundary = next_monthly_boundary(now);
                let wait = (boundary - now)
                    .to_std()
                    .unwrap_or(std::time::Duration::from_secs(60));
                tokio::time::sleep(wait).await;

                match store.reset_all_usage().await {
                    Ok(()) => tracing::info!("monthly usage counters reset"),
                    Err(err) => warn!(error = %err, "monthly usage reset failed, will retry next cycle"),
                }
            }
        })),
    }
}
