//! Request Gate
//!
//! Per-request admission: resolve the caller's entitlement, then consult the
//! rate limiter, in that order. An expired or quota-exhausted caller gets a
//! clear upgrade denial rather than a generic throttle message, so the
//! entitlement check always runs first.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account::{AccountStore, NewAccount};
use crate::error::GatewayError;
use crate::gateway::entitlement::{
    AccountSnapshot, EntitlementDecision, EntitlementResolver,
};
use crate::gateway::limiter::{RateLimitOutcome, RateLimiter, RateLimiterStore};
use crate::gateway::usage::UsageRecorder;
use crate::metrics;

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Effective plan does not permit another request
    QuotaExceeded,
    /// Window counter exhausted
    RateLimited,
}

/// Result of an admission check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmitResult {
    /// Whether the request may proceed to the generation collaborator
    pub allow: bool,

    /// Denial reason, absent when allowed
    pub reason: Option<DenyReason>,

    /// Time until the window resets, present only on rate-limit denials
    pub retry_after_ms: Option<i64>,

    /// Entitlement decision backing the admission
    pub decision: EntitlementDecision,

    /// Window metadata for response headers
    pub rate_limit: RateLimitOutcome,
}

impl AdmitResult {
    /// Create an allowed result.
    pub fn allowed(decision: EntitlementDecision, rate_limit: RateLimitOutcome) -> Self {
        Self {
            allow: true,
            reason: None,
            retry_after_ms: None,
            decision,
            rate_limit,
        }
    }

    /// Create a quota denial.
    pub fn quota_exceeded(decision: EntitlementDecision, rate_limit: RateLimitOutcome) -> Self {
        Self {
            allow: false,
            reason: Some(DenyReason::QuotaExceeded),
            retry_after_ms: None,
            decision,
            rate_limit,
        }
    }

    /// Create a rate-limit denial.
    pub fn rate_limited(decision: EntitlementDecision, rate_limit: RateLimitOutcome) -> Self {
        Self {
            allow: false,
            reason: Some(DenyReason::RateLimited),
            retry_after_ms: rate_limit.retry_after_ms,
            decision,
            rate_limit,
        }
    }
}

/// Composes entitlement resolution, rate limiting, and usage recording into
/// the per-request decision used by generation endpoints.
#[derive(Clone)]
pub struct RequestGate {
    resolver: EntitlementResolver,
    limiter: Arc<RateLimiter>,
    accounts: Arc<dyn AccountStore>,
    recorder: UsageRecorder,
    trial_period: chrono::Duration,
}

impl RequestGate {
    /// Build a gate bound to one named limiter.
    ///
    /// Fails fast when the limiter name is not configured; the store is
    /// immutable after startup, so the binding cannot go stale.
    pub fn new(
        resolver: EntitlementResolver,
        limiters: &RateLimiterStore,
        limiter_name: &str,
        accounts: Arc<dyn AccountStore>,
        trial_period: chrono::Duration,
    ) -> Result<Self, GatewayError> {
        let limiter = limiters.limiter(limiter_name).ok_or_else(|| {
            GatewayError::Configuration(format!("unknown limiter '{limiter_name}'"))
        })?;
        let recorder = UsageRecorder::new(Arc::clone(&accounts), resolver);
        Ok(Self {
            resolver,
            limiter,
            accounts,
            recorder,
            trial_period,
        })
    }

    /// Entitlement resolver used by this gate.
    pub fn resolver(&self) -> &EntitlementResolver {
        &self.resolver
    }

    /// Fetch the caller's account snapshot, provisioning a fresh trial row
    /// for a first-time caller.
    ///
    /// Provisioning is idempotent under concurrent duplicate calls: the
    /// store's create-if-absent returns the winner's row, never a second
    /// trial grant. Store failures fail closed for the caller.
    pub async fn load_or_provision(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccountSnapshot, GatewayError> {
        if let Some(snapshot) = self.accounts.get(account_id).await? {
            return Ok(snapshot);
        }

        let snapshot = self
            .accounts
            .create_if_absent(account_id, NewAccount::trial(now, self.trial_period))
            .await?;
        metrics::ACCOUNTS_PROVISIONED_TOTAL.inc();
        info!(account_id, "provisioned trial account");
        Ok(snapshot)
    }

    /// Decide whether the identified caller may proceed.
    ///
    /// Entitlement first, rate limit second; a window slot is consumed only
    /// when the entitlement check passes.
    pub fn admit(
        &self,
        identifier: &str,
        snapshot: &AccountSnapshot,
        now: DateTime<Utc>,
    ) -> AdmitResult {
        let decision = self.resolver.resolve(snapshot, now);

        if !decision.can_continue {
            metrics::ADMISSIONS_TOTAL
                .with_label_values(&["quota_exceeded"])
                .inc();
            debug!(
                identifier,
                effective_plan = %decision.effective_plan,
                usage_remaining = decision.usage_remaining,
                "denied: quota exceeded"
            );
            // No slot is consumed on a quota denial; peek supplies the
            // window metadata for the response.
            return AdmitResult::quota_exceeded(decision, self.limiter.peek_at(identifier, now));
        }

        let outcome = self.limiter.check_and_consume_at(identifier, now);
        if outcome.throttled {
            metrics::ADMISSIONS_TOTAL
                .with_label_values(&["rate_limited"])
                .inc();
            debug!(
                identifier,
                limiter = self.limiter.name(),
                retry_after_ms = ?outcome.retry_after_ms,
                "denied: rate limited"
            );
            return AdmitResult::rate_limited(decision, outcome);
        }

        metrics::ADMISSIONS_TOTAL.with_label_values(&["allowed"]).inc();
        AdmitResult::allowed(decision, outcome)
    }

    /// Record a generation attempt and return the post-increment decision.
    ///
    /// Usage is recorded on attempt; the generation call's success or
    /// failure is irrelevant to accounting. Concurrent attempts from the
    /// same caller may both read the pre-increment counter and both pass
    /// admission before either increment lands. Quota enforcement is
    /// advisory; the limiter provides the hard per-window bound.
    pub async fn record_attempt(
        &self,
        account_id: &str,
        now: DateTime<Utc>,
    ) -> EntitlementDecision {
        self.recorder.record_usage(account_id, now).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::InMemoryAccountStore;
    use crate::config::LimiterSettings;
    use crate::gateway::entitlement::Plan;

    fn limiter_store(max_requests: u32) -> RateLimiterStore {
        RateLimiterStore::new(&[LimiterSettings {
            name: "generation".to_string(),
            label: "listing generation".to_string(),
            window_ms: 60_000,
            max_requests,
        }])
        .unwrap()
    }

    fn gate(store: InMemoryAccountStore, max_requests: u32) -> RequestGate {
        RequestGate::new(
            EntitlementResolver::default(),
            &limiter_store(max_requests),
            "generation",
            Arc::new(store),
            chrono::Duration::days(14),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_unknown_limiter_name_fails_construction() {
        let result = RequestGate::new(
            EntitlementResolver::default(),
            &limiter_store(10),
            "missing",
            Arc::new(InMemoryAccountStore::new()),
            chrono::Duration::days(14),
        );
        assert!(matches!(result, Err(GatewayError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_first_call_provisions_trial() {
        let store = InMemoryAccountStore::new();
        let gate = gate(store.clone(), 10);
        let now = Utc::now();

        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        assert_eq!(snapshot.plan, Some(Plan::Trial));
        assert_eq!(snapshot.trial_end_at, Some(now + chrono::Duration::days(14)));

        // Second call sees the stored row.
        let later = now + chrono::Duration::days(3);
        let again = gate.load_or_provision("acct-1", later).await.unwrap();
        assert_eq!(again.trial_end_at, snapshot.trial_end_at);
        assert_eq!(store.count().await, 1);
    }

    #[tokio::test]
    async fn test_admit_allows_active_trial() {
        let store = InMemoryAccountStore::new();
        let gate = gate(store, 10);
        let now = Utc::now();

        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        let result = gate.admit("acct-1", &snapshot, now);

        assert!(result.allow);
        assert!(result.reason.is_none());
        assert_eq!(result.rate_limit.remaining, 9);
    }

    #[tokio::test]
    async fn test_admit_denies_expired_trial_before_rate_limit() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        store
            .seed_raw("acct-1", "trial", Some(now - chrono::Duration::seconds(1)), 0)
            .await;
        let gate = gate(store, 10);

        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        let result = gate.admit("acct-1", &snapshot, now);

        assert!(!result.allow);
        assert_eq!(result.reason, Some(DenyReason::QuotaExceeded));
        assert_eq!(result.decision.effective_plan, Plan::Expired);
        // Quota denials never consume a window slot.
        assert_eq!(result.rate_limit.remaining, 10);
    }

    #[tokio::test]
    async fn test_admit_rate_limits_after_window_exhausted() {
        let store = InMemoryAccountStore::new();
        let gate = gate(store, 2);
        let now = Utc::now();

        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        assert!(gate.admit("acct-1", &snapshot, now).allow);
        assert!(gate.admit("acct-1", &snapshot, now).allow);

        let result = gate.admit("acct-1", &snapshot, now);
        assert!(!result.allow);
        assert_eq!(result.reason, Some(DenyReason::RateLimited));
        assert!(result.retry_after_ms.is_some());
    }

    #[tokio::test]
    async fn test_quota_denial_wins_over_throttle() {
        // A caller who is both quota-exhausted and at the window limit gets
        // the upgrade message, not the throttle message.
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        store
            .seed_raw("acct-1", "trial", Some(now + chrono::Duration::days(1)), 9)
            .await;
        let gate = gate(store.clone(), 1);

        // One slot left in both quota and window: this consumes the window.
        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        assert!(gate.admit("acct-1", &snapshot, now).allow);

        // Now at the quota ceiling AND the window limit.
        store
            .seed_raw("acct-1", "trial", Some(now + chrono::Duration::days(1)), 10)
            .await;
        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        let result = gate.admit("acct-1", &snapshot, now);
        assert_eq!(result.reason, Some(DenyReason::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_pro_account_skips_quota_but_not_rate_limit() {
        let store = InMemoryAccountStore::new();
        let now = Utc::now();
        store.seed_raw("acct-1", "pro", None, 5000).await;
        let gate = gate(store, 1);

        let snapshot = gate.load_or_provision("acct-1", now).await.unwrap();
        assert!(gate.admit("acct-1", &snapshot, now).allow);

        let result = gate.admit("acct-1", &snapshot, now);
        assert!(!result.allow);
        assert_eq!(result.reason, Some(DenyReason::RateLimited));
    }

    #[tokio::test]
    async fn test_record_attempt_reflects_increment() {
        let store = InMemoryAccountStore::new();
        let gate = gate(store, 10);
        let now = Utc::now();

        gate.load_or_provision("acct-1", now).await.unwrap();
        let decision = gate.record_attempt("acct-1", now).await;
        assert_eq!(decision.usage_remaining, 9);
    }
}
