//! Entitlement Resolution
//!
//! Derives the effective plan and usage-quota decision from a durable
//! account snapshot and the current wall-clock time. Resolution is a pure
//! function: a lapsed trial keeps `plan = trial` in storage forever and only
//! the derived read reports `expired`. Nothing here writes back to the
//! account store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription plan tiers.
///
/// The same enum serves as the stored value and the derived effective value;
/// `expired` is stored only by explicit administrative action but is a
/// common derived result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Plan {
    /// Paid tier, never time-derived and never usage-capped at admission
    Pro,
    /// Time-limited evaluation tier
    Trial,
    /// Lapsed tier, no access
    Expired,
    /// Default tier, no access
    Free,
}

impl Plan {
    /// Parse a stored plan value. Returns `None` for absent or unrecognized
    /// values, which resolve as `free`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pro" => Some(Plan::Pro),
            "trial" => Some(Plan::Trial),
            "expired" => Some(Plan::Expired),
            "free" => Some(Plan::Free),
            _ => None,
        }
    }

    /// Canonical stored representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Plan::Pro => "pro",
            Plan::Trial => "trial",
            Plan::Expired => "expired",
            Plan::Free => "free",
        }
    }
}

impl std::fmt::Display for Plan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-side projection of a durable account row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Caller identifier the row is keyed by
    pub account_id: String,

    /// Stored plan; `None` when absent or unrecognized
    pub plan: Option<Plan>,

    /// Trial expiry; non-null iff the account was ever placed in trial
    pub trial_end_at: Option<DateTime<Utc>>,

    /// Cumulative usage counter for the accounting period
    pub usage_count: u64,
}

/// Per-request entitlement decision, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntitlementDecision {
    /// Plan derived from stored plan + trial expiry + now
    pub effective_plan: Plan,

    /// Usage ceiling for the effective plan
    pub usage_limit: u64,

    /// `max(0, usage_limit - usage_count)`; reported even when access is
    /// denied, so a positive value does not imply access
    pub usage_remaining: u64,

    /// Whether another generation request may proceed
    pub can_continue: bool,
}

/// Usage ceilings per tier. Configuration, not business logic: the resolver
/// only needs the numbers and which plan maps to which.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCeilings {
    /// Ceiling for the `pro` tier
    pub pro: u64,

    /// Ceiling for every other effective tier
    pub standard: u64,
}

impl Default for TierCeilings {
    fn default() -> Self {
        Self {
            pro: 1000,
            standard: 10,
        }
    }
}

impl TierCeilings {
    /// Usage ceiling for an effective plan.
    pub fn limit_for(&self, plan: Plan) -> u64 {
        match plan {
            Plan::Pro => self.pro,
            _ => self.standard,
        }
    }
}

/// Derives [`EntitlementDecision`]s from account snapshots.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntitlementResolver {
    ceilings: TierCeilings,
}

impl EntitlementResolver {
    /// Create a resolver with the given tier ceilings.
    pub fn new(ceilings: TierCeilings) -> Self {
        Self { ceilings }
    }

    /// Resolve the effective plan and quota decision at `now`.
    ///
    /// Derivation rules, first match wins:
    /// 1. stored `pro` is always effective `pro`
    /// 2. stored `trial` with `now <= trial_end_at` is an active `trial`
    /// 3. stored `trial` otherwise (expiry null or past) is `expired`
    /// 4. anything else resolves as stored, defaulting to `free`
    pub fn resolve(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> EntitlementDecision {
        let effective_plan = match snapshot.plan {
            Some(Plan::Pro) => Plan::Pro,
            Some(Plan::Trial) => match snapshot.trial_end_at {
                Some(end) if now <= end => Plan::Trial,
                _ => Plan::Expired,
            },
            Some(stored) => stored,
            None => Plan::Free,
        };

        let usage_limit = self.ceilings.limit_for(effective_plan);
        let usage_remaining = usage_limit.saturating_sub(snapshot.usage_count);

        // Pro is never usage-capped at admission; trial is capped; expired
        // and free never continue even with remaining quota.
        let can_continue = match effective_plan {
            Plan::Pro => true,
            Plan::Trial => snapshot.usage_count < usage_limit,
            Plan::Expired | Plan::Free => false,
        };

        EntitlementDecision {
            effective_plan,
            usage_limit,
            usage_remaining,
            can_continue,
        }
    }

    /// Decision reported when usage accounting degrades (see
    /// [`UsageRecorder`](crate::gateway::usage::UsageRecorder)): an active
    /// trial with the full ceiling remaining.
    pub fn degraded_default(&self) -> EntitlementDecision {
        EntitlementDecision {
            effective_plan: Plan::Trial,
            usage_limit: self.ceilings.standard,
            usage_remaining: self.ceilings.standard,
            can_continue: true,
        }
    }

    /// Decision applied when no verified caller identity is present: an
    /// expired-equivalent denial.
    pub fn unauthenticated(&self) -> EntitlementDecision {
        EntitlementDecision {
            effective_plan: Plan::Expired,
            usage_limit: self.ceilings.standard,
            usage_remaining: 0,
            can_continue: false,
        }
    }

    /// Configured ceilings.
    pub fn ceilings(&self) -> TierCeilings {
        self.ceilings
    }
}
