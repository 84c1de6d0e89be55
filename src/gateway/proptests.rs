//! Property-Based Tests for the Gateway
//!
//! This module contains property-based tests using proptest to verify
//! invariants hold for random inputs across entitlement resolution and the
//! fixed-window limiter.
//!
//! # Test Strategies
//!
//! - **Entitlement Resolution**: totality, determinism, and the access
//!   asymmetry (remaining quota never implies access)
//! - **Window Accounting**: allowed counts never exceed the configured
//!   per-window limit
//!
//! # Running the Tests
//!
//! ```bash
//! cargo test --lib gateway::proptests
//! ```

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use crate::config::LimiterSettings;
use crate::gateway::entitlement::{
    AccountSnapshot, EntitlementResolver, Plan, TierCeilings,
};
use crate::gateway::limiter::RateLimiter;

// Helper: Generate arbitrary stored plan values, including unrecognized ones
fn arb_stored_plan() -> impl Strategy<Value = Option<Plan>> {
    prop_oneof![
        Just(None),
        Just(Some(Plan::Pro)),
        Just(Some(Plan::Trial)),
        Just(Some(Plan::Expired)),
        Just(Some(Plan::Free)),
    ]
}

// Helper: Generate snapshots with trial expiries scattered around `now`
fn arb_snapshot() -> impl Strategy<Value = AccountSnapshot> {
    (
        arb_stored_plan(),
        prop::option::of(-86_400i64 * 30..86_400 * 30),
        0u64..5_000,
    )
        .prop_map(|(plan, trial_offset_secs, usage_count)| AccountSnapshot {
            account_id: "acct-prop".to_string(),
            plan,
            trial_end_at: trial_offset_secs
                .map(|secs| base_now() + Duration::seconds(secs)),
            usage_count,
        })
}

fn base_now() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
}

proptest! {
    /// Resolution is deterministic: the same snapshot and time always yield
    /// the same decision
    #[test]
    fn prop_resolution_deterministic(snapshot in arb_snapshot()) {
        let resolver = EntitlementResolver::default();
        let now = base_now();
        prop_assert_eq!(resolver.resolve(&snapshot, now), resolver.resolve(&snapshot, now));
    }

    /// `usage_remaining` equals `max(0, limit - count)` for every input
    #[test]
    fn prop_remaining_arithmetic(snapshot in arb_snapshot()) {
        let resolver = EntitlementResolver::default();
        let decision = resolver.resolve(&snapshot, base_now());
        prop_assert_eq!(
            decision.usage_remaining,
            decision.usage_limit.saturating_sub(snapshot.usage_count)
        );
    }

    /// Access requires pro, or an active trial under its ceiling; remaining
    /// quota on any other tier never grants access
    #[test]
    fn prop_can_continue_implies_pro_or_active_trial(snapshot in arb_snapshot()) {
        let resolver = EntitlementResolver::default();
        let decision = resolver.resolve(&snapshot, base_now());

        if decision.can_continue {
            match decision.effective_plan {
                Plan::Pro => {}
                Plan::Trial => prop_assert!(snapshot.usage_count < decision.usage_limit),
                other => prop_assert!(false, "access granted on tier {:?}", other),
            }
        }
    }

    /// A stored pro plan is never reinterpreted by time
    #[test]
    fn prop_pro_immune_to_time(
        trial_offset_secs in prop::option::of(-86_400i64 * 30..86_400 * 30),
        usage_count in 0u64..1_000_000,
    ) {
        let resolver = EntitlementResolver::default();
        let snapshot = AccountSnapshot {
            account_id: "acct-prop".to_string(),
            plan: Some(Plan::Pro),
            trial_end_at: trial_offset_secs.map(|secs| base_now() + Duration::seconds(secs)),
            usage_count,
        };
        let decision = resolver.resolve(&snapshot, base_now());
        prop_assert_eq!(decision.effective_plan, Plan::Pro);
        prop_assert!(decision.can_continue);
    }

    /// Ceilings are applied per tier: pro gets the pro ceiling, every other
    /// effective tier gets the standard ceiling
    #[test]
    fn prop_ceilings_follow_tier(
        snapshot in arb_snapshot(),
        pro in 1u64..100_000,
        standard in 1u64..1_000,
    ) {
        let resolver = EntitlementResolver::new(TierCeilings { pro, standard });
        let decision = resolver.resolve(&snapshot, base_now());
        let expected = if decision.effective_plan == Plan::Pro { pro } else { standard };
        prop_assert_eq!(decision.usage_limit, expected);
    }

    /// A window never admits more than its configured limit, for any
    /// request pattern inside one window
    #[test]
    fn prop_window_never_over_admits(
        max_requests in 1u32..50,
        attempts in 1usize..200,
    ) {
        let limiter = RateLimiter::new(&LimiterSettings {
            name: "prop".to_string(),
            label: "prop".to_string(),
            window_ms: 60_000,
            max_requests,
        });
        let now = base_now();

        let allowed = (0..attempts)
            .filter(|_| !limiter.check_and_consume_at("caller", now).throttled)
            .count();
        prop_assert_eq!(allowed, (attempts).min(max_requests as usize));
    }
}
