//! Quota & Entitlement Gateway
//!
//! Decides, for every inbound generation request, what subscription tier the
//! caller effectively has right now and whether the caller may proceed given
//! both a time-windowed rate limit and a tier-based usage quota.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Request Gate                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────────┐   ┌──────────────────┐                │
//! │  │ Entitlement      │   │ Rate Limiter     │                │
//! │  │ Resolver         │   │ Store            │                │
//! │  │ (snapshot + now) │   │ (fixed windows)  │                │
//! │  └──────────────────┘   └──────────────────┘                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │      Usage Recorder (durable counter, fail-open)    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Entitlement is checked before the rate limit so an expired or
//! quota-exhausted caller receives an upgrade denial rather than a throttle
//! message. Usage is recorded on attempt, after the generation call
//! completes, regardless of its outcome.

pub mod entitlement;
pub mod gate;
pub mod limiter;
pub mod usage;

#[cfg(test)]
mod proptests;

pub use entitlement::{
    AccountSnapshot, EntitlementDecision, EntitlementResolver, Plan, TierCeilings,
};
pub use gate::{AdmitResult, DenyReason, RequestGate};
pub use limiter::{RateLimitOutcome, RateLimiter, RateLimiterStore};
pub use usage::UsageRecorder;
