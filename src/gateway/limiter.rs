//! Fixed-Window Rate Limiter Store
//!
//! Named fixed-window counters keyed by caller identifier. Each named
//! limiter owns its own counter map with independent configuration; a
//! periodic sweep removes records whose window has already expired.
//!
//! The store is process-local. Running multiple gateway instances requires
//! replacing it with a shared atomic counter service (external key-value
//! store with increment-and-expire); that is a deployment redesign, not a
//! patch to this module.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::LimiterSettings;
use crate::error::GatewayError;

/// Counter state for one (limiter, identifier) pair within one window.
#[derive(Debug, Clone, Copy)]
struct WindowRecord {
    /// Requests observed in the current window
    count: u32,

    /// When the current window expires
    window_reset_at: DateTime<Utc>,
}

/// Outcome of a rate-limit check, carrying the response metadata surfaced
/// on every gated call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitOutcome {
    /// Whether the request was refused
    pub throttled: bool,

    /// Configured per-window limit
    pub limit: u32,

    /// Requests remaining in the current window
    pub remaining: u32,

    /// When the current window resets
    pub reset_at: DateTime<Utc>,

    /// Time until the window resets, present only when throttled
    pub retry_after_ms: Option<i64>,
}

impl RateLimitOutcome {
    /// Create an allowed outcome.
    pub fn allowed(limit: u32, remaining: u32, reset_at: DateTime<Utc>) -> Self {
        Self {
            throttled: false,
            limit,
            remaining,
            reset_at,
            retry_after_ms: None,
        }
    }

    /// Create a throttled outcome.
    pub fn throttled(limit: u32, reset_at: DateTime<Utc>, retry_after_ms: i64) -> Self {
        Self {
            throttled: true,
            limit,
            remaining: 0,
            reset_at,
            retry_after_ms: Some(retry_after_ms),
        }
    }

    /// Retry-after in whole seconds, rounded up.
    pub fn retry_after_secs(&self) -> Option<u64> {
        self.retry_after_ms
            .map(|ms| ((ms.max(0) as u64) + 999) / 1000)
    }

    /// Window reset time as epoch seconds.
    pub fn reset_at_epoch_secs(&self) -> i64 {
        self.reset_at.timestamp()
    }
}

/// One named fixed-window limiter.
///
/// All per-identifier state lives in a sharded concurrent map; the
/// lookup/reset/increment sequence for one identifier runs under that
/// identifier's entry guard, so concurrent requests for the same key cannot
/// lose updates while requests for different keys never contend on a
/// store-wide lock.
#[derive(Debug)]
pub struct RateLimiter {
    name: String,
    label: String,
    window: chrono::Duration,
    max_requests: u32,
    records: DashMap<String, WindowRecord>,
}

impl RateLimiter {
    /// Create a limiter from validated settings.
    pub fn new(settings: &LimiterSettings) -> Self {
        Self {
            name: settings.name.clone(),
            label: settings.label.clone(),
            window: chrono::Duration::milliseconds(settings.window_ms as i64),
            max_requests: settings.max_requests,
            records: DashMap::new(),
        }
    }

    /// Limiter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable label used in denial messages.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Check the identifier's window and consume one slot if permitted.
    pub fn check_and_consume(&self, identifier: &str) -> RateLimitOutcome {
        self.check_and_consume_at(identifier, Utc::now())
    }

    /// [`check_and_consume`](Self::check_and_consume) at an explicit time.
    pub fn check_and_consume_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitOutcome {
        let mut entry = self
            .records
            .entry(identifier.to_string())
            .or_insert(WindowRecord {
                count: 0,
                window_reset_at: now + self.window,
            });
        let record = entry.value_mut();

        // A record from a lapsed window is replaced, not carried over. The
        // sweep may also have deleted it moments ago; the entry API above
        // recreates it either way.
        if now > record.window_reset_at {
            *record = WindowRecord {
                count: 0,
                window_reset_at: now + self.window,
            };
        }

        if record.count >= self.max_requests {
            let retry_after_ms = (record.window_reset_at - now).num_milliseconds();
            return RateLimitOutcome::throttled(
                self.max_requests,
                record.window_reset_at,
                retry_after_ms,
            );
        }

        record.count += 1;
        RateLimitOutcome::allowed(
            self.max_requests,
            self.max_requests - record.count,
            record.window_reset_at,
        )
    }

    /// Report the identifier's current window without consuming a slot.
    ///
    /// Used for response metadata on requests denied before the rate-limit
    /// check runs.
    pub fn peek(&self, identifier: &str) -> RateLimitOutcome {
        self.peek_at(identifier, Utc::now())
    }

    /// [`peek`](Self::peek) at an explicit time.
    pub fn peek_at(&self, identifier: &str, now: DateTime<Utc>) -> RateLimitOutcome {
        match self.records.get(identifier) {
            Some(record) if now <= record.window_reset_at => RateLimitOutcome::allowed(
                self.max_requests,
                self.max_requests.saturating_sub(record.count),
                record.window_reset_at,
            ),
            // No live window: a request now would open a fresh one.
            _ => RateLimitOutcome::allowed(self.max_requests, self.max_requests, now + self.window),
        }
    }

    /// Remove records whose window expired before `now`. Returns the number
    /// of records removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.records.len();
        self.records.retain(|_, record| now <= record.window_reset_at);
        before - self.records.len()
    }

    /// Number of live records (for tests and diagnostics).
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Registry of named limiters, built from configuration at process start
/// and passed to every gate explicitly. There is no module-level singleton.
#[derive(Debug)]
pub struct RateLimiterStore {
    limiters: HashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterStore {
    /// Build the store from per-limiter settings.
    pub fn new(settings: &[LimiterSettings]) -> Result<Self, GatewayError> {
        let mut limiters = HashMap::new();
        for limiter_settings in settings {
            let limiter = Arc::new(RateLimiter::new(limiter_settings));
            if limiters
                .insert(limiter_settings.name.clone(), limiter)
                .is_some()
            {
                return Err(GatewayError::Configuration(format!(
                    "duplicate limiter name '{}'",
                    limiter_settings.name
                )));
            }
        }
        Ok(Self { limiters })
    }

    /// Look up a named limiter.
    pub fn limiter(&self, name: &str) -> Option<Arc<RateLimiter>> {
        self.limiters.get(name).cloned()
    }

    /// Check and consume against a named limiter.
    pub fn check_and_consume(
        &self,
        name: &str,
        identifier: &str,
    ) -> Result<RateLimitOutcome, GatewayError> {
        let limiter = self
            .limiter(name)
            .ok_or_else(|| GatewayError::Configuration(format!("unknown limiter '{name}'")))?;
        Ok(limiter.check_and_consume(identifier))
    }

    /// Sweep every named limiter. Returns the total number of records
    /// removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        self.limiters
            .values()
            .map(|limiter| limiter.sweep_at(now))
            .sum()
    }

    /// Spawn the periodic sweep task.
    ///
    /// The sweep only removes records it observes as already expired, so it
    /// is safe alongside concurrent `check_and_consume` calls: the worst
    /// case is a delete racing a recreation, which simply allocates a fresh
    /// window record.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let removed = store.sweep_at(Utc::now());
                if removed > 0 {
                    debug!(removed, "swept expired rate limit records");
                }
            }
        })
    }
}
