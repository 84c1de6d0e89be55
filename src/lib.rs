//! Listra Gateway Library
//!
//! This library provides the Quota & Entitlement Gateway for the Listra
//! listing-generation service: fixed-window rate limiting, time-derived
//! entitlement resolution, advisory usage accounting, and the per-request
//! admission decision composed from them.

pub mod account;
pub mod config;
pub mod error;
pub mod gateway;
pub mod generate;
pub mod http;
pub mod identity;
pub mod metrics;
pub mod metrics_server;

pub use error::{AccountStoreError, GatewayError};
pub use gateway::{
    AccountSnapshot, AdmitResult, DenyReason, EntitlementDecision, EntitlementResolver, Plan,
    RateLimitOutcome, RateLimiterStore, RequestGate,
};
