//! Caller-Facing HTTP Surface
//!
//! Thin handlers over the request gate: extract identity, run admission,
//! forward to the generation collaborator, record the attempt, and shape
//! the three admission outcomes (allow, quota denial, throttle) plus the
//! fail-closed store error into HTTP responses. Window metadata rides on
//! `X-RateLimit-*` headers for every gated response.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::account::AccountStore;
use crate::error::GatewayError;
use crate::gateway::gate::{AdmitResult, DenyReason, RequestGate};
use crate::gateway::limiter::RateLimitOutcome;
use crate::gateway::entitlement::Plan;
use crate::generate::{GenerationRequest, ListingGenerator};
use crate::identity::IdentityProvider;
use crate::metrics;

/// Shared state handed to every handler, constructed once at startup.
#[derive(Clone)]
pub struct AppState {
    pub gate: RequestGate,
    pub identity: Arc<dyn IdentityProvider>,
    pub generator: Arc<dyn ListingGenerator>,
    pub accounts: Arc<dyn AccountStore>,
    pub admin_token: Option<String>,
}

/// Build the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/listings/generate", post(generate_listing))
        .route("/v1/account/entitlement", get(account_entitlement))
        .route("/v1/admin/accounts/{id}/plan", put(set_account_plan))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Extract the bearer credential from request headers.
///
/// Accepts `Authorization: Bearer <key>` or the `X-Api-Key` header.
fn bearer_credential(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers.get(header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                let token = token.trim();
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }
    headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
}

/// Attach `X-RateLimit-*` metadata to a response.
fn with_rate_limit_headers(mut response: Response, outcome: &RateLimitOutcome) -> Response {
    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(&outcome.limit.to_string()) {
        headers.insert("x-ratelimit-limit", value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.remaining.to_string()) {
        headers.insert("x-ratelimit-remaining", value);
    }
    if let Ok(value) = HeaderValue::from_str(&outcome.reset_at_epoch_secs().to_string()) {
        headers.insert("x-ratelimit-reset", value);
    }
    response
}

/// Render an admission denial.
fn deny_response(result: &AdmitResult) -> Response {
    let response = match result.reason {
        Some(DenyReason::RateLimited) => {
            let retry_after_secs = result.rate_limit.retry_after_secs().unwrap_or(1);
            let mut response = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "error": "rate_limited",
                    "message": format!(
                        "Too many requests. Retry in {retry_after_secs} seconds."
                    ),
                    "retry_after_secs": retry_after_secs,
                })),
            )
                .into_response();
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        _ => (
            StatusCode::PAYMENT_REQUIRED,
            Json(json!({
                "error": "quota_exceeded",
                "message": "Your plan does not allow more generations. Upgrade to continue.",
                "effective_plan": result.decision.effective_plan,
                "usage_remaining": result.decision.usage_remaining,
            })),
        )
            .into_response(),
    };
    with_rate_limit_headers(response, &result.rate_limit)
}

/// Render a gateway error on the entitlement path.
fn gateway_error_response(err: &GatewayError) -> Response {
    match err {
        GatewayError::AccountStoreUnavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "account_store_unavailable",
                "message": "Service temporarily unavailable. Try again shortly.",
            })),
        )
            .into_response(),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal_error" })),
        )
            .into_response(),
    }
}

/// The gated generation endpoint.
async fn generate_listing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<GenerationRequest>,
) -> Response {
    let request_id = Uuid::new_v4();
    let now = Utc::now();

    // Absent identity is an immediate expired-equivalent denial.
    let account_id = match resolve_identity(&state, &headers).await {
        Some(account_id) => account_id,
        None => {
            debug!(%request_id, "generation request without verified identity");
            metrics::ADMISSIONS_TOTAL
                .with_label_values(&["quota_exceeded"])
                .inc();
            let decision = state.gate.resolver().unauthenticated();
            return (
                StatusCode::PAYMENT_REQUIRED,
                Json(json!({
                    "error": "quota_exceeded",
                    "message": "Your plan does not allow more generations. Upgrade to continue.",
                    "effective_plan": decision.effective_plan,
                    "usage_remaining": decision.usage_remaining,
                })),
            )
                .into_response();
        }
    };

    // Fail closed when the account snapshot cannot be read.
    let snapshot = match state.gate.load_or_provision(&account_id, now).await {
        Ok(snapshot) => snapshot,
        Err(err) => {
            metrics::ADMISSIONS_TOTAL
                .with_label_values(&["store_unavailable"])
                .inc();
            error!(%request_id, account_id, error = %err, "entitlement lookup failed");
            return gateway_error_response(&err);
        }
    };

    let result = state.gate.admit(&account_id, &snapshot, now);
    if !result.allow {
        return deny_response(&result);
    }

    // Forward to the generation collaborator. Its outcome does not affect
    // accounting: usage is recorded on attempt.
    let started = Instant::now();
    let generated = state.generator.generate(&request).await;
    metrics::GENERATION_DURATION_SECONDS.observe(started.elapsed().as_secs_f64());

    let decision = state.gate.record_attempt(&account_id, Utc::now()).await;

    let response = match generated {
        Ok(output) => (
            StatusCode::OK,
            Json(json!({
                "listing": output.listing,
                "model": output.model,
                "entitlement": decision,
            })),
        )
            .into_response(),
        Err(err) => {
            metrics::GENERATION_FAILURES_TOTAL.inc();
            warn!(%request_id, account_id, error = %err, "generation call failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "error": "generation_failed",
                    "message": "The generation backend could not complete the request.",
                    "entitlement": decision,
                })),
            )
                .into_response()
        }
    };
    with_rate_limit_headers(response, &result.rate_limit)
}

/// Entitlement status for the caller's UI.
async fn account_entitlement(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let account_id = match resolve_identity(&state, &headers).await {
        Some(account_id) => account_id,
        None => {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "unauthenticated" })),
            )
                .into_response();
        }
    };

    let now = Utc::now();
    match state.accounts.get(&account_id).await {
        Ok(Some(snapshot)) => {
            let decision = state.gate.resolver().resolve(&snapshot, now);
            (StatusCode::OK, Json(json!({ "entitlement": decision }))).into_response()
        }
        // No row yet: report what a fresh read would resolve, without
        // provisioning on a read path.
        Ok(None) => {
            let snapshot = crate::gateway::entitlement::AccountSnapshot {
                account_id,
                plan: None,
                trial_end_at: None,
                usage_count: 0,
            };
            let decision = state.gate.resolver().resolve(&snapshot, now);
            (StatusCode::OK, Json(json!({ "entitlement": decision }))).into_response()
        }
        Err(err) => gateway_error_response(&GatewayError::from(err)),
    }
}

/// Administrative plan mutation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPlanRequest {
    /// Plan to store
    pub plan: Plan,

    /// Trial expiry to store alongside a trial plan
    #[serde(default)]
    pub trial_end_at: Option<DateTime<Utc>>,
}

/// Administrative plan mutation, never invoked by the gateway itself.
async fn set_account_plan(
    State(state): State<AppState>,
    Path(account_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<SetPlanRequest>,
) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "admin_api_disabled" })),
        )
            .into_response();
    };

    let presented = headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok());
    if presented != Some(expected) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden" })),
        )
            .into_response();
    }

    match state
        .accounts
        .set_plan(&account_id, request.plan, request.trial_end_at)
        .await
    {
        Ok(snapshot) => {
            tracing::info!(account_id, plan = %request.plan, "admin plan update");
            (StatusCode::OK, Json(json!({ "account": snapshot }))).into_response()
        }
        Err(err) => gateway_error_response(&GatewayError::from(err)),
    }
}

/// Liveness endpoint.
async fn health() -> impl IntoResponse {
    StatusCode::OK
}

async fn resolve_identity(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let credential = bearer_credential(headers)?;
    state.identity.verify(&credential).await
}
