// Prometheus metrics for gateway monitoring
//
// Exposes metrics on /metrics HTTP endpoint:
// - Admission outcomes (counter, by outcome)
// - Generation latencies (histogram)
// - Degraded usage accounting events (counter)
// - Provisioned trial accounts (counter)

use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Histogram, IntCounter, Registry, TextEncoder};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Admission metrics
    pub static ref ADMISSIONS_TOTAL: CounterVec = CounterVec::new(
        prometheus::Opts::new("admissions_total", "Admission decisions by outcome"),
        &["outcome"]
    ).expect("Failed to create admissions metric");

    pub static ref ACCOUNTS_PROVISIONED_TOTAL: IntCounter = IntCounter::new(
        "accounts_provisioned_total",
        "Trial accounts provisioned on first contact"
    ).expect("Failed to create provisioned accounts metric");

    // Usage accounting metrics
    pub static ref USAGE_ACCOUNTING_DEGRADED_TOTAL: IntCounter = IntCounter::new(
        "usage_accounting_degraded_total",
        "Usage increments degraded to a default decision"
    ).expect("Failed to create degraded accounting metric");

    // Generation metrics
    pub static ref GENERATION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "generation_duration_seconds",
            "Duration of upstream generation calls"
        ),
    ).expect("Failed to create generation duration metric");

    pub static ref GENERATION_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "generation_failures_total",
        "Generation calls that returned an error after admission"
    ).expect("Failed to create generation failures metric");
}

/// Initialize metrics registry - must be called once at process startup
pub fn init() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(ADMISSIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(ACCOUNTS_PROVISIONED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(USAGE_ACCOUNTING_DEGRADED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GENERATION_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(GENERATION_FAILURES_TOTAL.clone()))?;
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
