// Prometheus metrics for the generative-AI gate
//
// Exposes metrics on the /metrics HTTP endpoint:
// - Dispatched requests by model and outcome (counter)
// - Rejected requests by reason (counter)
// - Gate waits by reason (counter) and queue wait time (histogram)
// - Queue length and requests today (gauges)
// - Ledger persist failures (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, IntCounter, IntCounterVec, IntGauge, Registry, TextEncoder,
};
use std::sync::{Arc, Once};

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    pub static ref REQUESTS_DISPATCHED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("genai_requests_dispatched_total", "Requests released by the gate"),
        &["model", "outcome"]
    ).expect("Failed to create dispatched requests metric");

    pub static ref REQUESTS_REJECTED_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("genai_requests_rejected_total", "Requests rejected without dispatch"),
        &["reason"]
    ).expect("Failed to create rejected requests metric");

    pub static ref GATE_WAITS_TOTAL: IntCounterVec = IntCounterVec::new(
        prometheus::Opts::new("genai_gate_waits_total", "Times the drain loop slept on a closed gate"),
        &["reason"]
    ).expect("Failed to create gate waits metric");

    pub static ref QUEUE_WAIT_SECONDS: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new("genai_queue_wait_seconds", "Time from submit to dispatch")
            .buckets(vec![0.01, 0.1, 1.0, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
    ).expect("Failed to create queue wait metric");

    pub static ref QUEUE_LENGTH: IntGauge = IntGauge::new(
        "genai_queue_length",
        "Requests waiting for admission"
    ).expect("Failed to create queue length metric");

    pub static ref REQUESTS_TODAY: IntGauge = IntGauge::new(
        "genai_requests_today",
        "Requests dispatched since UTC midnight"
    ).expect("Failed to create requests today metric");

    pub static ref PERSIST_FAILURES_TOTAL: IntCounter = IntCounter::new(
        "genai_ledger_persist_failures_total",
        "Ledger writes that failed after all retries"
    ).expect("Failed to create persist failures metric");
}

static INIT: Once = Once::new();

/// Register all metrics with the registry
///
/// Safe to call more than once; only the first call registers.
pub fn init() -> prometheus::Result<()> {
    let mut result = Ok(());
    INIT.call_once(|| {
        result = register_all();
    });
    result
}

fn register_all() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(REQUESTS_DISPATCHED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REQUESTS_REJECTED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(GATE_WAITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(QUEUE_WAIT_SECONDS.clone()))?;
    REGISTRY.register(Box::new(QUEUE_LENGTH.clone()))?;
    REGISTRY.register(Box::new(REQUESTS_TODAY.clone()))?;
    REGISTRY.register(Box::new(PERSIST_FAILURES_TOTAL.clone()))?;
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        assert!(init().is_ok());
        assert!(init().is_ok());
    }

    #[test]
    fn test_gather_includes_gate_metrics() {
        init().unwrap();
        REQUESTS_REJECTED_TOTAL
            .with_label_values(&["daily_limit"])
            .inc();
        QUEUE_LENGTH.set(2);

        let text = gather_metrics().unwrap();
        assert!(text.contains("genai_requests_rejected_total"));
        assert!(text.contains("genai_queue_length"));
    }
}
