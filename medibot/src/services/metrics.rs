//! Prometheus metrics for medibot.
//!
//! Provides HTTP and relay-specific metrics for observability.

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::OnceLock;

struct Metrics {
    registry: Registry,
    http_requests_total: IntCounterVec,
    http_request_duration_seconds: HistogramVec,
    relay_requests_total: IntCounterVec,
    relay_duration_seconds: HistogramVec,
    provider_errors_total: IntCounterVec,
}

static METRICS: OnceLock<Option<Metrics>> = OnceLock::new();

fn build() -> Result<Metrics, prometheus::Error> {
    let registry = Registry::new();

    let http_requests_total = IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests"),
        &["method", "path", "status"],
    )?;

    let http_request_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "http_request_duration_seconds",
            "HTTP request duration in seconds",
        ),
        &["method", "path"],
    )?;

    // Relay calls: chat webhook and the analysis flows
    let relay_requests_total = IntCounterVec::new(
        Opts::new("relay_requests_total", "Total relay calls by outcome"),
        &["relay", "outcome"],
    )?;

    let relay_duration_seconds = HistogramVec::new(
        HistogramOpts::new(
            "relay_duration_seconds",
            "Latency of the external call behind each relay",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["relay"],
    )?;

    let provider_errors_total = IntCounterVec::new(
        Opts::new("genai_provider_errors_total", "Total AI provider errors"),
        &["provider", "error_type"],
    )?;

    registry.register(Box::new(http_requests_total.clone()))?;
    registry.register(Box::new(http_request_duration_seconds.clone()))?;
    registry.register(Box::new(relay_requests_total.clone()))?;
    registry.register(Box::new(relay_duration_seconds.clone()))?;
    registry.register(Box::new(provider_errors_total.clone()))?;

    Ok(Metrics {
        registry,
        http_requests_total,
        http_request_duration_seconds,
        relay_requests_total,
        relay_duration_seconds,
        provider_errors_total,
    })
}

fn metrics() -> Option<&'static Metrics> {
    METRICS
        .get_or_init(|| match build() {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize Prometheus metrics");
                None
            }
        })
        .as_ref()
}

/// Initialize all metrics. Safe to call more than once.
pub fn init_metrics() {
    if metrics().is_some() {
        tracing::info!("Prometheus metrics initialized");
    }
}

pub fn record_http(method: &str, path: &str, status: u16, seconds: f64) {
    if let Some(m) = metrics() {
        m.http_requests_total
            .with_label_values(&[method, path, &status.to_string()])
            .inc();
        m.http_request_duration_seconds
            .with_label_values(&[method, path])
            .observe(seconds);
    }
}

pub fn record_relay(relay: &str, outcome: &str, seconds: f64) {
    if let Some(m) = metrics() {
        m.relay_requests_total
            .with_label_values(&[relay, outcome])
            .inc();
        m.relay_duration_seconds
            .with_label_values(&[relay])
            .observe(seconds);
    }
}

pub fn record_provider_error(provider: &str, error_type: &str) {
    if let Some(m) = metrics() {
        m.provider_errors_total
            .with_label_values(&[provider, error_type])
            .inc();
    }
}

/// Get metrics in Prometheus text format.
pub fn get_metrics() -> String {
    let Some(m) = metrics() else {
        return String::new();
    };

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&m.registry.gather(), &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }

    String::from_utf8(buffer).unwrap_or_default()
}
