//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{HistogramOpts, IntCounterVec, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedinbox_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref ACTIVITIES_RECEIVED: IntCounterVec = IntCounterVec::new(
        Opts::new("fedinbox_activities_received_total", "Total number of activities received"),
        &["activity_type"]
    ).expect("metric can be created");
    pub static ref INBOX_OUTCOMES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedinbox_inbox_outcomes_total", "Inbox requests by terminal outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref FEDERATION_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "fedinbox_federation_request_duration_seconds",
            "Federation request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["endpoint"]
    ).expect("metric can be created");
    pub static ref BACKEND_CALLS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedinbox_backend_calls_total", "Collaborator calls by outcome"),
        &["collaborator", "outcome"]
    ).expect("metric can be created");
    pub static ref WEBFINGER_LOOKUPS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedinbox_webfinger_lookups_total", "WebFinger lookups by result"),
        &["result"]
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedinbox_errors_total", "Total number of errors"),
        &["error_type"]
    ).expect("metric can be created");
}

static INIT: std::sync::Once = std::sync::Once::new();

/// Initialize metrics registry.
///
/// Safe to call more than once; only the first call registers.
pub fn init_metrics() {
    INIT.call_once(|| {
        let collectors: [(&str, Box<dyn prometheus::core::Collector>); 7] = [
            ("HTTP_REQUESTS_TOTAL", Box::new(HTTP_REQUESTS_TOTAL.clone())),
            ("ACTIVITIES_RECEIVED", Box::new(ACTIVITIES_RECEIVED.clone())),
            ("INBOX_OUTCOMES_TOTAL", Box::new(INBOX_OUTCOMES_TOTAL.clone())),
            (
                "FEDERATION_REQUEST_DURATION_SECONDS",
                Box::new(FEDERATION_REQUEST_DURATION_SECONDS.clone()),
            ),
            ("BACKEND_CALLS_TOTAL", Box::new(BACKEND_CALLS_TOTAL.clone())),
            ("WEBFINGER_LOOKUPS_TOTAL", Box::new(WEBFINGER_LOOKUPS_TOTAL.clone())),
            ("ERRORS_TOTAL", Box::new(ERRORS_TOTAL.clone())),
        ];

        for (name, collector) in collectors {
            if let Err(error) = REGISTRY.register(collector) {
                tracing::warn!(metric = name, %error, "Failed to register metric");
            }
        }

        tracing::info!("Metrics registry initialized");
    });
}

/// Render every registered metric in the Prometheus text format.
pub fn render() -> Result<String, prometheus::Error> {
    use prometheus::{Encoder, TextEncoder};

    TextEncoder::new().encode_to_string(&REGISTRY.gather())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_metrics_is_idempotent() {
        init_metrics();
        init_metrics();

        WEBFINGER_LOOKUPS_TOTAL.with_label_values(&["found"]).inc();
        let names: Vec<String> = REGISTRY
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"fedinbox_webfinger_lookups_total".to_string()));

        let text = render().unwrap();
        assert!(text.contains("fedinbox_webfinger_lookups_total{result=\"found\"}"));
    }
}
