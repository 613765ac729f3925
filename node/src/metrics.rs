//! # Prometheus Metrics
//!
//! Operational metrics for the registry node, scraped at `/metrics` on the
//! configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] under
//! the `credreg` namespace.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

/// Holds all Prometheus metric handles for the node.
#[derive(Clone)]
pub struct NodeMetrics {
    registry: Registry,
    /// Mutating calls that committed, by operation.
    pub calls_committed_total: IntCounterVec,
    /// Calls rejected by the registry, by error kind.
    pub calls_rejected_total: IntCounterVec,
    /// Calls that failed in storage.
    pub storage_errors_total: IntCounter,
    /// Sequence number of the newest committed event, or -1 if none.
    pub event_height: IntGauge,
    /// Connected WebSocket event subscribers.
    pub ws_subscribers: IntGauge,
    /// API request latency in seconds.
    pub request_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("credreg".into()), None)
            .expect("failed to create prometheus registry");

        let calls_committed_total = IntCounterVec::new(
            Opts::new("calls_committed_total", "Mutating registry calls that committed"),
            &["op"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(calls_committed_total.clone()))
            .expect("metric registration");

        let calls_rejected_total = IntCounterVec::new(
            Opts::new("calls_rejected_total", "Registry calls rejected, by error kind"),
            &["kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(calls_rejected_total.clone()))
            .expect("metric registration");

        let storage_errors_total =
            IntCounter::new("storage_errors_total", "Registry calls that failed in storage")
                .expect("metric creation");
        registry
            .register(Box::new(storage_errors_total.clone()))
            .expect("metric registration");

        let event_height = IntGauge::new(
            "event_height",
            "Sequence number of the newest committed event",
        )
        .expect("metric creation");
        event_height.set(-1);
        registry
            .register(Box::new(event_height.clone()))
            .expect("metric registration");

        let ws_subscribers =
            IntGauge::new("ws_subscribers", "Connected WebSocket event subscribers")
                .expect("metric creation");
        registry
            .register(Box::new(ws_subscribers.clone()))
            .expect("metric registration");

        let request_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "request_latency_seconds",
                "API request handling latency in seconds",
            )
            .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 1.0]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(request_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            calls_committed_total,
            calls_rejected_total,
            storage_errors_total,
            event_height,
            ws_subscribers,
            request_latency_seconds,
        }
    }

    /// Records the newest committed event sequence.
    pub fn set_event_height(&self, latest: Option<u64>) {
        self.event_height
            .set(latest.map_or(-1, |seq| i64::try_from(seq).unwrap_or(i64::MAX)));
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// Axum handler that renders `/metrics` in Prometheus text format.
pub async fn metrics_handler(
    axum::extract::State(metrics): axum::extract::State<SharedMetrics>,
) -> impl IntoResponse {
    match metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_namespaced_metrics() {
        let metrics = NodeMetrics::new();
        metrics
            .calls_committed_total
            .with_label_values(&["issue_credential"])
            .inc();
        metrics.set_event_height(Some(41));

        let text = metrics.encode().unwrap();
        assert!(text.contains("credreg_calls_committed_total{op=\"issue_credential\"} 1"));
        assert!(text.contains("credreg_event_height 41"));
    }

    #[test]
    fn empty_log_reports_minus_one() {
        let metrics = NodeMetrics::new();
        metrics.set_event_height(None);
        assert_eq!(metrics.event_height.get(), -1);
    }
}
