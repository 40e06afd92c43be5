use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber with an `EnvFilter` and the
/// plain `fmt` layer, following `wavs::config::tracing_env_filter`. Call
/// once from `main`.
pub fn init_tracing(filter: EnvFilter) {
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Process-wide metrics registry and counters, exposed as text at `GET
/// /metrics`. The teacher exports metrics via OpenTelemetry OTLP push;
/// this repo substitutes the `prometheus` crate for a pull-based text
/// endpoint while keeping the same per-subsystem grouping
/// (`HttpMetrics`/`EngineMetrics`/`DispatcherMetrics`/...).
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    pub http: HttpMetrics,
    pub bus: BusMetrics,
    pub dispatcher: DispatcherMetrics,
    pub submission: SubmissionMetrics,
    pub indexer: IndexerMetrics,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();
        Self {
            http: HttpMetrics::register(&registry),
            bus: BusMetrics::register(&registry),
            dispatcher: DispatcherMetrics::register(&registry),
            submission: SubmissionMetrics::register(&registry),
            indexer: IndexerMetrics::register(&registry),
            registry,
        }
    }

    /// Renders the registry in Prometheus text exposition format.
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&families, &mut buf).expect("encode metrics");
        String::from_utf8(buf).expect("metrics are valid utf8")
    }
}

#[derive(Clone)]
pub struct HttpMetrics {
    pub registered_services: IntGauge,
    pub requests_total: IntCounterVec,
}

impl HttpMetrics {
    const LABEL: &'static str = "http";

    fn register(registry: &Registry) -> Self {
        let registered_services = IntGauge::new(
            format!("{}_registered_services", Self::LABEL),
            "Number of services currently registered",
        )
        .unwrap();
        let requests_total = IntCounterVec::new(
            Opts::new(
                format!("{}_requests_total", Self::LABEL),
                "Total number of HTTP requests handled",
            ),
            &["method", "status"],
        )
        .unwrap();
        registry.register(Box::new(registered_services.clone())).unwrap();
        registry.register(Box::new(requests_total.clone())).unwrap();
        Self {
            registered_services,
            requests_total,
        }
    }
}

#[derive(Clone)]
pub struct BusMetrics {
    pub dropped_total: IntCounter,
}

impl BusMetrics {
    const LABEL: &'static str = "bus";

    fn register(registry: &Registry) -> Self {
        let dropped_total = IntCounter::new(
            format!("{}_dropped_total", Self::LABEL),
            "Total number of events dropped due to subscriber back-pressure",
        )
        .unwrap();
        registry.register(Box::new(dropped_total.clone())).unwrap();
        Self { dropped_total }
    }
}

#[derive(Clone)]
pub struct DispatcherMetrics {
    pub attempts_total: IntCounter,
    pub retries_total: IntCounter,
    pub failures_total: IntCounter,
}

impl DispatcherMetrics {
    const LABEL: &'static str = "dispatcher";

    fn register(registry: &Registry) -> Self {
        let attempts_total = IntCounter::new(
            format!("{}_attempts_total", Self::LABEL),
            "Total number of dispatcher attempts",
        )
        .unwrap();
        let retries_total = IntCounter::new(
            format!("{}_retries_total", Self::LABEL),
            "Total number of dispatcher retries",
        )
        .unwrap();
        let failures_total = IntCounter::new(
            format!("{}_failures_total", Self::LABEL),
            "Total number of dispatcher calls exhausting retries",
        )
        .unwrap();
        registry.register(Box::new(attempts_total.clone())).unwrap();
        registry.register(Box::new(retries_total.clone())).unwrap();
        registry.register(Box::new(failures_total.clone())).unwrap();
        Self {
            attempts_total,
            retries_total,
            failures_total,
        }
    }
}

#[derive(Clone)]
pub struct SubmissionMetrics {
    pub submitted_total: IntCounter,
    pub confirmed_total: IntCounter,
    pub failed_total: IntCounter,
}

impl SubmissionMetrics {
    const LABEL: &'static str = "submission";

    fn register(registry: &Registry) -> Self {
        let submitted_total = IntCounter::new(
            format!("{}_submitted_total", Self::LABEL),
            "Total number of submissions sent to the chain",
        )
        .unwrap();
        let confirmed_total = IntCounter::new(
            format!("{}_confirmed_total", Self::LABEL),
            "Total number of submissions confirmed",
        )
        .unwrap();
        let failed_total = IntCounter::new(
            format!("{}_failed_total", Self::LABEL),
            "Total number of submissions that failed permanently",
        )
        .unwrap();
        registry.register(Box::new(submitted_total.clone())).unwrap();
        registry.register(Box::new(confirmed_total.clone())).unwrap();
        registry.register(Box::new(failed_total.clone())).unwrap();
        Self {
            submitted_total,
            confirmed_total,
            failed_total,
        }
    }
}

#[derive(Clone)]
pub struct IndexerMetrics {
    pub blocks_processed_total: IntCounter,
    pub events_published_total: IntCounter,
    pub rpc_failovers_total: IntCounter,
}

impl IndexerMetrics {
    const LABEL: &'static str = "indexer";

    fn register(registry: &Registry) -> Self {
        let blocks_processed_total = IntCounter::new(
            format!("{}_blocks_processed_total", Self::LABEL),
            "Total number of blocks processed",
        )
        .unwrap();
        let events_published_total = IntCounter::new(
            format!("{}_events_published_total", Self::LABEL),
            "Total number of events published to the bus",
        )
        .unwrap();
        let rpc_failovers_total = IntCounter::new(
            format!("{}_rpc_failovers_total", Self::LABEL),
            "Total number of RPC endpoint failovers",
        )
        .unwrap();
        registry
            .register(Box::new(blocks_processed_total.clone()))
            .unwrap();
        registry
            .register(Box::new(events_published_total.clone()))
            .unwrap();
        registry
            .register(Box::new(rpc_failovers_total.clone()))
            .unwrap();
        Self {
            blocks_processed_total,
            events_published_total,
            rpc_failovers_total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_includes_registered_counters() {
        let metrics = Metrics::new();
        metrics.dispatcher.attempts_total.inc();
        let text = metrics.render();
        assert!(text.contains("dispatcher_attempts_total"));
    }
}
