use anyhow::Context;
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and describe every series the service emits.
    /// Fails if a recorder is already installed in this process.
    pub fn init(cache_ttl_secs: u64) -> anyhow::Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_counter!("fetch_errors_total", "Source fetches that failed, by source and kind.");
        describe_counter!("observations_total", "Records returned by sources, by source.");
        describe_counter!(
            "normalization_anomalies_total",
            "Fields the normalizer had to substitute, by kind."
        );
        describe_counter!("cache_lookups_total", "Result cache lookups, by outcome.");
        describe_counter!("gate_dropped_total", "Matches dropped by the quality gate, by reason.");
        describe_histogram!("pipeline_ms", "Normalize-to-gate pipeline time in milliseconds.");
        describe_gauge!("cache_ttl_seconds", "Result cache TTL (absolute, no sliding refresh).");

        gauge!("cache_ttl_seconds").set(cache_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// Returns a router exposing `/metrics` with the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}
