use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Installs the process-wide Prometheus recorder and returns a handle whose
/// `render()` produces the text exposition format served at `GET /metrics`
/// (spec.md §4.1/§7 "Metrics endpoint"). The scrape *server* lives in
/// `api::serve`; this module only owns the recorder.
pub fn install() -> PrometheusHandle {
    PrometheusBuilder::new().install_recorder().expect("failed to install Prometheus recorder")
}

/// Thin, named wrappers around the `metrics` crate's macros so every call
/// site names one of the counters spec.md §4.1/§7 actually calls for,
/// instead of free-typing metric name strings throughout the pipeline.
pub mod counters {
    pub fn ingested_total() {
        ::metrics::counter!("wikisurge_ingested_total").increment(1);
    }

    pub fn filtered_total(reason: &'static str) {
        ::metrics::counter!("wikisurge_filtered_total", "reason" => reason).increment(1);
    }

    pub fn reconnects_total() {
        ::metrics::counter!("wikisurge_reconnects_total").increment(1);
    }

    pub fn produce_errors_total() {
        ::metrics::counter!("wikisurge_produce_errors_total").increment(1);
    }

    pub fn hot_pages_live(count: i64) {
        ::metrics::gauge!("wikisurge_hot_pages_live").set(count as f64);
    }

    pub fn alerts_emitted_total(kind: &'static str) {
        ::metrics::counter!("wikisurge_alerts_emitted_total", "kind" => kind).increment(1);
    }

    pub fn documents_indexed_total(count: u64) {
        ::metrics::counter!("wikisurge_documents_indexed_total").increment(count);
    }

    pub fn documents_failed_total(count: u64) {
        ::metrics::counter!("wikisurge_documents_failed_total").increment(count);
    }

    pub fn documents_dropped_total(count: u64) {
        ::metrics::counter!("wikisurge_documents_dropped_total").increment(count);
    }

    pub fn breaker_trips_total(downstream: &'static str) {
        ::metrics::counter!("wikisurge_breaker_trips_total", "downstream" => downstream).increment(1);
    }
}
