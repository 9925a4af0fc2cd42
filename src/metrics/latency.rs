use std::collections::HashMap;

use hdrhistogram::Histogram;
use parking_lot::Mutex;
use serde::Serialize;

use super::percentiles::PercentileSet;

/// HdrHistogram range: 1 μs → 60 s, 3 significant figures. The pipeline
/// stages tracked here (KV round-trip, bulk index flush, SSE-to-publish
/// latency) sit in the same microsecond-to-second range as HTTP-handler
/// timings.
const HIST_LOW: u64 = 1;
const HIST_HIGH: u64 = 60_000_000;
const HIST_SIGFIG: u8 = 3;

/// Per-operation latency histograms, keyed by an arbitrary named set of
/// pipeline stages (`kv_roundtrip`, `bulk_flush`, `sse_to_publish`, ...)
/// rather than a fixed struct of fields. Each operation is lazily created
/// on first use.
pub struct LatencyCollector {
    histograms: Mutex<HashMap<&'static str, Histogram<u64>>>,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self { histograms: Mutex::new(HashMap::new()) }
    }

    /// Records one observation in microseconds, clamped to `>= 1` so a
    /// zero-duration measurement still lands in the histogram's range.
    pub fn record(&self, operation: &'static str, micros: u64) {
        let mut histograms = self.histograms.lock();
        let hist = histograms
            .entry(operation)
            .or_insert_with(|| Histogram::<u64>::new_with_bounds(HIST_LOW, HIST_HIGH, HIST_SIGFIG).expect("histogram creation"));
        let _ = hist.record(micros.max(1));
    }

    pub fn snapshot(&self, operation: &str) -> PercentileSet {
        match self.histograms.lock().get(operation) {
            Some(hist) => PercentileSet::from_histogram(hist),
            None => PercentileSet::empty(),
        }
    }

    pub fn snapshot_all(&self) -> HashMap<String, PercentileSet> {
        self.histograms.lock().iter().map(|(name, hist)| (name.to_string(), PercentileSet::from_histogram(hist))).collect()
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializable form of `snapshot_all`, for the `/metrics` JSON-adjacent
/// debug surface (the Prometheus text endpoint is the primary one).
#[derive(Debug, Serialize)]
pub struct LatencySnapshot(pub HashMap<String, PercentileSet>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrecorded_operation_is_empty() {
        let collector = LatencyCollector::new();
        assert!(!collector.snapshot("kv_roundtrip").has_data());
    }

    #[test]
    fn records_land_in_the_right_operation() {
        let collector = LatencyCollector::new();
        collector.record("kv_roundtrip", 100);
        collector.record("kv_roundtrip", 200);
        collector.record("bulk_flush", 5_000);

        let kv = collector.snapshot("kv_roundtrip");
        assert_eq!(kv.count, 2);
        let flush = collector.snapshot("bulk_flush");
        assert_eq!(flush.count, 1);
    }
}
