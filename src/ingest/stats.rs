use std::sync::atomic::{AtomicU64, Ordering};

/// Counters exposed by `Ingestor::Stats()` (spec.md §4.1 "Public contract").
#[derive(Debug, Default)]
pub struct IngestStats {
    pub ingested: AtomicU64,
    pub filtered_validation: AtomicU64,
    pub filtered_type: AtomicU64,
    pub filtered_bot: AtomicU64,
    pub filtered_language: AtomicU64,
    pub filtered_rate: AtomicU64,
    pub produce_errors: AtomicU64,
    pub reconnects: AtomicU64,
    pub parse_errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSnapshot {
    pub ingested: u64,
    pub filtered_validation: u64,
    pub filtered_type: u64,
    pub filtered_bot: u64,
    pub filtered_language: u64,
    pub filtered_rate: u64,
    pub produce_errors: u64,
    pub reconnects: u64,
    pub parse_errors: u64,
}

impl IngestStats {
    pub fn snapshot(&self) -> IngestSnapshot {
        IngestSnapshot {
            ingested: self.ingested.load(Ordering::Relaxed),
            filtered_validation: self.filtered_validation.load(Ordering::Relaxed),
            filtered_type: self.filtered_type.load(Ordering::Relaxed),
            filtered_bot: self.filtered_bot.load(Ordering::Relaxed),
            filtered_language: self.filtered_language.load(Ordering::Relaxed),
            filtered_rate: self.filtered_rate.load(Ordering::Relaxed),
            produce_errors: self.produce_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            parse_errors: self.parse_errors.load(Ordering::Relaxed),
        }
    }

    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        crate::metrics::prometheus::counters::reconnects_total();
    }

    /// A raw SSE payload that didn't decode as `RawEdit` (spec.md §4.1
    /// "Parse/validation errors: logged at debug, counted, event dropped").
    pub fn record_parse_error(&self) {
        self.parse_errors.fetch_add(1, Ordering::Relaxed);
        crate::metrics::prometheus::counters::filtered_total("parse_error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let stats = IngestStats::default();
        stats.ingested.fetch_add(3, Ordering::Relaxed);
        stats.filtered_bot.fetch_add(1, Ordering::Relaxed);
        let snap = stats.snapshot();
        assert_eq!(snap.ingested, 3);
        assert_eq!(snap.filtered_bot, 1);
    }
}
