pub mod filters;
pub mod rate_limiter;
pub mod sse;
pub mod stats;

use std::sync::atomic::Ordering;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::Config;
use crate::logbus::EditProducer;
use crate::models::edit::RawEdit;

pub use filters::{DropReason, Filters};
pub use rate_limiter::TokenBucket;
pub use sse::SseClient;
pub use stats::IngestStats;

const RAW_EDIT_CHANNEL_CAPACITY: usize = 1000;

/// Wires the SSE reader, filter chain, rate limiter, and log producer
/// together (spec.md §4.1 "Responsibility"). Runs until `cancel` fires.
pub async fn run(config: &Config, producer: &EditProducer, stats: &IngestStats, cancel: CancellationToken) {
    let (tx, mut rx) = mpsc::channel::<RawEdit>(RAW_EDIT_CHANNEL_CAPACITY);
    let client = SseClient::new(config.sse_url.clone(), config.reconnect_delay());
    let filters = Filters::new(config.allowed_languages(), config.exclude_bots);
    let bucket = TokenBucket::new(config.rate_limit, config.burst_limit);

    let sse_cancel = cancel.clone();
    let reader = async {
        client.run(tx, stats, sse_cancel).await;
    };

    let consumer = async {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                raw = rx.recv() => {
                    let Some(raw) = raw else { return };
                    handle_raw(raw, &filters, &bucket, producer, stats).await;
                }
            }
        }
    };

    tokio::join!(reader, consumer);
}

async fn handle_raw(raw: RawEdit, filters: &Filters, bucket: &TokenBucket, producer: &EditProducer, stats: &IngestStats) {
    let now = now_secs();

    let edit = match filters.apply(raw, now) {
        Ok(edit) => edit,
        Err(reason) => {
            record_drop(stats, reason);
            return;
        }
    };

    if !bucket.try_acquire().await {
        stats.filtered_rate.fetch_add(1, Ordering::Relaxed);
        crate::metrics::prometheus::counters::filtered_total("rate");
        return;
    }

    match producer.produce(&edit).await {
        Ok(()) => {
            stats.ingested.fetch_add(1, Ordering::Relaxed);
            crate::metrics::prometheus::counters::ingested_total();
        }
        Err(e) => {
            debug!(error = %e, page = %edit.page_key(), "failed to produce edit");
            stats.produce_errors.fetch_add(1, Ordering::Relaxed);
            crate::metrics::prometheus::counters::produce_errors_total();
        }
    }
}

fn record_drop(stats: &IngestStats, reason: DropReason) {
    let counter = match reason {
        DropReason::Validation => &stats.filtered_validation,
        DropReason::Type => &stats.filtered_type,
        DropReason::Bot => &stats.filtered_bot,
        DropReason::Language => &stats.filtered_language,
    };
    counter.fetch_add(1, Ordering::Relaxed);
    crate::metrics::prometheus::counters::filtered_total(reason.as_str());
}

fn now_secs() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}
